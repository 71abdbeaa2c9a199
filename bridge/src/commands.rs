use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::diff::{self, DiffRange, cursor_to_row_and_column, row_and_column_to_cursor};
use crate::editor::{
    ActiveEditor, Direction, EditorHost, HostAction, HostError, Workbench, filename_for_editor,
};
use crate::highlight::HighlightSequencer;
use crate::state::RuntimeState;
use crate::utils::elapsed_ms;

/// Rows kept between the cursor and either edge of the viewport before the
/// view is re-centred.
const SCROLL_BUFFER_ROWS: usize = 5;
const OPEN_FILE_LIST_LIMIT: usize = 20;

pub const GET_EDITOR_STATE: &str = "COMMAND_TYPE_GET_EDITOR_STATE";
pub const DIFF: &str = "COMMAND_TYPE_DIFF";
pub const PASTE: &str = "COMMAND_TYPE_PASTE";
pub const COPY: &str = "COMMAND_TYPE_COPY";
pub const SELECT: &str = "COMMAND_TYPE_SELECT";
pub const SWITCH_TAB: &str = "COMMAND_TYPE_SWITCH_TAB";
pub const NEXT_TAB: &str = "COMMAND_TYPE_NEXT_TAB";
pub const PREVIOUS_TAB: &str = "COMMAND_TYPE_PREVIOUS_TAB";
pub const CLOSE_TAB: &str = "COMMAND_TYPE_CLOSE_TAB";
pub const CLOSE_WINDOW: &str = "COMMAND_TYPE_CLOSE_WINDOW";
pub const CREATE_TAB: &str = "COMMAND_TYPE_CREATE_TAB";
pub const OPEN_FILE_LIST: &str = "COMMAND_TYPE_OPEN_FILE_LIST";
pub const OPEN_FILE: &str = "COMMAND_TYPE_OPEN_FILE";
pub const UNDO: &str = "COMMAND_TYPE_UNDO";
pub const REDO: &str = "COMMAND_TYPE_REDO";
pub const SAVE: &str = "COMMAND_TYPE_SAVE";
pub const GO_TO_DEFINITION: &str = "COMMAND_TYPE_GO_TO_DEFINITION";
pub const SPLIT: &str = "COMMAND_TYPE_SPLIT";
pub const WINDOW: &str = "COMMAND_TYPE_WINDOW";
pub const PAUSE: &str = "COMMAND_TYPE_PAUSE";
pub const CLICK: &str = "COMMAND_TYPE_CLICK";
pub const EVALUATE_IN_PLUGIN: &str = "COMMAND_TYPE_EVALUATE_IN_PLUGIN";
pub const INVALID: &str = "COMMAND_TYPE_INVALID";

/// Every tag the speech engine is known to send.
pub const PROTOCOL_TAGS: &[&str] = &[
    GET_EDITOR_STATE,
    DIFF,
    PASTE,
    COPY,
    SELECT,
    SWITCH_TAB,
    NEXT_TAB,
    PREVIOUS_TAB,
    CLOSE_TAB,
    CLOSE_WINDOW,
    CREATE_TAB,
    OPEN_FILE_LIST,
    OPEN_FILE,
    UNDO,
    REDO,
    SAVE,
    GO_TO_DEFINITION,
    SPLIT,
    WINDOW,
    PAUSE,
    CLICK,
    EVALUATE_IN_PLUGIN,
    INVALID,
];

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid payload for {command}: {source}")]
    Payload {
        command: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("no file at index {0} of the last file list")]
    NoSuchFile(usize),
    #[error("unknown direction `{0}`")]
    Direction(String),
    #[error("protocol tag {0} has no handler or ignore entry")]
    Unregistered(&'static str),
}

/// One inbound command: a type tag plus its tag-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub command_type: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Command {
    pub fn new(command_type: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            command_type: command_type.into(),
            data,
        }
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, CommandError> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|source| {
            CommandError::Payload {
                command: self.command_type.clone(),
                source,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub message: String,
    pub data: Value,
}

impl Response {
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

type HandlerResult = Result<Option<Response>, CommandError>;
type HandlerFn = for<'a> fn(&'a CommandHandler, &'a Command) -> BoxFuture<'a, HandlerResult>;

enum HandlerEntry {
    Run(HandlerFn),
    /// Known to the protocol but intentionally a no-op here.
    Ignore,
}

#[derive(Debug, Deserialize)]
struct DiffPayload {
    source: String,
    cursor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PasteDirection {
    Above,
    Below,
}

#[derive(Debug, Deserialize)]
struct PastePayload {
    cursor: usize,
    #[serde(default)]
    direction: Option<PasteDirection>,
}

#[derive(Debug, Default, Deserialize)]
struct CopyPayload {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectPayload {
    cursor: usize,
    cursor_end: usize,
}

#[derive(Debug, Deserialize)]
struct IndexPayload {
    #[serde(default)]
    index: i64,
}

#[derive(Debug, Deserialize)]
struct PathPayload {
    path: String,
}

#[derive(Debug, Deserialize)]
struct DirectionPayload {
    direction: String,
}

/// Maps command tags to handlers and runs them against the active editor.
pub struct CommandHandler {
    runtime: Arc<RuntimeState>,
    workbench: Arc<dyn Workbench>,
    active: ActiveEditor,
    highlight: Arc<HighlightSequencer>,
    open_file_list: Mutex<Vec<PathBuf>>,
    registry: HashMap<&'static str, HandlerEntry>,
}

impl CommandHandler {
    pub fn new(
        runtime: Arc<RuntimeState>,
        workbench: Arc<dyn Workbench>,
        active: ActiveEditor,
    ) -> Result<Self, CommandError> {
        let highlight = Arc::new(HighlightSequencer::new(&runtime.config));
        highlight.watch_colors(&runtime.state);
        highlight.watch_ranges(&runtime.state, active.clone());

        let handler = Self {
            runtime,
            workbench,
            active,
            highlight,
            open_file_list: Mutex::new(Vec::new()),
            registry: build_registry(),
        };
        handler.validate_registry()?;
        Ok(handler)
    }

    fn validate_registry(&self) -> Result<(), CommandError> {
        match PROTOCOL_TAGS
            .iter()
            .find(|tag| !self.registry.contains_key(**tag))
        {
            Some(tag) => Err(CommandError::Unregistered(*tag)),
            None => Ok(()),
        }
    }

    /// Runs `command` and returns its reply, if any.
    ///
    /// Unknown tags are expected when the speech engine is newer than this
    /// bridge and are skipped. Handler failures are logged and yield no
    /// reply so one bad command never ends the session.
    pub async fn dispatch(&self, command: &Command) -> Option<Response> {
        let command_type = command.command_type.as_str();
        let handler = match self.registry.get(command_type) {
            Some(HandlerEntry::Run(handler)) => *handler,
            Some(HandlerEntry::Ignore) => {
                debug!(command_type, "ignoring command");
                return None;
            }
            None => {
                debug!(command_type, "no handler registered; skipping command");
                self.runtime.metrics.lock().await.record_unknown_command();
                return None;
            }
        };

        let started = Instant::now();
        let result = handler(self, command).await;
        let dispatch_ms = elapsed_ms(started);
        self.runtime.metrics.lock().await.record_dispatch(dispatch_ms);

        match result {
            Ok(response) => {
                debug!(command_type, dispatch_ms, "command handled");
                response
            }
            Err(err) => {
                warn!(command_type, "command failed: {err}");
                None
            }
        }
    }

    fn editor(&self) -> Option<Arc<dyn EditorHost>> {
        let editor = self.active.get();
        if editor.is_none() {
            debug!("no active editor; skipping command");
        }
        editor
    }

    async fn ui_delay(&self) {
        tokio::time::sleep(Duration::from_millis(self.runtime.config.ui_delay_ms)).await;
    }

    async fn focus(&self) -> Result<(), CommandError> {
        if self.active.get().is_none() {
            return Ok(());
        }

        self.workbench.execute(HostAction::Focus)?;
        self.ui_delay().await;
        Ok(())
    }

    async fn run_action(&self, action: HostAction) -> HandlerResult {
        self.focus().await?;
        self.workbench.execute(action)?;
        self.ui_delay().await;
        Ok(None)
    }

    fn scroll_to_cursor(&self, editor: &dyn EditorHost) {
        let row = editor.cursor().row;
        let Some((first, last)) = editor.visible_rows() else {
            return;
        };
        if row < first + SCROLL_BUFFER_ROWS || row > last.saturating_sub(SCROLL_BUFFER_ROWS) {
            editor.reveal_row(row);
        }
    }

    /// Replaces the document with `source` and moves the cursor to
    /// `cursor`, animating removed text before the edit and added text
    /// after it.
    async fn update_editor(
        &self,
        editor: &Arc<dyn EditorHost>,
        source: &str,
        cursor: usize,
    ) -> Result<(), CommandError> {
        let before = editor.text();
        if before != source {
            let started = Instant::now();
            let edits = diff::code_diff(&before, source);
            let ranges = if self.runtime.config.animations {
                diff::diff(&before, source)
            } else {
                Vec::new()
            };
            self.runtime
                .metrics
                .lock()
                .await
                .record_diff(elapsed_ms(started));

            let (deletes, adds): (Vec<DiffRange>, Vec<DiffRange>) =
                ranges.into_iter().partition(DiffRange::is_delete);
            let removal = self.highlight.animate(editor, &deletes);
            tokio::time::sleep(removal.duration).await;

            editor.apply_edits(&edits)?;
            self.highlight.animate(editor, &adds);
        }

        let point = cursor_to_row_and_column(source, cursor);
        editor.set_selection(point, point);
        self.scroll_to_cursor(editor.as_ref());
        Ok(())
    }

    async fn get_editor_state(&self, _command: &Command) -> HandlerResult {
        let Some(editor) = self.editor() else {
            return Ok(None);
        };

        let source = editor.text();
        let cursor = row_and_column_to_cursor(&source, editor.cursor());
        let files: Vec<String> = self
            .open_file_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let roots: Vec<String> = self
            .workbench
            .workspace_roots()
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();

        Ok(Some(Response::new(
            "editorState",
            json!({
                "source": source,
                "cursor": cursor,
                "filename": filename_for_editor(editor.as_ref()),
                "files": files,
                "roots": roots,
            }),
        )))
    }

    async fn diff(&self, command: &Command) -> HandlerResult {
        let payload: DiffPayload = command.payload()?;
        let Some(editor) = self.editor() else {
            return Ok(None);
        };

        self.update_editor(&editor, &payload.source, payload.cursor)
            .await?;
        Ok(None)
    }

    async fn paste(&self, command: &Command) -> HandlerResult {
        let payload: PastePayload = command.payload()?;
        let Some(editor) = self.editor() else {
            return Ok(None);
        };

        let text = self.workbench.clipboard_read()?;
        let (source, cursor) = paste_text(&editor.text(), payload.cursor, payload.direction, &text);
        self.update_editor(&editor, &source, cursor).await?;
        Ok(None)
    }

    async fn copy(&self, command: &Command) -> HandlerResult {
        let payload: CopyPayload = command.payload()?;
        if let Some(text) = payload.text.filter(|text| !text.is_empty()) {
            self.workbench.clipboard_write(&text)?;
        }
        self.ui_delay().await;
        Ok(None)
    }

    async fn select(&self, command: &Command) -> HandlerResult {
        let payload: SelectPayload = command.payload()?;
        let Some(editor) = self.editor() else {
            return Ok(None);
        };

        let source = editor.text();
        let start = cursor_to_row_and_column(&source, payload.cursor);
        let end = cursor_to_row_and_column(&source, payload.cursor_end);
        editor.set_selection(start, end);
        Ok(None)
    }

    async fn switch_tab(&self, command: &Command) -> HandlerResult {
        let payload: IndexPayload = command.payload()?;
        let action = match usize::try_from(payload.index) {
            Ok(index) => HostAction::SwitchTab(index),
            Err(_) => HostAction::LastTab,
        };
        self.run_action(action).await
    }

    async fn open_file_list(&self, command: &Command) -> HandlerResult {
        let payload: PathPayload = command.payload()?;
        self.focus().await?;

        let pattern = format!("*{}*", payload.path.replace(' ', "*"));
        let files = self.workbench.find_files(
            &pattern,
            &self.runtime.config.ignore,
            OPEN_FILE_LIST_LIMIT,
        );
        info!(%pattern, matches = files.len(), "listed files");
        *self
            .open_file_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = files;

        Ok(Some(Response::new(
            "sendText",
            json!({ "text": "callback open" }),
        )))
    }

    async fn open_file(&self, command: &Command) -> HandlerResult {
        let payload: IndexPayload = command.payload()?;
        let index = usize::try_from(payload.index).unwrap_or(0);
        let path = self
            .open_file_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
            .ok_or(CommandError::NoSuchFile(index))?;

        self.workbench.execute(HostAction::OpenFile(path))?;
        Ok(None)
    }

    async fn history(&self, action: HostAction) -> HandlerResult {
        self.focus().await?;
        self.workbench.execute(action)?;
        if let Some(editor) = self.editor() {
            self.scroll_to_cursor(editor.as_ref());
        }
        Ok(None)
    }

    async fn without_delay(&self, action: HostAction) -> HandlerResult {
        self.focus().await?;
        self.workbench.execute(action)?;
        Ok(None)
    }

    async fn directional(&self, command: &Command, split: bool) -> HandlerResult {
        let payload: DirectionPayload = command.payload()?;
        let direction: Direction = payload
            .direction
            .parse()
            .map_err(|_| CommandError::Direction(payload.direction.clone()))?;
        let action = if split {
            HostAction::Split(direction)
        } else {
            HostAction::FocusGroup(direction)
        };
        self.run_action(action).await
    }

    async fn pause(&self, _command: &Command) -> HandlerResult {
        let state = &self.runtime.state;
        state.set("listening", false);
        state.set("volume", 0);
        Ok(None)
    }
}

fn build_registry() -> HashMap<&'static str, HandlerEntry> {
    use HandlerEntry::{Ignore, Run};

    HashMap::from([
        (
            GET_EDITOR_STATE,
            Run(|handler, command| handler.get_editor_state(command).boxed()),
        ),
        (DIFF, Run(|handler, command| handler.diff(command).boxed())),
        (PASTE, Run(|handler, command| handler.paste(command).boxed())),
        (COPY, Run(|handler, command| handler.copy(command).boxed())),
        (SELECT, Run(|handler, command| handler.select(command).boxed())),
        (
            SWITCH_TAB,
            Run(|handler, command| handler.switch_tab(command).boxed()),
        ),
        (
            NEXT_TAB,
            Run(|handler, _| handler.run_action(HostAction::NextTab).boxed()),
        ),
        (
            PREVIOUS_TAB,
            Run(|handler, _| handler.run_action(HostAction::PreviousTab).boxed()),
        ),
        (
            CLOSE_TAB,
            Run(|handler, _| handler.run_action(HostAction::CloseTab).boxed()),
        ),
        (
            CLOSE_WINDOW,
            Run(|handler, _| handler.run_action(HostAction::CloseWindow).boxed()),
        ),
        (
            CREATE_TAB,
            Run(|handler, _| handler.run_action(HostAction::CreateTab).boxed()),
        ),
        (
            OPEN_FILE_LIST,
            Run(|handler, command| handler.open_file_list(command).boxed()),
        ),
        (
            OPEN_FILE,
            Run(|handler, command| handler.open_file(command).boxed()),
        ),
        (UNDO, Run(|handler, _| handler.history(HostAction::Undo).boxed())),
        (REDO, Run(|handler, _| handler.history(HostAction::Redo).boxed())),
        (
            SAVE,
            Run(|handler, _| handler.without_delay(HostAction::Save).boxed()),
        ),
        (
            GO_TO_DEFINITION,
            Run(|handler, _| handler.without_delay(HostAction::GoToDefinition).boxed()),
        ),
        (
            SPLIT,
            Run(|handler, command| handler.directional(command, true).boxed()),
        ),
        (
            WINDOW,
            Run(|handler, command| handler.directional(command, false).boxed()),
        ),
        (PAUSE, Run(|handler, command| handler.pause(command).boxed())),
        (CLICK, Ignore),
        (EVALUATE_IN_PLUGIN, Ignore),
        (INVALID, Ignore),
    ])
}

/// Inserts clipboard `text` into `source` and returns the new source with
/// the cursor placed after the pasted text.
///
/// Text ending in a newline pasted with a direction goes in as whole lines
/// above or below the cursor's line, leaving the cursor at the start of the
/// pasted block.
pub fn paste_text(
    source: &str,
    cursor: usize,
    direction: Option<PasteDirection>,
    text: &str,
) -> (String, usize) {
    let chars: Vec<char> = source.chars().collect();
    let cursor = cursor.min(chars.len());

    let (offset, inserted, next_cursor) = match direction {
        Some(direction) if text.ends_with('\n') => {
            let line_start = chars[..cursor]
                .iter()
                .rposition(|ch| *ch == '\n')
                .map_or(0, |index| index + 1);
            match direction {
                PasteDirection::Above => (line_start, text.to_string(), line_start),
                PasteDirection::Below => match chars[cursor..].iter().position(|ch| *ch == '\n') {
                    Some(index) => {
                        let offset = cursor + index + 1;
                        (offset, text.to_string(), offset)
                    }
                    None => {
                        let block = format!("\n{}", text.trim_end_matches('\n'));
                        (chars.len(), block, chars.len() + 1)
                    }
                },
            }
        }
        _ => (cursor, text.to_string(), cursor + text.chars().count()),
    };

    let mut result: String = chars[..offset].iter().collect();
    result.push_str(&inserted);
    result.extend(&chars[offset..]);
    (result, next_cursor)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::BridgeConfig;
    use crate::diff::DiffPoint;
    use crate::editor::memory::{MemoryEditor, MemoryWorkbench};
    use crate::state::AppState;

    struct Fixture {
        handler: CommandHandler,
        runtime: Arc<RuntimeState>,
        workbench: Arc<MemoryWorkbench>,
        editor: Arc<MemoryEditor>,
    }

    fn fixture(config: BridgeConfig, text: &str) -> Fixture {
        let runtime = AppState::new(config).runtime();
        let files = vec![
            PathBuf::from("/work/src/command_handler.rs"),
            PathBuf::from("/work/src/handler.rs"),
            PathBuf::from("/work/node_modules/handler/index.js"),
        ];
        let workbench =
            Arc::new(MemoryWorkbench::new().with_files(vec![PathBuf::from("/work")], files));
        let editor = workbench.open_tab(
            MemoryEditor::new(text)
                .with_path("/work/src/main.py", "python")
                .with_visible_rows(0, 20),
        );
        let active = ActiveEditor::fixed(editor.clone());
        let handler = CommandHandler::new(
            Arc::clone(&runtime),
            Arc::clone(&workbench) as Arc<dyn Workbench>,
            active,
        )
        .expect("registry is complete");

        Fixture {
            handler,
            runtime,
            workbench,
            editor,
        }
    }

    fn quiet() -> BridgeConfig {
        BridgeConfig {
            animations: false,
            ui_delay_ms: 0,
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn every_protocol_tag_is_registered() {
        let registry = build_registry();
        for tag in PROTOCOL_TAGS {
            assert!(registry.contains_key(tag), "{tag} is missing");
        }
    }

    #[test]
    fn command_fields_flatten_into_data() {
        let command: Command = serde_json::from_value(json!({
            "type": DIFF,
            "source": "x",
            "cursor": 1,
        }))
        .expect("parse command");

        assert_eq!(command.command_type, DIFF);
        assert_eq!(command.data.get("cursor"), Some(&json!(1)));
        let payload: DiffPayload = command.payload().expect("diff payload");
        assert_eq!(payload.source, "x");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_command_is_a_silent_no_op() {
        let fixture = fixture(quiet(), "text");
        let command = Command::new("COMMAND_TYPE_FOO", json!({"anything": 1}));

        assert_eq!(fixture.handler.dispatch(&command).await, None);
        assert!(fixture.runtime.state.keys().is_empty());
        assert_eq!(fixture.editor.text(), "text");
        let report = fixture.runtime.metrics.lock().await.report();
        assert_eq!(report.unknown_commands, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ignored_tags_do_nothing() {
        let fixture = fixture(quiet(), "text");
        for tag in [CLICK, EVALUATE_IN_PLUGIN, INVALID] {
            assert_eq!(
                fixture.handler.dispatch(&Command::new(tag, json!({}))).await,
                None
            );
        }
        assert!(fixture.workbench.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn diff_replaces_text_and_moves_cursor() {
        let fixture = fixture(quiet(), "foo\nbar\n");
        let command = Command::new(DIFF, json!({"source": "foo\nbaz\nqux\n", "cursor": 11}));

        assert_eq!(fixture.handler.dispatch(&command).await, None);
        assert_eq!(fixture.editor.text(), "foo\nbaz\nqux\n");
        assert_eq!(
            fixture.editor.selection(),
            (DiffPoint::new(2, 3), DiffPoint::new(2, 3))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn animated_diff_highlights_around_the_edit() {
        let config = BridgeConfig {
            ui_delay_ms: 0,
            ..BridgeConfig::default()
        };
        let fixture = fixture(config, "abc");
        let command = Command::new(DIFF, json!({"source": "abX", "cursor": 3}));

        fixture.handler.dispatch(&command).await;
        assert_eq!(fixture.editor.text(), "abX");
        tokio::time::sleep(Duration::from_millis(300)).await;

        let events = fixture.editor.decoration_events();
        let disposals = events
            .iter()
            .filter(|event| {
                matches!(event, crate::editor::memory::DecorationEvent::Dispose(_))
            })
            .count();
        assert_eq!(disposals, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_source_still_moves_cursor() {
        let fixture = fixture(quiet(), "ab\ncd");
        let command = Command::new(DIFF, json!({"source": "ab\ncd", "cursor": 4}));

        fixture.handler.dispatch(&command).await;
        assert_eq!(fixture.editor.selection().1, DiffPoint::new(1, 1));
        assert!(!fixture.editor.undo());
        assert!(fixture.editor.decoration_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_swallowed() {
        let fixture = fixture(quiet(), "keep");
        let command = Command::new(DIFF, json!({"cursor": "nope"}));

        assert_eq!(fixture.handler.dispatch(&command).await, None);
        assert_eq!(fixture.editor.text(), "keep");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_editor_is_a_no_op() {
        let runtime = AppState::new(quiet()).runtime();
        let workbench = Arc::new(MemoryWorkbench::new());
        let handler = CommandHandler::new(runtime, workbench, ActiveEditor::new())
            .expect("registry is complete");

        let command = Command::new(DIFF, json!({"source": "x", "cursor": 0}));
        assert_eq!(handler.dispatch(&command).await, None);
        assert_eq!(
            handler
                .dispatch(&Command::new(GET_EDITOR_STATE, json!({})))
                .await,
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn editor_state_reports_source_cursor_and_filename() {
        let fixture = fixture(quiet(), "ab\ncd");
        fixture
            .editor
            .set_selection(DiffPoint::new(1, 1), DiffPoint::new(1, 1));

        let response = fixture
            .handler
            .dispatch(&Command::new(GET_EDITOR_STATE, json!({})))
            .await
            .expect("editor state");

        assert_eq!(response.message, "editorState");
        assert_eq!(response.data["source"], json!("ab\ncd"));
        assert_eq!(response.data["cursor"], json!(4));
        assert_eq!(response.data["filename"], json!("main.py"));
        assert_eq!(response.data["roots"], json!(["/work"]));
    }

    #[tokio::test(start_paused = true)]
    async fn open_file_list_then_open_file() {
        let fixture = fixture(quiet(), "");
        let response = fixture
            .handler
            .dispatch(&Command::new(OPEN_FILE_LIST, json!({"path": "command handler"})))
            .await
            .expect("open file list reply");

        assert_eq!(response, Response::new("sendText", json!({"text": "callback open"})));

        let state = fixture
            .handler
            .dispatch(&Command::new(GET_EDITOR_STATE, json!({})))
            .await
            .expect("editor state");
        assert_eq!(
            state.data["files"],
            json!(["/work/src/command_handler.rs"])
        );

        fixture
            .handler
            .dispatch(&Command::new(OPEN_FILE, json!({"index": 0})))
            .await;
        assert_eq!(
            fixture.workbench.actions().last(),
            Some(&HostAction::OpenFile(PathBuf::from(
                "/work/src/command_handler.rs"
            )))
        );
        assert_eq!(fixture.workbench.tab_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn paste_inserts_clipboard_at_cursor() {
        let fixture = fixture(quiet(), "let x = ;\n");
        fixture
            .workbench
            .clipboard_write("42")
            .expect("clipboard write");

        fixture
            .handler
            .dispatch(&Command::new(PASTE, json!({"cursor": 8})))
            .await;
        assert_eq!(fixture.editor.text(), "let x = 42;\n");
        assert_eq!(fixture.editor.selection().1, DiffPoint::new(0, 10));
    }

    #[test]
    fn line_paste_goes_above_or_below() {
        let source = "one\ntwo\n";
        assert_eq!(
            paste_text(source, 5, Some(PasteDirection::Above), "new\n"),
            ("one\nnew\ntwo\n".to_string(), 4)
        );
        assert_eq!(
            paste_text(source, 5, Some(PasteDirection::Below), "new\n"),
            ("one\ntwo\nnew\n".to_string(), 8)
        );
        assert_eq!(
            paste_text("one", 1, Some(PasteDirection::Below), "new\n"),
            ("one\nnew".to_string(), 4)
        );
        assert_eq!(
            paste_text(source, 1, Some(PasteDirection::Below), "word"),
            ("owordne\ntwo\n".to_string(), 5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn copy_and_select() {
        let fixture = fixture(quiet(), "hello\nworld");
        fixture
            .handler
            .dispatch(&Command::new(COPY, json!({"text": "copied"})))
            .await;
        assert_eq!(fixture.workbench.clipboard(), "copied");

        fixture
            .handler
            .dispatch(&Command::new(SELECT, json!({"cursor": 2, "cursorEnd": 8})))
            .await;
        assert_eq!(
            fixture.editor.selection(),
            (DiffPoint::new(0, 2), DiffPoint::new(1, 2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tab_commands_drive_the_workbench() {
        let fixture = fixture(quiet(), "first");
        fixture.workbench.open_tab(MemoryEditor::new("second"));
        fixture.workbench.open_tab(MemoryEditor::new("third"));

        fixture
            .handler
            .dispatch(&Command::new(SWITCH_TAB, json!({"index": 0})))
            .await;
        assert_eq!(fixture.workbench.active_index(), 0);
        fixture
            .handler
            .dispatch(&Command::new(SWITCH_TAB, json!({"index": -1})))
            .await;
        assert_eq!(fixture.workbench.active_index(), 2);
        fixture
            .handler
            .dispatch(&Command::new(NEXT_TAB, json!({})))
            .await;
        assert_eq!(fixture.workbench.active_index(), 0);

        fixture
            .handler
            .dispatch(&Command::new(SPLIT, json!({"direction": "RIGHT"})))
            .await;
        assert!(
            fixture
                .workbench
                .actions()
                .contains(&HostAction::Split(Direction::Right))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn undo_reverts_and_scrolls_to_cursor() {
        let text: String = (0..60).map(|row| format!("line {row}\n")).collect();
        let fixture = fixture(quiet(), &text);
        let edited = text.replace("line 40\n", "line forty\n");
        let cursor = edited.find("forty").expect("edited row");

        fixture
            .handler
            .dispatch(&Command::new(DIFF, json!({"source": edited, "cursor": cursor})))
            .await;
        assert_eq!(fixture.editor.revealed_rows(), vec![40]);

        fixture
            .handler
            .dispatch(&Command::new(UNDO, json!({})))
            .await;
        assert_eq!(fixture.editor.text(), text);
        // row 40 is already centred, so undo does not scroll again
        assert_eq!(fixture.editor.revealed_rows(), vec![40]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_updates_listening_and_volume() {
        let fixture = fixture(quiet(), "");
        fixture.runtime.state.set("volume", 50);

        fixture
            .handler
            .dispatch(&Command::new(PAUSE, json!({})))
            .await;
        assert_eq!(fixture.runtime.state.get("listening"), Some(json!(false)));
        assert_eq!(fixture.runtime.state.get("volume"), Some(json!(0)));
    }
}
