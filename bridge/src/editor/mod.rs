//! The boundary to the host editor.
//!
//! Everything the command handlers need from the editor goes through the
//! [`Workbench`] (window level) and [`EditorHost`] (one document) traits, so
//! the pipeline runs the same against a real host binding or the in-memory
//! one in [`memory`].

pub mod memory;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Rgb;
use crate::diff::{DiffPoint, Edit};

pub type DecorationId = u64;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no active editor")]
    NoActiveEditor,
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("host rejected the edit: {0}")]
    EditRejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(format!("unknown direction `{other}`")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Up => "Up",
            Self::Down => "Down",
        };
        f.write_str(name)
    }
}

/// Window-level operations the host performs on request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    Focus,
    CloseTab,
    CloseWindow,
    CreateTab,
    NextTab,
    PreviousTab,
    SwitchTab(usize),
    LastTab,
    Undo,
    Redo,
    Save,
    GoToDefinition,
    Split(Direction),
    FocusGroup(Direction),
    OpenFile(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoration {
    pub color: Rgb,
    pub opacity: f32,
    pub whole_line: bool,
    pub start: DiffPoint,
    pub stop: DiffPoint,
}

pub trait EditorHost: Send + Sync {
    /// Stable identity, used to notice when the active editor changes.
    fn id(&self) -> u64;
    fn text(&self) -> String;
    /// Active end of the primary selection.
    fn cursor(&self) -> DiffPoint;
    fn set_selection(&self, start: DiffPoint, end: DiffPoint);
    /// Applies a batch of edits addressed in the current document's
    /// coordinates.
    fn apply_edits(&self, edits: &[Edit]) -> Result<(), HostError>;
    /// First and last visible rows, if the editor is on screen.
    fn visible_rows(&self) -> Option<(usize, usize)>;
    fn reveal_row(&self, row: usize);
    fn filename(&self) -> String;
    fn language_id(&self) -> String;
    fn set_decoration(&self, id: DecorationId, decoration: &Decoration);
    fn clear_decoration(&self, id: DecorationId);
    fn dispose_decorations(&self, ids: &[DecorationId]);
}

pub trait Workbench: Send + Sync {
    fn active_editor(&self) -> Option<Arc<dyn EditorHost>>;
    fn execute(&self, action: HostAction) -> Result<(), HostError>;
    fn clipboard_read(&self) -> Result<String, HostError>;
    fn clipboard_write(&self, text: &str) -> Result<(), HostError>;
    /// Workspace files matching `pattern` (`*` wildcards) and none of the
    /// `ignore` globs, at most `limit` of them.
    fn find_files(&self, pattern: &str, ignore: &[String], limit: usize) -> Vec<PathBuf>;
    fn workspace_roots(&self) -> Vec<PathBuf>;
}

/// The editor commands operate on.
///
/// Refreshed from the workbench on a fixed interval rather than on focus
/// events, so a command may see the previous editor for up to one interval
/// after the user switches documents. An empty workbench keeps the last
/// known editor.
#[derive(Clone, Default)]
pub struct ActiveEditor {
    current: Arc<RwLock<Option<Arc<dyn EditorHost>>>>,
}

impl ActiveEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(editor: Arc<dyn EditorHost>) -> Self {
        Self {
            current: Arc::new(RwLock::new(Some(editor))),
        }
    }

    pub fn get(&self) -> Option<Arc<dyn EditorHost>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stores `editor` and reports whether it differs from the previous one.
    pub fn replace(&self, editor: Arc<dyn EditorHost>) -> bool {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let changed = current.as_ref().is_none_or(|previous| previous.id() != editor.id());
        *current = Some(editor);
        changed
    }

    /// Polls `workbench` every `interval`, calling `on_change` whenever the
    /// active editor switches.
    pub fn spawn_polling<F>(
        &self,
        workbench: Arc<dyn Workbench>,
        interval: Duration,
        on_change: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<dyn EditorHost>) + Send + 'static,
    {
        let accessor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(editor) = workbench.active_editor() else {
                    continue;
                };
                if accessor.replace(Arc::clone(&editor)) {
                    debug!(editor_id = editor.id(), "active editor changed");
                    on_change(editor);
                }
            }
        })
    }
}

const KNOWN_EXTENSIONS: &[&str] = &[
    "js", "jsx", "vue", "ts", "tsx", "java", "py", "html", "css", "less", "scss",
];

/// Name reported to the speech engine for `editor`, which uses the extension
/// to pick a language. Unknown extensions get one derived from the host's
/// language id.
pub fn filename_for_editor(editor: &dyn EditorHost) -> String {
    let path = editor.filename();
    let mut filename = Path::new(&path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if KNOWN_EXTENSIONS
        .iter()
        .any(|extension| filename.ends_with(&format!(".{extension}")))
    {
        return filename;
    }

    if filename.is_empty() {
        filename = "file".to_string();
    }

    let extension = match editor.language_id().as_str() {
        "javascript" | "javascriptreact" => "js",
        "typescript" => "ts",
        "typescriptreact" => "tsx",
        "java" => "java",
        "python" => "py",
        "html" => "html",
        "css" => "css",
        "less" => "less",
        "scss" => "scss",
        _ => return filename,
    };
    format!("{filename}.{extension}")
}
