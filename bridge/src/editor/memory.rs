//! In-memory host used by the headless binary and by tests.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use super::{Decoration, DecorationId, EditorHost, HostAction, HostError, Workbench};
use crate::diff::{self, DiffPoint, Edit};

static NEXT_EDITOR_ID: AtomicU64 = AtomicU64::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the host was asked to draw, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum DecorationEvent {
    Set(DecorationId, Decoration),
    Clear(DecorationId),
    Dispose(Vec<DecorationId>),
}

#[derive(Debug, Default)]
struct Document {
    text: String,
    selection: (DiffPoint, DiffPoint),
    undo: Vec<String>,
    redo: Vec<String>,
    visible_rows: Option<(usize, usize)>,
    revealed: Vec<usize>,
    decorations: Vec<DecorationEvent>,
}

pub struct MemoryEditor {
    id: u64,
    path: String,
    language_id: String,
    document: Mutex<Document>,
}

impl MemoryEditor {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: NEXT_EDITOR_ID.fetch_add(1, Ordering::Relaxed),
            path: String::new(),
            language_id: "plaintext".to_string(),
            document: Mutex::new(Document {
                text: text.into(),
                ..Document::default()
            }),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>, language_id: impl Into<String>) -> Self {
        self.path = path.into();
        self.language_id = language_id.into();
        self
    }

    pub fn with_visible_rows(self, first: usize, last: usize) -> Self {
        lock(&self.document).visible_rows = Some((first, last));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn selection(&self) -> (DiffPoint, DiffPoint) {
        lock(&self.document).selection
    }

    pub fn revealed_rows(&self) -> Vec<usize> {
        lock(&self.document).revealed.clone()
    }

    pub fn decoration_events(&self) -> Vec<DecorationEvent> {
        lock(&self.document).decorations.clone()
    }

    pub fn undo(&self) -> bool {
        let mut document = lock(&self.document);
        let Some(previous) = document.undo.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut document.text, previous);
        document.redo.push(current);
        true
    }

    pub fn redo(&self) -> bool {
        let mut document = lock(&self.document);
        let Some(next) = document.redo.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut document.text, next);
        document.undo.push(current);
        true
    }
}

impl EditorHost for MemoryEditor {
    fn id(&self) -> u64 {
        self.id
    }

    fn text(&self) -> String {
        lock(&self.document).text.clone()
    }

    fn cursor(&self) -> DiffPoint {
        lock(&self.document).selection.1
    }

    fn set_selection(&self, start: DiffPoint, end: DiffPoint) {
        lock(&self.document).selection = (start, end);
    }

    fn apply_edits(&self, edits: &[Edit]) -> Result<(), HostError> {
        if edits.is_empty() {
            return Ok(());
        }

        let mut document = lock(&self.document);
        let updated = diff::apply_edits(&document.text, edits);
        let previous = std::mem::replace(&mut document.text, updated);
        document.undo.push(previous);
        document.redo.clear();
        Ok(())
    }

    fn visible_rows(&self) -> Option<(usize, usize)> {
        lock(&self.document).visible_rows
    }

    fn reveal_row(&self, row: usize) {
        let mut document = lock(&self.document);
        document.revealed.push(row);
        if let Some((first, last)) = document.visible_rows {
            let height = last.saturating_sub(first);
            let top = row.saturating_sub(height / 2);
            document.visible_rows = Some((top, top + height));
        }
    }

    fn filename(&self) -> String {
        self.path.clone()
    }

    fn language_id(&self) -> String {
        self.language_id.clone()
    }

    fn set_decoration(&self, id: DecorationId, decoration: &Decoration) {
        lock(&self.document)
            .decorations
            .push(DecorationEvent::Set(id, *decoration));
    }

    fn clear_decoration(&self, id: DecorationId) {
        lock(&self.document)
            .decorations
            .push(DecorationEvent::Clear(id));
    }

    fn dispose_decorations(&self, ids: &[DecorationId]) {
        lock(&self.document)
            .decorations
            .push(DecorationEvent::Dispose(ids.to_vec()));
    }
}

#[derive(Default)]
struct Tabs {
    editors: Vec<Arc<MemoryEditor>>,
    active: usize,
    clipboard: String,
    files: Vec<PathBuf>,
    roots: Vec<PathBuf>,
    actions: Vec<HostAction>,
}

impl Tabs {
    fn active_editor(&self) -> Option<&Arc<MemoryEditor>> {
        self.editors.get(self.active)
    }
}

/// A tab strip of [`MemoryEditor`]s with a clipboard and a fixed file list.
#[derive(Default)]
pub struct MemoryWorkbench {
    tabs: Mutex<Tabs>,
}

impl MemoryWorkbench {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(self, roots: Vec<PathBuf>, files: Vec<PathBuf>) -> Self {
        {
            let mut tabs = lock(&self.tabs);
            tabs.roots = roots;
            tabs.files = files;
        }
        self
    }

    pub fn open_tab(&self, editor: MemoryEditor) -> Arc<MemoryEditor> {
        let editor = Arc::new(editor);
        let mut tabs = lock(&self.tabs);
        tabs.editors.push(Arc::clone(&editor));
        tabs.active = tabs.editors.len() - 1;
        editor
    }

    /// Opens the file at `path`, or an empty document if it does not exist.
    pub fn open_path(&self, path: PathBuf) -> Result<Arc<MemoryEditor>, HostError> {
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(HostError::Io { path, source }),
        };
        let language_id = language_for_path(&path);
        let editor = MemoryEditor::new(text).with_path(path.to_string_lossy(), language_id);
        Ok(self.open_tab(editor))
    }

    pub fn tab_count(&self) -> usize {
        lock(&self.tabs).editors.len()
    }

    pub fn active_index(&self) -> usize {
        lock(&self.tabs).active
    }

    pub fn clipboard(&self) -> String {
        lock(&self.tabs).clipboard.clone()
    }

    pub fn actions(&self) -> Vec<HostAction> {
        lock(&self.tabs).actions.clone()
    }

    fn save_active(&self) -> Result<(), HostError> {
        let Some(editor) = lock(&self.tabs).active_editor().cloned() else {
            return Err(HostError::NoActiveEditor);
        };
        if editor.path().is_empty() {
            debug!("active document is untitled; nothing to save");
            return Ok(());
        }

        let path = PathBuf::from(editor.path());
        fs::write(&path, editor.text()).map_err(|source| HostError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "saved document");
        Ok(())
    }
}

impl Workbench for MemoryWorkbench {
    fn active_editor(&self) -> Option<Arc<dyn EditorHost>> {
        lock(&self.tabs)
            .active_editor()
            .map(|editor| Arc::clone(editor) as Arc<dyn EditorHost>)
    }

    fn execute(&self, action: HostAction) -> Result<(), HostError> {
        lock(&self.tabs).actions.push(action.clone());

        match action {
            HostAction::Save => return self.save_active(),
            HostAction::OpenFile(path) => {
                let existing = {
                    let tabs = lock(&self.tabs);
                    let name = path.to_string_lossy();
                    tabs.editors.iter().position(|editor| editor.path() == name)
                };
                match existing {
                    Some(index) => lock(&self.tabs).active = index,
                    None => {
                        self.open_path(path)?;
                    }
                }
                return Ok(());
            }
            _ => {}
        }

        let mut tabs = lock(&self.tabs);
        let count = tabs.editors.len();
        match action {
            HostAction::NextTab if count > 0 => tabs.active = (tabs.active + 1) % count,
            HostAction::PreviousTab if count > 0 => tabs.active = (tabs.active + count - 1) % count,
            HostAction::SwitchTab(index) if index < count => tabs.active = index,
            HostAction::LastTab if count > 0 => tabs.active = count - 1,
            HostAction::CloseTab | HostAction::CloseWindow if count > 0 => {
                let active = tabs.active;
                tabs.editors.remove(active);
                tabs.active = active.min(tabs.editors.len().saturating_sub(1));
            }
            HostAction::CreateTab => {
                tabs.editors.push(Arc::new(MemoryEditor::new("")));
                tabs.active = tabs.editors.len() - 1;
            }
            HostAction::Undo => {
                if let Some(editor) = tabs.active_editor() {
                    editor.undo();
                }
            }
            HostAction::Redo => {
                if let Some(editor) = tabs.active_editor() {
                    editor.redo();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn clipboard_read(&self) -> Result<String, HostError> {
        Ok(lock(&self.tabs).clipboard.clone())
    }

    fn clipboard_write(&self, text: &str) -> Result<(), HostError> {
        lock(&self.tabs).clipboard = text.to_string();
        Ok(())
    }

    fn find_files(&self, pattern: &str, ignore: &[String], limit: usize) -> Vec<PathBuf> {
        lock(&self.tabs)
            .files
            .iter()
            .filter(|path| {
                let path = path.to_string_lossy();
                let name = path.rsplit(['/', '\\']).next().unwrap_or(&path);
                glob_match(pattern, name)
                    && !ignore.iter().any(|ignored| glob_match(ignored, &path))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    fn workspace_roots(&self) -> Vec<PathBuf> {
        lock(&self.tabs).roots.clone()
    }
}

fn language_for_path(path: &std::path::Path) -> String {
    let language = match path.extension().and_then(|extension| extension.to_str()) {
        Some("js") => "javascript",
        Some("jsx") => "javascriptreact",
        Some("ts") => "typescript",
        Some("tsx") => "typescriptreact",
        Some("py") => "python",
        Some("java") => "java",
        Some("html") => "html",
        Some("css") => "css",
        Some("less") => "less",
        Some("scss") => "scss",
        Some("rs") => "rust",
        _ => "plaintext",
    };
    language.to_string()
}

/// Case-insensitive match where `*` (and `**`) stands for any run of
/// characters.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();

    let [first, middle @ .., last] = parts.as_slice() else {
        return pattern == text;
    };

    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}
