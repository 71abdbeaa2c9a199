use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::config::{BridgeConfig, Rgb};
use crate::diff::{DiffHighlightType, DiffPoint, DiffRange};
use crate::editor::{ActiveEditor, Decoration, DecorationId, EditorHost};
use crate::state::StateManager;

/// Opacity in tenths for each step of the fade.
const STEPS: [u8; 7] = [1, 2, 3, 4, 3, 2, 1];

#[derive(Debug, Clone, Copy)]
struct Colors {
    error: Rgb,
    success: Rgb,
}

#[derive(Debug, Deserialize)]
struct SetColor {
    name: String,
    value: String,
}

/// Cancels a running highlight and removes whatever it had drawn.
#[derive(Clone, Default)]
pub struct HighlightHandle {
    inner: Arc<Mutex<Option<Running>>>,
}

struct Running {
    editor: Arc<dyn EditorHost>,
    decorations: Vec<DecorationId>,
    tasks: Vec<AbortHandle>,
}

impl HighlightHandle {
    pub fn cancel(&self) {
        let running = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        for task in &running.tasks {
            task.abort();
        }
        for id in &running.decorations {
            running.editor.clear_decoration(*id);
        }
        running.editor.dispose_decorations(&running.decorations);
    }

    pub fn is_finished(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|running| running.tasks.iter().all(AbortHandle::is_finished))
    }
}

pub struct Animation {
    /// Time until the last step has been cleared.
    pub duration: Duration,
    pub handle: HighlightHandle,
}

/// Runs the attack/sustain/release fade over changed ranges.
///
/// Every step of every range is its own timer task; nothing waits for the
/// animation to finish, so callers sequence on the returned duration.
pub struct HighlightSequencer {
    colors: Arc<RwLock<Colors>>,
    duration: Duration,
    cancel_overlapping: bool,
    next_decoration: AtomicU64,
    previous: Mutex<Option<HighlightHandle>>,
}

impl HighlightSequencer {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            colors: Arc::new(RwLock::new(Colors {
                error: config.error_rgb(),
                success: config.success_rgb(),
            })),
            duration: Duration::from_millis(config.highlight_duration_ms),
            cancel_overlapping: config.cancel_overlapping_highlights,
            next_decoration: AtomicU64::new(1),
            previous: Mutex::new(None),
        }
    }

    /// Keeps the colours in sync with `setColor` state updates.
    pub fn watch_colors(&self, state: &StateManager) {
        let colors = Arc::clone(&self.colors);
        state.subscribe("setColor", move |value, _| {
            let update = match SetColor::deserialize(value) {
                Ok(update) => update,
                Err(err) => {
                    warn!("ignoring malformed setColor update: {err}");
                    return;
                }
            };
            let rgb = match update.value.parse::<Rgb>() {
                Ok(rgb) => rgb,
                Err(err) => {
                    warn!("ignoring setColor update: {err}");
                    return;
                }
            };

            let mut colors = colors.write().unwrap_or_else(PoisonError::into_inner);
            match update.name.as_str() {
                "success-color" => colors.success = rgb,
                "error-color" => colors.error = rgb,
                other => debug!(name = other, "ignoring unknown color name"),
            }
        });
    }

    /// Animates ranges published under `highlightedRanges` on whichever
    /// editor is active at the time.
    pub fn watch_ranges(self: &Arc<Self>, state: &StateManager, active: ActiveEditor) {
        let sequencer = Arc::clone(self);
        state.subscribe("highlightedRanges", move |value, _| {
            let ranges = match Vec::<DiffRange>::deserialize(value) {
                Ok(ranges) => ranges,
                Err(err) => {
                    warn!("ignoring malformed highlightedRanges update: {err}");
                    return;
                }
            };
            if ranges.is_empty() {
                return;
            }
            let Some(editor) = active.get() else {
                debug!("no active editor; skipping highlight");
                return;
            };
            if tokio::runtime::Handle::try_current().is_err() {
                warn!("no async runtime; skipping highlight");
                return;
            }
            sequencer.animate(&editor, &ranges);
        });
    }

    pub fn animate(&self, editor: &Arc<dyn EditorHost>, ranges: &[DiffRange]) -> Animation {
        if self.cancel_overlapping {
            let previous = self
                .previous
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(previous) = previous {
                previous.cancel();
            }
        }

        if ranges.is_empty() {
            return Animation {
                duration: Duration::ZERO,
                handle: HighlightHandle::default(),
            };
        }

        let step = self.duration / STEPS.len() as u32;
        let colors = *self.colors.read().unwrap_or_else(PoisonError::into_inner);
        let mut decorations = Vec::with_capacity(ranges.len() * STEPS.len());
        let mut tasks = Vec::with_capacity(ranges.len() * STEPS.len());

        for range in ranges {
            let color = if range.is_delete() {
                colors.error
            } else {
                colors.success
            };
            let (start, stop) = host_span(range);
            let ids: Arc<[DecorationId]> = STEPS
                .iter()
                .map(|_| self.next_decoration.fetch_add(1, Ordering::Relaxed))
                .collect();
            decorations.extend(ids.iter().copied());

            for (index, intensity) in STEPS.iter().enumerate() {
                let decoration = Decoration {
                    color,
                    opacity: f32::from(*intensity) / 10.0,
                    whole_line: range.highlight_type == DiffHighlightType::Line,
                    start,
                    stop,
                };
                let editor = Arc::clone(editor);
                let ids = Arc::clone(&ids);
                let delay = step * index as u32;
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    editor.set_decoration(ids[index], &decoration);
                    tokio::time::sleep(step).await;
                    editor.clear_decoration(ids[index]);
                    if index == STEPS.len() - 1 {
                        editor.dispose_decorations(&ids);
                    }
                });
                tasks.push(task.abort_handle());
            }
        }

        let handle = HighlightHandle {
            inner: Arc::new(Mutex::new(Some(Running {
                editor: Arc::clone(editor),
                decorations,
                tasks,
            }))),
        };
        *self
            .previous
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());

        Animation {
            duration: step * STEPS.len() as u32,
            handle,
        }
    }
}

/// Span handed to the host. Whole-line decorations are inclusive of their
/// last row, so a line range ending at column zero stops on the row above.
fn host_span(range: &DiffRange) -> (DiffPoint, DiffPoint) {
    let mut stop = range.stop;
    if range.highlight_type == DiffHighlightType::Line
        && stop.column == 0
        && stop.row > range.start.row
    {
        stop.row -= 1;
    }
    (range.start, stop)
}
