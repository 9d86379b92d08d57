use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent};

use crate::input::target::{InputTarget, InputType, Mark, PendingInput};
use crate::msg::Msg;

/// The delay the guard waits for a pending-input notification before
/// letting a shortcut through. Decreasing it risks shortcuts firing on
/// keys that were about to produce text; increasing it adds latency to
/// shortcut invocation. User keystrokes themselves are never delayed.
pub const INPUT_GUARD_TIMEOUT: Duration = Duration::from_millis(10);

/// Keys that are safe to dispatch as shortcuts even during text entry.
const FAST_PATH_KEYS: [KeyCode; 5] = [
    KeyCode::Tab,
    KeyCode::Up,
    KeyCode::Down,
    KeyCode::Left,
    KeyCode::Right,
];

/// Synchronous outcome of considering a keydown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Forward to the command registry now, with zero added delay.
    Dispatch,
    /// A guard race was started; the verdict arrives later as
    /// [`Msg::DispatchKey`], or not at all.
    Deferred,
}

/// Decides, per keydown, whether shortcut dispatch may proceed
/// immediately or must wait out a race against the editor's
/// pending-input notification.
pub struct InputGuard {
    timeout: Duration,
    event_tx: mpsc::Sender<Msg>,
}

impl InputGuard {
    pub fn new(timeout: Duration, event_tx: mpsc::Sender<Msg>) -> Self {
        Self { timeout, event_tx }
    }

    /// Consider a keydown. Fast-path keys return [`Disposition::Dispatch`]
    /// so the caller forwards them without delay. Any other key starts a
    /// race between a one-shot pending-input listener on `target` and a
    /// timer; if the timer wins, or the notification turns out not to
    /// denote text input, the key is re-emitted as [`Msg::DispatchKey`].
    ///
    /// This never blocks the caller and never panics out of the key
    /// handler; race failures are logged and degrade to "no dispatch for
    /// this event".
    pub fn consider(&self, key: KeyEvent, target: Option<&InputTarget>) -> Disposition {
        if FAST_PATH_KEYS.contains(&key.code) {
            return Disposition::Dispatch;
        }

        // A key with no focus target cannot produce text input.
        let Some(target) = target else {
            return Disposition::Dispatch;
        };

        let (verdict_tx, verdict_rx) = mpsc::channel();
        target.listen_once(move |notice| {
            // The race may already be over; a failed send is the loser
            // being discarded.
            let _ = verdict_tx.send(evaluate(notice));
        });

        let event_tx = self.event_tx.clone();
        let timeout = self.timeout;
        thread::spawn(move || {
            let suppress = match verdict_rx.recv_timeout(timeout) {
                Ok(suppress) => suppress,
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("input guard listener dropped before producing a verdict");
                    return;
                }
            };
            if !suppress {
                let _ = event_tx.send(Msg::DispatchKey(key));
            }
        });

        Disposition::Deferred
    }
}

/// Inspect a pending-input notification and decide whether shortcut
/// dispatch must be suppressed.
///
/// Undo/redo inside a custom undoer and line breaks inside a cell editor
/// cancel the default edit and keep the shortcut suppressed: both are
/// reserved for bindings owned by those components. The same input types
/// outside their designated containers do not count as text input, so
/// the shortcut goes through. Everything else is imminent text entry.
fn evaluate(notice: &PendingInput) -> bool {
    match notice.input_type {
        InputType::HistoryUndo | InputType::HistoryRedo => {
            if notice.target.closest(Mark::CustomUndoer) {
                notice.prevent_default();
                true
            } else {
                false
            }
        }
        InputType::InsertLineBreak => {
            if notice.target.closest(Mark::CellEditor) {
                notice.prevent_default();
                true
            } else {
                false
            }
        }
        _ => true,
    }
}
