use crossterm::event::KeyEvent;
use std::path::PathBuf;

use crate::model::mode::Mode;

/// Which startup activation batch settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationBatch {
    /// All plugins flagged deferred (not needed for first paint).
    Deferred,
    /// The explicitly configured list of deferred plugin ids.
    Customized,
}

impl ActivationBatch {
    pub fn label(&self) -> &'static str {
        match self {
            ActivationBatch::Deferred => "deferred",
            ActivationBatch::Customized => "customized",
        }
    }
}

/// All possible messages that drive state transitions.
#[derive(Debug)]
pub enum Msg {
    // -- Input events (raw)
    Key(KeyEvent),
    /// A key the input guard cleared for shortcut dispatch.
    DispatchKey(KeyEvent),
    Resize(u16, u16),

    // -- Startup sequencing
    /// The shell finished restoring its saved layout.
    ShellRestored,
    /// An activation batch settled, with its accumulated error count.
    ActivationBatchSettled(ActivationBatch, usize),

    // -- Commands & notifications
    RunCommand(String),
    Notify(String),

    // -- Notebook operations
    SelectCell(i64),
    InsertCellBelow,
    DeleteCell,
    RunCell,
    UndoCell,
    RedoCell,
    SaveNotebook,
    OpenNotebook(PathBuf),

    // -- Mode
    SetMode(Mode),

    // -- System
    Tick,
    Quit,
}
