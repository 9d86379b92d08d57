/// Application interaction modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Command mode — cell navigation and shortcuts.
    #[default]
    Command,
    /// Edit mode — text entry into the active cell.
    Edit,
    /// Command palette (`:` prefix).
    Palette,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Command => "COMMAND",
            Mode::Edit => "EDIT",
            Mode::Palette => "PALETTE",
        }
    }
}
