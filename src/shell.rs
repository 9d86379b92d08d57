use anyhow::Result;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::signal::Signal;

/// Persisted shell layout, written to the workspace directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutState {
    pub sidebar_visible: bool,
    pub sidebar_width: u16,
    #[serde(default)]
    pub last_notebook: Option<PathBuf>,
}

impl Default for LayoutState {
    fn default() -> Self {
        Self {
            sidebar_visible: true,
            sidebar_width: 28,
            last_notebook: None,
        }
    }
}

/// Screen regions the shell hands to the renderer.
pub struct ShellAreas {
    pub sidebar: Option<Rect>,
    pub notebook: Rect,
    pub status: Rect,
}

/// The visual shell: owns the layout and its saved state, and resolves
/// the `restored` signal once that state has been loaded.
pub struct Shell {
    pub layout: LayoutState,
    state_path: PathBuf,
    restored: Signal,
}

impl Shell {
    pub fn new(state_path: PathBuf) -> Self {
        Self {
            layout: LayoutState::default(),
            state_path,
            restored: Signal::new(),
        }
    }

    /// Resolved once saved UI state finishes loading.
    pub fn restored(&self) -> Signal {
        self.restored.clone()
    }

    /// Load and apply the saved layout. A missing or unreadable state
    /// file falls back to the default layout; restore always settles.
    pub fn restore(&mut self) {
        match self.load_layout() {
            Ok(Some(layout)) => {
                self.layout = layout;
                tracing::info!("shell layout restored");
            }
            Ok(None) => tracing::info!("no saved layout, using defaults"),
            Err(err) => tracing::warn!("layout restore failed, using defaults: {err}"),
        }
        self.restored.resolve();
    }

    fn load_layout(&self) -> Result<Option<LayoutState>> {
        if !self.state_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.state_path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save_layout(&self) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.state_path, serde_json::to_string_pretty(&self.layout)?)?;
        Ok(())
    }

    pub fn toggle_sidebar(&mut self) {
        self.layout.sidebar_visible = !self.layout.sidebar_visible;
    }

    /// Split the frame into sidebar, notebook, and status bar areas.
    pub fn areas(&self, frame: Rect) -> ShellAreas {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(frame);
        let (body, status) = (rows[0], rows[1]);

        if self.layout.sidebar_visible {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Length(self.layout.sidebar_width),
                    Constraint::Min(10),
                ])
                .split(body);
            ShellAreas {
                sidebar: Some(columns[0]),
                notebook: columns[1],
                status,
            }
        } else {
            ShellAreas {
                sidebar: None,
                notebook: body,
                status,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restore_without_saved_state_uses_defaults_and_settles() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut shell = Shell::new(tmp.path().join("layout.json"));
        let restored = shell.restored();
        assert!(!restored.is_resolved());

        shell.restore();
        assert!(restored.is_resolved());
        assert_eq!(shell.layout, LayoutState::default());
    }

    #[test]
    fn corrupt_saved_state_still_settles() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("layout.json");
        fs::write(&path, "not json").expect("write");

        let mut shell = Shell::new(path);
        shell.restore();
        assert!(shell.restored().is_resolved());
        assert_eq!(shell.layout, LayoutState::default());
    }

    #[test]
    fn layout_round_trips_through_disk() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("layout.json");

        let mut shell = Shell::new(path.clone());
        shell.layout.sidebar_visible = false;
        shell.layout.sidebar_width = 40;
        shell.save_layout().expect("save");

        let mut reloaded = Shell::new(path);
        reloaded.restore();
        assert!(!reloaded.layout.sidebar_visible);
        assert_eq!(reloaded.layout.sidebar_width, 40);
    }

    #[test]
    fn hidden_sidebar_gives_the_notebook_the_full_body() {
        let mut shell = Shell::new(PathBuf::from("/unused"));
        shell.layout.sidebar_visible = false;
        let areas = shell.areas(Rect::new(0, 0, 80, 24));
        assert!(areas.sidebar.is_none());
        assert_eq!(areas.notebook.width, 80);
        assert_eq!(areas.status.height, 1);
    }
}
