use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::commands::CommandRegistry;
use crate::input::{Disposition, Element, InputGuard, InputTarget, InputType, Mark, PendingInput};
use crate::model::config::{AppConfig, AppInfo, AppInfoOverlay, ConfigSource};
use crate::model::mode::Mode;
use crate::model::notebook::{CellKind, Notebook};
use crate::msg::Msg;
use crate::plugin::{PluginContext, PluginId, PluginRegistry, builtin, discover};
use crate::services::{ServiceConnection, Standby};
use crate::shell::Shell;
use crate::signal::Signal;
use crate::startup::StartupSequencer;

/// The application object. Instantiated once; wires the plugin registry,
/// the shell, the command processor, and the input guard together, and
/// owns the startup activation sequencing.
pub struct App {
    pub name: String,
    pub version: String,
    pub mode: Mode,
    pub notebook: Notebook,
    pub shell: Shell,
    pub config: AppConfig,
    pub info: AppInfo,
    pub services: ServiceConnection,
    pub should_quit: bool,
    registry: Arc<Mutex<PluginRegistry>>,
    commands: Arc<Mutex<CommandRegistry>>,
    guard: InputGuard,
    sequencer: StartupSequencer,
    root: Arc<Element>,
    focus: InputTarget,
    palette_input: String,
    notifications: VecDeque<String>,
    workspace_files: Vec<String>,
    event_tx: mpsc::Sender<Msg>,
}

impl App {
    pub fn new(config: AppConfig, overlay: AppInfoOverlay, event_tx: mpsc::Sender<Msg>) -> Result<Self> {
        std::fs::create_dir_all(config.workspace_path())?;

        let mut info = overlay.apply(AppInfo::from_source(&config, &config));
        let name = config
            .get("app_name")
            .unwrap_or_else(|| "notelab".to_string());
        let version = env!("CARGO_PKG_VERSION").to_string();

        let commands = Arc::new(Mutex::new(CommandRegistry::new()));

        let mut registry = PluginRegistry::new();
        registry.register_module(builtin::core_plugins(&event_tx));
        let plugin_dirs: Vec<_> = config.plugins.dirs.iter().map(Into::into).collect();
        let (discovered, manifest_errors) = discover::discover_plugins(&plugin_dirs);
        registry.register_module(discovered);
        for err in manifest_errors {
            registry.record_error(err);
        }
        registry.resolve_flags(&mut info.deferred, &mut info.disabled);

        let ctx = PluginContext {
            commands: Arc::clone(&commands),
            event_tx: event_tx.clone(),
        };

        // Plugins needed for first paint activate before the loop starts.
        for (id, result) in registry.activate_startup(&ctx) {
            if let Err(err) = result {
                tracing::warn!("startup plugin {id}: {err}");
            }
        }

        let registry = Arc::new(Mutex::new(registry));
        let customized: Vec<PluginId> = info
            .deferred
            .matches
            .iter()
            .map(|id| PluginId::new(id.clone()))
            .collect();
        let sequencer = StartupSequencer::new(Arc::clone(&registry), ctx, customized);

        let guard = InputGuard::new(
            Duration::from_millis(config.input.guard_timeout_ms),
            event_tx.clone(),
        );

        let root = Element::root(vec![]);
        let focus = InputTarget::new(Element::child(&root, vec![]));
        let workspace_files = list_workspace_files(&config);
        let services = ServiceConnection::new(info.is_connected);

        let mut app = Self {
            name,
            version,
            mode: Mode::Command,
            notebook: Notebook::new(),
            shell: Shell::new(config.layout_path()),
            config,
            info,
            services,
            should_quit: false,
            registry,
            commands,
            guard,
            sequencer,
            root,
            focus,
            palette_input: String::new(),
            notifications: VecDeque::new(),
            workspace_files,
            event_tx,
        };
        app.refresh_focus();
        Ok(app)
    }

    /// Restore the shell and kick off deferred activation. Called once,
    /// before the event loop starts draining messages.
    pub fn start(&mut self) {
        self.shell.restore();
        if let Some(path) = self.shell.layout.last_notebook.clone() {
            self.open_notebook(path);
        }
        // Forward the shell's restore signal into the event loop.
        if self.shell.restored().is_resolved() {
            let _ = self.event_tx.send(Msg::ShellRestored);
        }
    }

    /// Resolves once default and customized deferred activation have
    /// both settled. Multicast; late subscribers see the resolved state.
    pub fn all_plugins_activated(&self) -> Signal {
        self.sequencer.all_activated()
    }

    // ── MVU: Update ──────────────────────────────────────────────

    pub fn update(&mut self, msg: Msg) -> Result<()> {
        match msg {
            Msg::Key(key) => self.handle_key(key),
            Msg::DispatchKey(key) => self.dispatch_key(key),
            Msg::Resize(_, _) => {}
            Msg::ShellRestored => self.sequencer.on_restored(),
            Msg::ActivationBatchSettled(batch, errors) => {
                self.sequencer.on_batch_settled(batch, errors);
            }
            Msg::RunCommand(command) => self.run_palette_command(&command),
            Msg::Notify(message) => self.push_notification(message),
            Msg::SelectCell(delta) => {
                self.notebook.select(delta);
                self.refresh_focus();
            }
            Msg::InsertCellBelow => {
                self.notebook.insert_below();
                self.schedule_auto_save();
                self.refresh_focus();
            }
            Msg::DeleteCell => {
                self.notebook.delete_active();
                self.schedule_auto_save();
                self.refresh_focus();
            }
            Msg::RunCell => self.run_active_cell(),
            Msg::UndoCell => {
                self.notebook.active_cell_mut().undo();
            }
            Msg::RedoCell => {
                self.notebook.active_cell_mut().redo();
            }
            Msg::SaveNotebook => {
                if let Err(err) = self.notebook.save() {
                    tracing::warn!("saving notebook: {err}");
                    self.push_notification(format!("save failed: {err}"));
                }
            }
            Msg::OpenNotebook(path) => self.open_notebook(path),
            Msg::SetMode(mode) => self.set_mode(mode),
            Msg::Tick => self.handle_tick(),
            Msg::Quit => self.should_quit = true,
        }
        Ok(())
    }

    // ── Keydown boundary ─────────────────────────────────────────

    /// The application-boundary keydown handler. Shortcut dispatch goes
    /// through the input guard; keys the focused editor consumes
    /// outright never reach it.
    fn handle_key(&mut self, key: KeyEvent) {
        if self.mode == Mode::Palette {
            self.handle_key_palette(key);
            return;
        }
        if self.mode == Mode::Edit && editor_consumes(&key) {
            match key.code {
                KeyCode::Left | KeyCode::Right => self.move_cursor(key.code),
                _ => self.apply_editor_key(key),
            }
            return;
        }
        match self.guard.consider(key, Some(&self.focus)) {
            Disposition::Dispatch => self.dispatch_key(key),
            Disposition::Deferred => {
                // The editor layer runs while the guard races; any
                // pending-input it emits resolves the race.
                if self.mode == Mode::Edit {
                    self.apply_editor_key(key);
                }
            }
        }
    }

    fn dispatch_key(&mut self, key: KeyEvent) {
        let mut commands = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !commands.process_keydown(&key) {
            tracing::trace!("no binding for {:?}", key.code);
        }
    }

    /// Translate a key into an editor intent, announce it as a
    /// pending-input notification, and apply the default edit unless a
    /// listener cancelled it.
    fn apply_editor_key(&mut self, key: KeyEvent) {
        let Some(input_type) = editor_intent(&key) else {
            return;
        };
        let notice = PendingInput::new(input_type, Arc::clone(self.focus.element()));
        let allowed = self.focus.emit_pending_input(&notice);
        match input_type {
            InputType::InsertText => {
                if allowed {
                    if let KeyCode::Char(ch) = key.code {
                        self.notebook.active_cell_mut().insert_char(ch);
                        self.mark_edited();
                    }
                }
            }
            InputType::InsertLineBreak => {
                if allowed {
                    self.notebook.active_cell_mut().insert_newline();
                    self.mark_edited();
                } else {
                    // Reserved for cell execution.
                    self.run_active_cell();
                }
            }
            InputType::DeleteContentBackward => {
                if allowed {
                    self.notebook.active_cell_mut().delete_char_before();
                    self.mark_edited();
                }
            }
            InputType::HistoryUndo => {
                if allowed {
                    self.notebook.active_cell_mut().undo();
                } else {
                    // The cell editor owns undo here; route through its
                    // dedicated command instead of the native path.
                    let _ = self.event_tx.send(Msg::UndoCell);
                }
            }
            InputType::HistoryRedo => {
                if allowed {
                    self.notebook.active_cell_mut().redo();
                } else {
                    let _ = self.event_tx.send(Msg::RedoCell);
                }
            }
        }
    }

    fn handle_key_palette(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.palette_input.clear();
                self.set_mode(Mode::Command);
            }
            KeyCode::Enter => {
                let command = self.palette_input.trim().to_string();
                self.palette_input.clear();
                self.set_mode(Mode::Command);
                if !command.is_empty() {
                    let _ = self.event_tx.send(Msg::RunCommand(command));
                }
            }
            KeyCode::Backspace => {
                self.palette_input.pop();
            }
            KeyCode::Char(ch)
                if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
            {
                self.palette_input.push(ch);
            }
            _ => {}
        }
    }

    // ── Commands & notebook operations ───────────────────────────

    fn run_palette_command(&mut self, command: &str) {
        let registry = Arc::clone(&self.registry);
        let notes = match command {
            "plugins" => vec![
                registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .summary_notification(),
            ],
            "plugins.list" => registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .list_notifications(),
            "plugins.errors" => {
                let errors = registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .error_notifications();
                if errors.is_empty() {
                    vec!["plugins: no errors".to_string()]
                } else {
                    errors
                }
            }
            "commands" => {
                let commands = self
                    .commands
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                commands
                    .command_ids()
                    .iter()
                    .map(|id| {
                        format!("{id}: {}", commands.label(id).unwrap_or_default())
                    })
                    .collect()
            }
            "sidebar" => {
                self.shell.toggle_sidebar();
                Vec::new()
            }
            "kernel" => {
                let connected = !self.services.is_connected();
                self.services.set_connected(connected);
                vec![format!(
                    "kernel connection {}",
                    if connected { "restored" } else { "dropped" }
                )]
            }
            id => {
                if let Some(name) = id.strip_prefix("open ") {
                    let path = self.config.workspace_path().join(name.trim());
                    let _ = self.event_tx.send(Msg::OpenNotebook(path));
                    Vec::new()
                } else {
                    let mut commands = self
                        .commands
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    match commands.run(id) {
                        Ok(()) => Vec::new(),
                        Err(err) => vec![err.to_string()],
                    }
                }
            }
        };
        for note in notes {
            self.push_notification(note);
        }
    }

    fn run_active_cell(&mut self) {
        let connected = self.services.is_connected();
        let cell = self.notebook.active_cell_mut();
        if cell.kind == CellKind::Markdown {
            cell.outputs.clear();
        } else if connected {
            cell.outputs = vec![format!("ok: ran {} line(s)", cell.line_count())];
        } else {
            cell.outputs = vec!["kernel unavailable; run queued".to_string()];
        }
        self.schedule_auto_save();
        self.notebook.select(1);
        self.refresh_focus();
    }

    fn open_notebook(&mut self, path: std::path::PathBuf) {
        match Notebook::load(path.clone()) {
            Ok(notebook) => {
                self.notebook = notebook;
                self.shell.layout.last_notebook = Some(path);
                self.refresh_focus();
            }
            Err(err) => {
                tracing::warn!("opening {}: {err}", path.display());
                self.push_notification(format!("open failed: {err}"));
            }
        }
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.refresh_focus();
    }

    /// Rebuild the focus target for the current mode. Edit mode focuses
    /// the active cell's editor element; code cells bring their own
    /// undo/redo handling.
    fn refresh_focus(&mut self) {
        let notebook_el = Element::child(&self.root, vec![]);
        let element = if self.mode == Mode::Edit {
            let mut marks = vec![Mark::CellEditor];
            if self.notebook.active_cell().kind == CellKind::Code {
                marks.push(Mark::CustomUndoer);
            }
            Element::child(&notebook_el, marks)
        } else {
            notebook_el
        };
        self.focus = InputTarget::new(element);
    }

    fn mark_edited(&mut self) {
        self.notebook.dirty = true;
        self.schedule_auto_save();
    }

    fn schedule_auto_save(&mut self) {
        let debounce_ms = self.config.general.auto_save_debounce_ms;
        self.notebook.save_debounce = Some(Instant::now() + Duration::from_millis(debounce_ms));
    }

    fn handle_tick(&mut self) {
        if let Some(due) = self.notebook.save_debounce {
            if Instant::now() >= due && self.notebook.path.is_some() {
                if let Err(err) = self.notebook.save() {
                    tracing::warn!("auto-save: {err}");
                } else if !self.info.files_cached {
                    self.workspace_files = list_workspace_files(&self.config);
                }
            }
        }
    }

    fn push_notification(&mut self, message: String) {
        self.notifications.push_back(message);
        while self.notifications.len() > 8 {
            self.notifications.pop_front();
        }
    }

    // ── MVU: View ────────────────────────────────────────────────

    pub fn view(&mut self, frame: &mut Frame) {
        let areas = self.shell.areas(frame.area());
        if let Some(sidebar) = areas.sidebar {
            self.render_sidebar(frame, sidebar);
        }
        self.render_notebook(frame, areas.notebook);
        self.render_status_bar(frame, areas.status);
    }

    fn render_sidebar(&self, frame: &mut Frame, area: Rect) {
        let mut lines: Vec<Line> = vec![Line::from(Span::styled(
            "workspace",
            Style::default().add_modifier(Modifier::BOLD),
        ))];
        if self.workspace_files.is_empty() {
            lines.push(Line::from(Span::styled(
                "  (no notebooks)",
                Style::default().fg(Color::DarkGray),
            )));
        }
        for file in &self.workspace_files {
            lines.push(Line::from(format!("  {file}")));
        }
        let block = Block::default().borders(Borders::RIGHT);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_notebook(&self, frame: &mut Frame, area: Rect) {
        let mut y = area.y;
        let first = self.notebook.active.saturating_sub(2);
        for (index, cell) in self.notebook.cells.iter().enumerate().skip(first) {
            if y >= area.bottom() {
                break;
            }
            let source = cell.text();
            let mut lines: Vec<Line> = source.lines().map(|l| Line::from(l.to_string())).collect();
            if lines.is_empty() {
                lines.push(Line::from(""));
            }
            for output in &cell.outputs {
                lines.push(Line::from(Span::styled(
                    output.clone(),
                    Style::default().fg(Color::DarkGray),
                )));
            }

            let active = index == self.notebook.active;
            let border_style = if active && self.mode == Mode::Edit {
                Style::default().fg(Color::Green)
            } else if active {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let kind = match cell.kind {
                CellKind::Code => "code",
                CellKind::Markdown => "md",
            };
            let height = (lines.len() as u16 + 2).min(area.bottom() - y);
            let cell_area = Rect::new(area.x, y, area.width, height);
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(format!("[{}] {kind}", index + 1));
            frame.render_widget(Paragraph::new(lines).block(block), cell_area);
            y += height;
        }
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        if self.mode == Mode::Palette {
            let prompt = format!(":{}", self.palette_input);
            frame.render_widget(
                Paragraph::new(prompt).style(Style::default().fg(Color::Yellow)),
                area,
            );
            return;
        }

        let plugins = {
            let registry = self
                .registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            registry.summary_notification()
        };
        let activation = if self.sequencer.all_activated().is_resolved() {
            "ready"
        } else {
            "activating…"
        };
        let kernel = match self.services.standby() {
            Standby::WhenHidden => "kernel: up",
            Standby::Always => "kernel: down",
        };
        let dirty = if self.notebook.dirty { " ●" } else { "" };
        let dev = if self.info.dev_mode { " [dev]" } else { "" };
        let note = self.notifications.back().cloned().unwrap_or_default();

        let line = Line::from(vec![
            Span::styled(
                format!(" {} ", self.mode.label()),
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(" {} v{}{dev}{dirty} ", self.name, self.version)),
            Span::styled(
                format!("| {plugins} | {activation} | {kernel} "),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(note, Style::default().fg(Color::Yellow)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }
}

fn list_workspace_files(config: &AppConfig) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(config.workspace_path())
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|entry| {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "nbx") {
                        path.file_name().map(|n| n.to_string_lossy().into_owned())
                    } else {
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

/// Keys the focused cell editor consumes without letting them reach the
/// application boundary.
fn editor_consumes(key: &KeyEvent) -> bool {
    if !key.modifiers.is_empty() && key.modifiers != KeyModifiers::SHIFT {
        return false;
    }
    matches!(key.code, KeyCode::Left | KeyCode::Right)
        || (key.code == KeyCode::Enter && key.modifiers.is_empty())
}

/// The edit a key would perform in the focused editor, if any.
fn editor_intent(key: &KeyEvent) -> Option<InputType> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('z') => Some(InputType::HistoryUndo),
            KeyCode::Char('y') => Some(InputType::HistoryRedo),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char(_) => Some(InputType::InsertText),
        KeyCode::Enter => Some(InputType::InsertLineBreak),
        KeyCode::Backspace => Some(InputType::DeleteContentBackward),
        _ => None,
    }
}

impl App {
    /// Apply the editor key for a left/right cursor move. Split out so
    /// `apply_editor_key` stays about pending-input intents.
    fn move_cursor(&mut self, code: KeyCode) {
        let cell = self.notebook.active_cell_mut();
        match code {
            KeyCode::Left => cell.cursor = cell.cursor.saturating_sub(1),
            KeyCode::Right => cell.cursor = (cell.cursor + 1).min(cell.source.len_chars()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::ActivationBatch;
    use std::path::Path;

    fn test_config(workspace: &Path) -> AppConfig {
        let raw = format!(
            concat!(
                "[general]\n",
                "workspace_path = {:?}\n",
                "auto_save_debounce_ms = 50\n\n",
                "[plugins]\n",
                "dirs = []\n\n",
                "[input]\n",
                "guard_timeout_ms = 10\n",
            ),
            workspace.display().to_string()
        );
        toml::from_str(&raw).expect("test config parses")
    }

    struct Harness {
        app: App,
        rx: mpsc::Receiver<Msg>,
    }

    fn harness() -> (Harness, tempfile::TempDir) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, rx) = mpsc::channel();
        let app = App::new(test_config(tmp.path()), AppInfoOverlay::default(), tx)
            .expect("app constructs");
        (Harness { app, rx }, tmp)
    }

    impl Harness {
        /// Drain messages like the real event loop until the predicate
        /// holds or the deadline passes.
        fn pump_until(&mut self, deadline: Duration, mut done: impl FnMut(&App) -> bool) {
            let until = Instant::now() + deadline;
            while !done(&self.app) {
                let remaining = until
                    .checked_duration_since(Instant::now())
                    .expect("condition before deadline");
                if let Ok(msg) = self.rx.recv_timeout(remaining) {
                    self.app.update(msg).expect("update");
                }
            }
        }
    }

    #[test]
    fn startup_resolves_the_completion_signal_after_restore() {
        let (mut harness, _tmp) = harness();
        let signal = harness.app.all_plugins_activated();
        assert!(!signal.is_resolved());

        harness.app.start();
        harness.pump_until(Duration::from_secs(2), |app| {
            app.all_plugins_activated().is_resolved()
        });

        assert!(signal.is_resolved());
        assert_eq!(
            harness
                .app
                .sequencer
                .batch_error_count(ActivationBatch::Deferred),
            0
        );
        let registry = harness.app.registry.lock().expect("registry lock");
        assert!(registry.is_active(&PluginId::new("workbench:commands")));
        assert!(registry.is_active(&PluginId::new("workbench:welcome")));
        assert!(registry.is_active(&PluginId::new("workbench:theme")));
    }

    #[test]
    fn fast_path_key_dispatches_without_delay() {
        let (mut harness, _tmp) = harness();
        harness.app.start();
        harness.pump_until(Duration::from_secs(2), |app| {
            app.all_plugins_activated().is_resolved()
        });
        harness.app.update(Msg::InsertCellBelow).expect("insert");
        harness.app.update(Msg::SelectCell(-5)).expect("select");
        assert_eq!(harness.app.notebook.active, 0);

        harness
            .app
            .update(Msg::Key(KeyEvent::new(KeyCode::Down, KeyModifiers::NONE)))
            .expect("key");
        // The binding's message is already queued; no guard wait.
        match harness.rx.try_recv() {
            Ok(Msg::SelectCell(1)) => {}
            other => panic!("expected immediate select, got {other:?}"),
        }
    }

    #[test]
    fn shift_enter_in_a_cell_runs_it_instead_of_inserting() {
        let (mut harness, _tmp) = harness();
        harness.app.start();
        harness.pump_until(Duration::from_secs(2), |app| {
            app.all_plugins_activated().is_resolved()
        });

        harness.app.update(Msg::SetMode(Mode::Edit)).expect("mode");
        for ch in "x = 1".chars() {
            harness
                .app
                .update(Msg::Key(KeyEvent::new(
                    KeyCode::Char(ch),
                    KeyModifiers::NONE,
                )))
                .expect("typing");
        }
        assert_eq!(harness.app.notebook.cells[0].text(), "x = 1");

        harness
            .app
            .update(Msg::Key(KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT)))
            .expect("shift+enter");

        // The line break was cancelled and the cell ran.
        assert_eq!(harness.app.notebook.cells[0].text(), "x = 1");
        assert!(!harness.app.notebook.cells[0].outputs.is_empty());
        // And the suppressed shortcut never fires later.
        std::thread::sleep(Duration::from_millis(60));
        while let Ok(msg) = harness.rx.try_recv() {
            assert!(
                !matches!(msg, Msg::DispatchKey(_)),
                "guard dispatched a suppressed key"
            );
        }
    }

    #[test]
    fn typed_characters_never_trigger_shortcuts() {
        let (mut harness, _tmp) = harness();
        harness.app.start();
        harness.pump_until(Duration::from_secs(2), |app| {
            app.all_plugins_activated().is_resolved()
        });
        harness.app.update(Msg::SetMode(Mode::Edit)).expect("mode");

        // 'd' is bound to delete-cell in command mode; typing it must
        // only insert text.
        harness
            .app
            .update(Msg::Key(KeyEvent::new(
                KeyCode::Char('d'),
                KeyModifiers::NONE,
            )))
            .expect("typing");
        assert_eq!(harness.app.notebook.active_cell().text(), "d");

        std::thread::sleep(Duration::from_millis(60));
        while let Ok(msg) = harness.rx.try_recv() {
            assert!(!matches!(msg, Msg::DispatchKey(_) | Msg::DeleteCell));
        }
    }

    #[test]
    fn unguarded_command_key_arrives_after_the_guard_window() {
        let (mut harness, _tmp) = harness();
        harness.app.start();
        harness.pump_until(Duration::from_secs(2), |app| {
            app.all_plugins_activated().is_resolved()
        });

        // Command mode produces no pending input, so the timeout path
        // wins and the key comes back for dispatch.
        harness
            .app
            .update(Msg::Key(KeyEvent::new(
                KeyCode::Char('b'),
                KeyModifiers::NONE,
            )))
            .expect("key");
        let msg = harness
            .rx
            .recv_timeout(Duration::from_secs(1))
            .expect("deferred dispatch");
        match msg {
            Msg::DispatchKey(key) => assert_eq!(key.code, KeyCode::Char('b')),
            other => panic!("expected DispatchKey, got {other:?}"),
        }
    }
}
