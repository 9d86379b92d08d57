use std::sync::mpsc;

use crossterm::event::{KeyCode, KeyModifiers};

use crate::model::mode::Mode;
use crate::msg::Msg;
use crate::plugin::registry::Plugin;

/// The plugins shipped with the host. The command set needed before
/// first paint comes from `workbench:commands`; the rest is deferred.
pub fn core_plugins(event_tx: &mpsc::Sender<Msg>) -> Vec<Plugin> {
    vec![
        commands_plugin(event_tx.clone()),
        Plugin::new("workbench:theme", "Applies the saved color theme")
            .deferred()
            .on_activate(|_| {
                tracing::debug!("theme plugin activated");
                Ok(())
            }),
        welcome_plugin(event_tx.clone()),
    ]
}

fn commands_plugin(event_tx: mpsc::Sender<Msg>) -> Plugin {
    Plugin::new("workbench:commands", "Core commands and keybindings").on_activate(move |ctx| {
        let mut commands = ctx
            .commands
            .lock()
            .map_err(|_| anyhow::anyhow!("command registry lock poisoned"))?;

        let defs: [(&str, &str, fn() -> Msg); 11] = [
            ("notebook:run-cell", "Run the active cell", || Msg::RunCell),
            ("notebook:edit-mode", "Edit the active cell", || {
                Msg::SetMode(Mode::Edit)
            }),
            ("notebook:command-mode", "Back to command mode", || {
                Msg::SetMode(Mode::Command)
            }),
            ("notebook:select-next", "Select next cell", || {
                Msg::SelectCell(1)
            }),
            ("notebook:select-prev", "Select previous cell", || {
                Msg::SelectCell(-1)
            }),
            ("notebook:insert-below", "Insert cell below", || {
                Msg::InsertCellBelow
            }),
            ("notebook:delete-cell", "Delete the active cell", || {
                Msg::DeleteCell
            }),
            ("notebook:undo-cell", "Undo in the active cell", || {
                Msg::UndoCell
            }),
            ("notebook:redo-cell", "Redo in the active cell", || {
                Msg::RedoCell
            }),
            ("notebook:save", "Save the notebook", || Msg::SaveNotebook),
            ("app:quit", "Quit notelab", || Msg::Quit),
        ];
        for (id, label, msg) in defs {
            let tx = event_tx.clone();
            commands.add_command(id, label, move || {
                let _ = tx.send(msg());
            })?;
        }
        {
            let tx = event_tx.clone();
            commands.add_command("app:palette", "Open the command palette", move || {
                let _ = tx.send(Msg::SetMode(Mode::Palette));
            })?;
        }

        commands.bind_key(KeyCode::Enter, KeyModifiers::SHIFT, "notebook:run-cell");
        commands.bind_key(KeyCode::Enter, KeyModifiers::NONE, "notebook:edit-mode");
        commands.bind_key(KeyCode::Esc, KeyModifiers::NONE, "notebook:command-mode");
        commands.bind_key(KeyCode::Down, KeyModifiers::NONE, "notebook:select-next");
        commands.bind_key(KeyCode::Char('j'), KeyModifiers::NONE, "notebook:select-next");
        commands.bind_key(KeyCode::Up, KeyModifiers::NONE, "notebook:select-prev");
        commands.bind_key(KeyCode::Char('k'), KeyModifiers::NONE, "notebook:select-prev");
        commands.bind_key(KeyCode::Char('b'), KeyModifiers::NONE, "notebook:insert-below");
        commands.bind_key(KeyCode::Char('d'), KeyModifiers::NONE, "notebook:delete-cell");
        commands.bind_key(KeyCode::Char('s'), KeyModifiers::CONTROL, "notebook:save");
        commands.bind_key(KeyCode::Char('q'), KeyModifiers::CONTROL, "app:quit");
        commands.bind_key(KeyCode::Char(':'), KeyModifiers::NONE, "app:palette");
        Ok(())
    })
}

fn welcome_plugin(event_tx: mpsc::Sender<Msg>) -> Plugin {
    Plugin::new("workbench:welcome", "Greets once everything is up")
        .deferred()
        .on_activate(move |ctx| {
            let mut commands = ctx
                .commands
                .lock()
                .map_err(|_| anyhow::anyhow!("command registry lock poisoned"))?;
            let tx = event_tx.clone();
            commands.add_command("workbench:show-welcome", "Show the welcome note", move || {
                let _ = tx.send(Msg::Notify(
                    "notelab ready — press : for the palette".to_string(),
                ));
            })?;
            Ok(())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::plugin::registry::{PluginContext, PluginRegistry};
    use std::sync::{Arc, Mutex};

    #[test]
    fn startup_activation_installs_core_bindings() {
        let (tx, _rx) = mpsc::channel();
        let mut registry = PluginRegistry::new();
        registry.register_module(core_plugins(&tx));

        let commands = Arc::new(Mutex::new(CommandRegistry::new()));
        let ctx = PluginContext {
            commands: Arc::clone(&commands),
            event_tx: tx,
        };
        let outcomes = registry.activate_startup(&ctx);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));

        let mut commands = commands.lock().expect("registry lock");
        let run = crossterm::event::KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT);
        assert!(commands.process_keydown(&run));
        // Deferred plugins have not run yet.
        assert!(commands.label("workbench:show-welcome").is_none());
    }

    #[test]
    fn deferred_activation_adds_the_welcome_command() {
        let (tx, rx) = mpsc::channel();
        let mut registry = PluginRegistry::new();
        registry.register_module(core_plugins(&tx));

        let commands = Arc::new(Mutex::new(CommandRegistry::new()));
        let ctx = PluginContext {
            commands: Arc::clone(&commands),
            event_tx: tx,
        };
        registry.activate_startup(&ctx);
        let outcomes = registry.activate_deferred(&ctx);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));

        let mut commands = commands.lock().expect("registry lock");
        commands
            .run("workbench:show-welcome")
            .expect("welcome command registered");
        drop(commands);
        assert!(matches!(
            rx.recv_timeout(std::time::Duration::from_secs(1)),
            Ok(Msg::Notify(_))
        ));
    }
}
