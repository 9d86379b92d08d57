use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command {0} is already registered")]
    Duplicate(String),
    #[error("no command registered with id {0}")]
    Unknown(String),
}

type Handler = Box<dyn FnMut() + Send>;

struct Command {
    label: String,
    handler: Handler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct KeyChord {
    code: KeyCode,
    modifiers: KeyModifiers,
}

/// The command processor: an id → handler table plus key bindings.
/// Handlers communicate by sending messages back into the event loop,
/// so running one never needs access to application state.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    bindings: HashMap<KeyChord, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl FnMut() + Send + 'static,
    ) -> Result<(), CommandError> {
        let id = id.into();
        if self.commands.contains_key(&id) {
            return Err(CommandError::Duplicate(id));
        }
        self.commands.insert(
            id,
            Command {
                label: label.into(),
                handler: Box::new(handler),
            },
        );
        Ok(())
    }

    pub fn bind_key(&mut self, code: KeyCode, modifiers: KeyModifiers, command: impl Into<String>) {
        self.bindings
            .insert(KeyChord { code, modifiers }, command.into());
    }

    pub fn run(&mut self, id: &str) -> Result<(), CommandError> {
        let command = self
            .commands
            .get_mut(id)
            .ok_or_else(|| CommandError::Unknown(id.to_string()))?;
        (command.handler)();
        Ok(())
    }

    /// Dispatch a keydown to its bound command. Returns whether a
    /// binding matched. Handler errors never propagate to the caller.
    pub fn process_keydown(&mut self, key: &KeyEvent) -> bool {
        let chord = KeyChord {
            code: key.code,
            modifiers: key.modifiers,
        };
        let Some(id) = self.bindings.get(&chord).cloned() else {
            return false;
        };
        if let Err(err) = self.run(&id) {
            tracing::warn!("keybinding for {id}: {err}");
            return false;
        }
        true
    }

    pub fn label(&self, id: &str) -> Option<&str> {
        self.commands.get(id).map(|c| c.label.as_str())
    }

    /// Sorted command ids, for the palette.
    pub fn command_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.commands.keys().cloned().collect();
        ids.sort();
        ids
    }
}
