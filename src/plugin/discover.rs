use std::fs;
use std::path::{Path, PathBuf};

use crate::msg::Msg;
use crate::plugin::manifest::PluginManifest;
use crate::plugin::registry::{Plugin, RegistryError};

/// Scan the configured plugin directories for `plugin.toml` manifests
/// and turn each into a registrable plugin. Manifest problems are
/// returned as registry errors for the diagnostics list, never fatal.
pub fn discover_plugins(dirs: &[PathBuf]) -> (Vec<Plugin>, Vec<RegistryError>) {
    let mut plugins = Vec::new();
    let mut errors = Vec::new();

    for dir in dirs {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!("plugin dir {} not readable: {err}", dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let root = entry.path();
            if !root.is_dir() {
                continue;
            }
            match read_manifest(&root) {
                Ok(manifest) => plugins.push(plugin_from_manifest(manifest)),
                Err(err) => errors.push(err),
            }
        }
    }

    (plugins, errors)
}

fn read_manifest(root: &Path) -> Result<PluginManifest, RegistryError> {
    let manifest_path = root.join("plugin.toml");
    let raw = fs::read_to_string(&manifest_path).map_err(|err| RegistryError::Manifest {
        path: manifest_path.display().to_string(),
        reason: err.to_string(),
    })?;
    toml::from_str::<PluginManifest>(&raw).map_err(|err| RegistryError::Manifest {
        path: manifest_path.display().to_string(),
        reason: err.to_string(),
    })
}

/// A discovered plugin's activation registers its manifest commands in
/// the palette; running one only reports back for now.
fn plugin_from_manifest(manifest: PluginManifest) -> Plugin {
    let id = manifest.name.clone();
    let description = manifest
        .description
        .clone()
        .unwrap_or_else(|| format!("{} {}", manifest.name, manifest.version));
    let deferred = manifest.deferred;

    let mut plugin = Plugin::new(id, description).on_activate(move |ctx| {
        let mut commands = ctx
            .commands
            .lock()
            .map_err(|_| anyhow::anyhow!("command registry lock poisoned"))?;
        for command in &manifest.commands {
            let name = command.name.clone();
            let label = command
                .description
                .clone()
                .unwrap_or_else(|| command.name.clone());
            let plugin_name = manifest.name.clone();
            let reply = ctx.event_tx.clone();
            let command_name = name.clone();
            if let Err(err) = commands.add_command(name, label, move || {
                let _ = reply.send(Msg::Notify(format!(
                    "plugin {plugin_name} handled {command_name}"
                )));
            }) {
                tracing::warn!("plugin {}: {err}", manifest.name);
            }
        }
        Ok(())
    });
    if deferred {
        plugin = plugin.deferred();
    }
    plugin
}
