use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use regex::Regex;
use thiserror::Error;

use crate::commands::CommandRegistry;
use crate::model::config::PatternListConfig;
use crate::msg::Msg;
use crate::plugin::manifest::PluginId;

/// Host capabilities handed to plugin activation hooks.
#[derive(Clone)]
pub struct PluginContext {
    pub commands: Arc<Mutex<CommandRegistry>>,
    pub event_tx: mpsc::Sender<Msg>,
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("plugin {0} is already registered")]
    Duplicate(PluginId),
    #[error("no plugin registered with id {0}")]
    Unknown(PluginId),
    #[error("plugin {0} is disabled")]
    Disabled(PluginId),
    #[error("plugin {id} failed to activate: {reason}")]
    Activation { id: PluginId, reason: String },
    #[error("plugin manifest {path}: {reason}")]
    Manifest { path: String, reason: String },
}

type ActivateFn = Box<dyn FnMut(&PluginContext) -> anyhow::Result<()> + Send>;

/// A plugin as registered with the host: identity, startup flags, and an
/// activation hook run at most once.
pub struct Plugin {
    pub id: PluginId,
    pub description: String,
    pub autostart: bool,
    pub deferred: bool,
    activate: ActivateFn,
}

impl Plugin {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: PluginId::new(id),
            description: description.into(),
            autostart: true,
            deferred: false,
            activate: Box::new(|_| Ok(())),
        }
    }

    /// Flag the plugin as not needed for first paint.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn on_activate(
        mut self,
        hook: impl FnMut(&PluginContext) -> anyhow::Result<()> + Send + 'static,
    ) -> Self {
        self.activate = Box::new(hook);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PluginState {
    Registered,
    Active,
    Failed(String),
}

struct Entry {
    plugin: Plugin,
    state: PluginState,
    deferred: bool,
    disabled: bool,
}

pub type ActivationOutcome = (PluginId, Result<(), RegistryError>);

/// The plugin registry: registration with error accumulation, idempotent
/// per-id activation, and batch activation of deferred plugins.
#[derive(Default)]
pub struct PluginRegistry {
    entries: HashMap<PluginId, Entry>,
    order: Vec<PluginId>,
    /// Append-only; read by diagnostics tooling, never fatal.
    pub register_errors: Vec<RegistryError>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Plugin) -> Result<(), RegistryError> {
        if self.entries.contains_key(&plugin.id) {
            return Err(RegistryError::Duplicate(plugin.id));
        }
        let id = plugin.id.clone();
        let deferred = plugin.deferred;
        self.entries.insert(
            id.clone(),
            Entry {
                plugin,
                state: PluginState::Registered,
                deferred,
                disabled: false,
            },
        );
        self.order.push(id);
        Ok(())
    }

    /// Register a batch of plugins (a plugin module), collecting per-item
    /// errors instead of failing the batch.
    pub fn register_module(&mut self, plugins: Vec<Plugin>) {
        for plugin in plugins {
            if let Err(err) = self.register(plugin) {
                tracing::warn!("plugin registration: {err}");
                self.register_errors.push(err);
            }
        }
    }

    pub fn record_error(&mut self, err: RegistryError) {
        tracing::warn!("plugin registry: {err}");
        self.register_errors.push(err);
    }

    /// Resolve the configured deferred/disabled lists against the
    /// registered plugin ids. Explicit matches apply as-is; pattern
    /// matches are appended to each list's `matches`, keeping the two
    /// parallel lists consistent for later consumers.
    pub fn resolve_flags(
        &mut self,
        deferred: &mut PatternListConfig,
        disabled: &mut PatternListConfig,
    ) {
        resolve_list(deferred, &self.order);
        resolve_list(disabled, &self.order);

        for (list, flag) in [(&*deferred, Flag::Deferred), (&*disabled, Flag::Disabled)] {
            for id in &list.matches {
                if let Some(entry) = self.entries.get_mut(&PluginId::new(id.clone())) {
                    match flag {
                        Flag::Deferred => entry.deferred = true,
                        Flag::Disabled => entry.disabled = true,
                    }
                } else {
                    tracing::debug!("configured {} plugin {id} is not registered", flag.label());
                }
            }
        }
    }

    /// Activate a plugin by id. Idempotent: an already-active plugin
    /// returns Ok without re-running its hook, and a previously failed
    /// one returns its recorded failure.
    pub fn activate(&mut self, id: &PluginId, ctx: &PluginContext) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::Unknown(id.clone()))?;
        if entry.disabled {
            return Err(RegistryError::Disabled(id.clone()));
        }
        match &entry.state {
            PluginState::Active => Ok(()),
            PluginState::Failed(reason) => Err(RegistryError::Activation {
                id: id.clone(),
                reason: reason.clone(),
            }),
            PluginState::Registered => match (entry.plugin.activate)(ctx) {
                Ok(()) => {
                    entry.state = PluginState::Active;
                    tracing::debug!("activated plugin {id}");
                    Ok(())
                }
                Err(err) => {
                    let reason = err.to_string();
                    entry.state = PluginState::Failed(reason.clone());
                    Err(RegistryError::Activation {
                        id: id.clone(),
                        reason,
                    })
                }
            },
        }
    }

    /// Activate every deferred, non-disabled plugin as one batch,
    /// returning per-plugin outcomes. Individual failures never stop
    /// the batch.
    pub fn activate_deferred(&mut self, ctx: &PluginContext) -> Vec<ActivationOutcome> {
        let ids: Vec<PluginId> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .is_some_and(|e| e.deferred && !e.disabled)
            })
            .cloned()
            .collect();
        ids.into_iter()
            .map(|id| {
                let result = self.activate(&id, ctx);
                (id, result)
            })
            .collect()
    }

    /// Activate autostart plugins needed for first paint (not deferred,
    /// not disabled).
    pub fn activate_startup(&mut self, ctx: &PluginContext) -> Vec<ActivationOutcome> {
        let ids: Vec<PluginId> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .is_some_and(|e| e.plugin.autostart && !e.deferred && !e.disabled)
            })
            .cloned()
            .collect();
        ids.into_iter()
            .map(|id| {
                let result = self.activate(&id, ctx);
                (id, result)
            })
            .collect()
    }

    pub fn is_active(&self, id: &PluginId) -> bool {
        self.entries
            .get(id)
            .is_some_and(|e| e.state == PluginState::Active)
    }

    pub fn plugin_count(&self) -> usize {
        self.entries.len()
    }

    pub fn active_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.state == PluginState::Active)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.register_errors.len()
            + self
                .entries
                .values()
                .filter(|e| matches!(e.state, PluginState::Failed(_)))
                .count()
    }

    pub fn summary_notification(&self) -> String {
        format!(
            "plugins: {} registered, {} active, {} errors",
            self.plugin_count(),
            self.active_count(),
            self.error_count()
        )
    }

    pub fn error_notifications(&self) -> Vec<String> {
        let mut notices: Vec<String> = self
            .register_errors
            .iter()
            .map(|err| format!("registry: {err}"))
            .collect();
        notices.extend(self.entries.values().filter_map(|entry| {
            if let PluginState::Failed(reason) = &entry.state {
                Some(format!("plugin {}: {reason}", entry.plugin.id))
            } else {
                None
            }
        }));
        notices.sort();
        notices
    }

    pub fn list_notifications(&self) -> Vec<String> {
        if self.entries.is_empty() {
            return vec!["plugins: none registered".to_string()];
        }
        let mut rows: Vec<String> = self
            .entries
            .values()
            .map(|entry| {
                let status = match &entry.state {
                    PluginState::Registered if entry.disabled => "disabled".to_string(),
                    PluginState::Registered if entry.deferred => "deferred".to_string(),
                    PluginState::Registered => "registered".to_string(),
                    PluginState::Active => "active".to_string(),
                    PluginState::Failed(reason) => format!("error: {reason}"),
                };
                format!("plugin {} [{status}] {}", entry.plugin.id, entry.plugin.description)
            })
            .collect();
        rows.sort();
        rows
    }
}

#[derive(Clone, Copy)]
enum Flag {
    Deferred,
    Disabled,
}

impl Flag {
    fn label(self) -> &'static str {
        match self {
            Flag::Deferred => "deferred",
            Flag::Disabled => "disabled",
        }
    }
}

/// Append ids matched by the declarative patterns to the resolved list,
/// skipping (with a warning) patterns that fail to compile.
fn resolve_list(list: &mut PatternListConfig, ids: &[PluginId]) {
    for pattern in &list.patterns {
        let regex = match Regex::new(pattern) {
            Ok(regex) => regex,
            Err(err) => {
                tracing::warn!("invalid plugin pattern {pattern:?}: {err}");
                continue;
            }
        };
        for id in ids {
            if regex.is_match(id.as_str()) && !list.matches.iter().any(|m| m == id.as_str()) {
                list.matches.push(id.as_str().to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_ctx() -> (PluginContext, mpsc::Receiver<Msg>) {
        let (tx, rx) = mpsc::channel();
        (
            PluginContext {
                commands: Arc::new(Mutex::new(CommandRegistry::new())),
                event_tx: tx,
            },
            rx,
        )
    }

    fn counting_plugin(id: &str, count: &Arc<AtomicUsize>) -> Plugin {
        let hits = Arc::clone(count);
        Plugin::new(id, "test plugin").on_activate(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn duplicate_registration_goes_to_the_error_list() {
        let mut registry = PluginRegistry::new();
        registry.register_module(vec![
            Plugin::new("a", "first"),
            Plugin::new("a", "second"),
            Plugin::new("b", "third"),
        ]);
        assert_eq!(registry.plugin_count(), 2);
        assert_eq!(registry.register_errors.len(), 1);
        assert!(matches!(
            registry.register_errors[0],
            RegistryError::Duplicate(_)
        ));
    }

    #[test]
    fn activation_is_idempotent_per_id() {
        let (ctx, _rx) = test_ctx();
        let mut registry = PluginRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry
            .register(counting_plugin("a", &count))
            .expect("fresh id");

        let id = PluginId::new("a");
        registry.activate(&id, &ctx).expect("first activation");
        registry.activate(&id, &ctx).expect("idempotent activation");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_active(&id));
    }

    #[test]
    fn failed_activation_is_recorded_and_not_retried() {
        let (ctx, _rx) = test_ctx();
        let mut registry = PluginRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        registry
            .register(Plugin::new("broken", "always fails").on_activate(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("boom"))
            }))
            .expect("fresh id");

        let id = PluginId::new("broken");
        assert!(matches!(
            registry.activate(&id, &ctx),
            Err(RegistryError::Activation { .. })
        ));
        assert!(matches!(
            registry.activate(&id, &ctx),
            Err(RegistryError::Activation { .. })
        ));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(registry.error_count(), 1);
    }

    #[test]
    fn unknown_and_disabled_plugins_do_not_activate() {
        let (ctx, _rx) = test_ctx();
        let mut registry = PluginRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry
            .register(counting_plugin("off", &count))
            .expect("fresh id");

        let mut deferred = PatternListConfig::default();
        let mut disabled = PatternListConfig {
            patterns: vec![],
            matches: vec!["off".to_string()],
        };
        registry.resolve_flags(&mut deferred, &mut disabled);

        assert!(matches!(
            registry.activate(&PluginId::new("off"), &ctx),
            Err(RegistryError::Disabled(_))
        ));
        assert!(matches!(
            registry.activate(&PluginId::new("ghost"), &ctx),
            Err(RegistryError::Unknown(_))
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn deferred_batch_reports_per_plugin_outcomes() {
        let (ctx, _rx) = test_ctx();
        let mut registry = PluginRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.register_module(vec![
            counting_plugin("ok", &count).deferred(),
            Plugin::new("broken", "fails")
                .deferred()
                .on_activate(|_| Err(anyhow::anyhow!("boom"))),
            counting_plugin("eager", &count),
        ]);

        let outcomes = registry.activate_deferred(&ctx);
        assert_eq!(outcomes.len(), 2);
        let failures = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        assert_eq!(failures, 1);
        assert!(registry.is_active(&PluginId::new("ok")));
        assert!(!registry.is_active(&PluginId::new("eager")));
    }

    #[test]
    fn patterns_resolve_into_the_matches_list() {
        let mut registry = PluginRegistry::new();
        registry.register_module(vec![
            Plugin::new("viz:plot", "plots"),
            Plugin::new("viz:table", "tables"),
            Plugin::new("core:shell", "shell"),
        ]);

        let mut deferred = PatternListConfig {
            patterns: vec!["^viz:".to_string(), "(bad".to_string()],
            matches: vec![],
        };
        let mut disabled = PatternListConfig::default();
        registry.resolve_flags(&mut deferred, &mut disabled);

        assert_eq!(deferred.matches.len(), 2);
        assert!(deferred.matches.contains(&"viz:plot".to_string()));
        assert!(deferred.matches.contains(&"viz:table".to_string()));
    }
}
