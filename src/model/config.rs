use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub plugins: PluginsConfig,
    pub input: InputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub workspace_path: String,
    pub auto_save_debounce_ms: u64,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub cache_files: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Directories scanned for plugin manifests.
    #[serde(default)]
    pub dirs: Vec<String>,
    #[serde(default)]
    pub deferred: PatternListConfig,
    #[serde(default)]
    pub disabled: PatternListConfig,
}

/// Two parallel lists: declarative match patterns, and the plugin ids
/// they resolved to. Produced by configuration, consumed once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternListConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Guard window before a shortcut fires, in milliseconds.
    #[serde(default = "default_guard_timeout_ms")]
    pub guard_timeout_ms: u64,
}

fn default_guard_timeout_ms() -> u64 {
    crate::input::INPUT_GUARD_TIMEOUT.as_millis() as u64
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut config: AppConfig = toml::from_str(defaults)?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "notelab") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                let user_str = fs::read_to_string(&config_path)?;
                config = toml::from_str(&user_str)?;
            }
        }

        // Expand ~ in workspace_path
        if config.general.workspace_path.starts_with('~') {
            let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
            config.general.workspace_path = config
                .general
                .workspace_path
                .replacen('~', &home.to_string_lossy(), 1);
        }

        Ok(config)
    }

    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(&self.general.workspace_path)
    }

    pub fn layout_path(&self) -> PathBuf {
        self.workspace_path().join(".notelab-layout.json")
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// A key/value configuration lookup, injected instead of being read from
/// ambient state so the startup path stays testable.
pub trait ConfigSource {
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for AppConfig {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            "app_name" => Some("notelab".to_string()),
            "dev_mode" => Some(self.general.dev_mode.to_string()),
            "cache_files" => Some(self.general.cache_files.to_string()),
            _ => None,
        }
    }
}

/// The application info dictionary: documented defaults, overridden only
/// by explicitly provided fields.
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub dev_mode: bool,
    pub deferred: PatternListConfig,
    pub disabled: PatternListConfig,
    pub files_cached: bool,
    pub is_connected: bool,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            dev_mode: false,
            deferred: PatternListConfig::default(),
            disabled: PatternListConfig::default(),
            files_cached: false,
            is_connected: true,
        }
    }
}

impl AppInfo {
    /// Build info from a configuration source, starting from the defaults.
    pub fn from_source(source: &dyn ConfigSource, config: &AppConfig) -> Self {
        let defaults = Self::default();
        Self {
            dev_mode: bool_option(source, "dev_mode").unwrap_or(defaults.dev_mode),
            deferred: config.plugins.deferred.clone(),
            disabled: config.plugins.disabled.clone(),
            files_cached: bool_option(source, "cache_files").unwrap_or(defaults.files_cached),
            is_connected: defaults.is_connected,
        }
    }
}

fn bool_option(source: &dyn ConfigSource, key: &str) -> Option<bool> {
    source.get(key).map(|v| v.to_lowercase() == "true")
}

/// Partial overlay for [`AppInfo`]: only fields explicitly provided
/// replace the base values; nothing else can leak in.
#[derive(Debug, Clone, Default)]
pub struct AppInfoOverlay {
    pub dev_mode: Option<bool>,
    pub deferred: Option<PatternListConfig>,
    pub disabled: Option<PatternListConfig>,
    pub files_cached: Option<bool>,
}

impl AppInfoOverlay {
    pub fn apply(self, base: AppInfo) -> AppInfo {
        AppInfo {
            dev_mode: self.dev_mode.unwrap_or(base.dev_mode),
            deferred: self.deferred.unwrap_or(base.deferred),
            disabled: self.disabled.unwrap_or(base.disabled),
            files_cached: self.files_cached.unwrap_or(base.files_cached),
            is_connected: base.is_connected,
        }
    }
}
