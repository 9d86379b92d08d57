use serde::Deserialize;
use std::fmt;

/// Opaque plugin identifier; uniqueness is enforced by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk plugin manifest (`plugin.toml` in the plugin's directory).
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Not needed for first paint; activated after layout restore.
    #[serde(default)]
    pub deferred: bool,
    #[serde(default)]
    pub commands: Vec<CommandDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_with_defaults() {
        let manifest: PluginManifest = toml::from_str(
            r#"
            name = "word-count"
            version = "0.1.0"

            [[commands]]
            name = "word-count:run"
            "#,
        )
        .expect("manifest parses");

        assert_eq!(manifest.name, "word-count");
        assert!(!manifest.deferred);
        assert_eq!(manifest.commands.len(), 1);
        assert!(manifest.commands[0].description.is_none());
    }
}
