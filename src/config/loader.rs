//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use crate::format::OutputFormat;
use crate::inventory::HashBehaviour;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Embedded defaults (lowest priority)
    Defaults = 0,
    /// Project-level config (`./ansible-mcp/`)
    Project = 1,
    /// User-level config (`~/.ansible-mcp/`)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl ConfigPaths {
    /// `ANSIBLE_MCP_PROJECT_DIR` or `./ansible-mcp`, and
    /// `ANSIBLE_MCP_USER_DIR` or `~/.ansible-mcp`.
    pub fn discover() -> Self {
        let project_dir = std::env::var("ANSIBLE_MCP_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("ansible-mcp")));
        let user_dir = std::env::var("ANSIBLE_MCP_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".ansible-mcp")));
        Self {
            project_dir,
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    fn tier_files(&self) -> Vec<(ConfigTier, PathBuf)> {
        [
            (ConfigTier::Project, self.project_dir.as_ref()),
            (ConfigTier::User, self.user_dir.as_ref()),
        ]
        .into_iter()
        .filter_map(|(tier, dir)| dir.map(|d| (tier, d.join(CONFIG_FILE_NAME))))
        .collect()
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Files that contributed, lowest tier first.
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load configuration from all tiers with proper merging.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit paths. `ANSIBLE_MCP_CONFIG_PATH`
    /// (set by `--config`) names a single file that replaces the file tiers.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let explicit = std::env::var("ANSIBLE_MCP_CONFIG_PATH").ok().map(PathBuf::from);
        Self::load_from(paths, explicit.as_deref())
    }

    pub fn load_from(paths: ConfigPaths, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let mut config = Config::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?;
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
            return Ok(Self {
                paths,
                config,
                sources: vec![(ConfigTier::User, path.to_path_buf())],
            });
        }

        let mut layers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut sources = Vec::new();
        for (tier, file) in paths.tier_files() {
            if !file.exists() {
                continue;
            }
            match read_layer(&file) {
                Ok(Some(layer)) => {
                    debug!(tier = %tier, path = %file.display(), "Loaded config layer");
                    layers.push(layer);
                    sources.push((tier, file));
                }
                Ok(None) => {}
                Err(e) => warn!(tier = %tier, path = %file.display(), "Ignoring config layer: {}", e),
            }
        }

        let mut config: Config = serde_json::from_value(deep_merge_all(layers))?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }
}

fn read_layer(path: &Path) -> Result<Option<Value>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    Ok((!value.is_null()).then_some(value))
}

/// Environment tier. Unparseable values are ignored with a warning.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(path) = var("ANSIBLE_MCP_REGISTRY_PATH") {
        config.server.registry_path = Some(PathBuf::from(path));
    }
    if let Some(raw) = var("ANSIBLE_MCP_FORMAT") {
        match OutputFormat::from_str(&raw) {
            Some(format) => config.server.default_format = format,
            None => warn!("Ignoring ANSIBLE_MCP_FORMAT={}", raw),
        }
    }
    if let Some(raw) = var("ANSIBLE_MCP_HASH_BEHAVIOUR") {
        match HashBehaviour::parse(&raw) {
            Some(mode) => config.inventory.hash_behaviour = mode,
            None => warn!("Ignoring ANSIBLE_MCP_HASH_BEHAVIOUR={}", raw),
        }
    }
    for (key, slot) in [
        ("ANSIBLE_MCP_ANSIBLE", &mut config.exec.ansible),
        ("ANSIBLE_MCP_ANSIBLE_PLAYBOOK", &mut config.exec.ansible_playbook),
        ("ANSIBLE_MCP_ANSIBLE_GALAXY", &mut config.exec.ansible_galaxy),
        ("ANSIBLE_MCP_ANSIBLE_VAULT", &mut config.exec.ansible_vault),
    ] {
        if let Some(value) = var(key).filter(|v| !v.is_empty()) {
            *slot = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_files() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );
        let loader = ConfigLoader::load_from(paths, None).unwrap();
        assert_eq!(loader.config().exec.ansible_playbook, "ansible-playbook");
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn user_tier_overrides_project_field_by_field() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("ansible-mcp");
        let user_dir = temp.path().join("user");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(
            project_dir.join(CONFIG_FILE_NAME),
            "exec:\n  ansible: /p/ansible\n  ansible_vault: /p/vault\n",
        )
        .unwrap();
        std::fs::write(user_dir.join(CONFIG_FILE_NAME), "exec:\n  ansible: /u/ansible\n").unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(user_dir));
        let loader = ConfigLoader::load_from(paths, None).unwrap();
        let config = loader.config();

        assert_eq!(config.exec.ansible, "/u/ansible");
        assert_eq!(config.exec.ansible_vault, "/p/vault");
        assert_eq!(config.exec.ansible_galaxy, "ansible-galaxy");
        assert_eq!(loader.sources().len(), 2);
    }

    #[test]
    fn explicit_file_replaces_tiers() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("ansible-mcp");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join(CONFIG_FILE_NAME), "exec:\n  ansible: /p/ansible\n").unwrap();
        let explicit = temp.path().join("explicit.yaml");
        std::fs::write(&explicit, "inventory:\n  continue_on_error: true\n").unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), None);
        let loader = ConfigLoader::load_from(paths, Some(&explicit)).unwrap();
        assert_eq!(loader.config().exec.ansible, "ansible");
        assert!(loader.config().inventory.continue_on_error);
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ANSIBLE_MCP_FORMAT", "markdown"),
            ("ANSIBLE_MCP_HASH_BEHAVIOUR", "bogus"),
            ("ANSIBLE_MCP_ANSIBLE_GALAXY", "/opt/bin/ansible-galaxy"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.server.default_format, OutputFormat::Markdown);
        assert_eq!(config.inventory.hash_behaviour, HashBehaviour::Replace);
        assert_eq!(config.exec.ansible_galaxy, "/opt/bin/ansible-galaxy");
    }
}
