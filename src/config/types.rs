//! Configuration types and structures.

use crate::format::OutputFormat;
use crate::inventory::HashBehaviour;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub exec: ExecConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Project registry file. When unset the registry is located from
    /// `MCP_ANSIBLE_CONFIG` and the standard locations.
    #[serde(default)]
    pub registry_path: Option<PathBuf>,

    /// Default output format for inventory queries (json or markdown).
    #[serde(default)]
    pub default_format: OutputFormat,
}

/// Names (or paths) of the Ansible executables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    #[serde(default = "default_ansible")]
    pub ansible: String,
    #[serde(default = "default_ansible_playbook")]
    pub ansible_playbook: String,
    #[serde(default = "default_ansible_galaxy")]
    pub ansible_galaxy: String,
    #[serde(default = "default_ansible_vault")]
    pub ansible_vault: String,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            ansible: default_ansible(),
            ansible_playbook: default_ansible_playbook(),
            ansible_galaxy: default_ansible_galaxy(),
            ansible_vault: default_ansible_vault(),
        }
    }
}

fn default_ansible() -> String {
    "ansible".to_string()
}

fn default_ansible_playbook() -> String {
    "ansible-playbook".to_string()
}

fn default_ansible_galaxy() -> String {
    "ansible-galaxy".to_string()
}

fn default_ansible_vault() -> String {
    "ansible-vault".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InventoryConfig {
    /// Merge mode used when `ansible.cfg` does not set `hash_behaviour`.
    #[serde(default)]
    pub hash_behaviour: HashBehaviour,

    /// Resolve from the sources that loaded when some fail.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Empty or comment-only files parse as null
        let config: Option<Config> = serde_yaml::from_str(&content)?;
        Ok(config.unwrap_or_default())
    }
}
