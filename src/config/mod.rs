//! Server configuration.
//!
//! Tiers, lowest to highest, merged field by field:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `./ansible-mcp/config.yaml`
//! 3. **User** - `~/.ansible-mcp/config.yaml`
//! 4. **Environment** - `ANSIBLE_MCP_*` overrides
//!
//! ## Environment Variables
//! - `ANSIBLE_MCP_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `ANSIBLE_MCP_PROJECT_DIR` - Project config dir (default: `./ansible-mcp`)
//! - `ANSIBLE_MCP_USER_DIR` - User config dir (default: `~/.ansible-mcp`)
//! - `ANSIBLE_MCP_REGISTRY_PATH` - Project registry file
//! - `ANSIBLE_MCP_FORMAT` - Default output format
//! - `ANSIBLE_MCP_HASH_BEHAVIOUR` - Default variable merge mode
//! - `ANSIBLE_MCP_ANSIBLE`, `ANSIBLE_MCP_ANSIBLE_PLAYBOOK`,
//!   `ANSIBLE_MCP_ANSIBLE_GALAXY`, `ANSIBLE_MCP_ANSIBLE_VAULT` - Executables
//!
//! The `MCP_ANSIBLE_*` variables describing the environment-declared project
//! are captured separately in [`Environment`].

mod loader;
mod merge;
mod types;

pub use loader::{CONFIG_FILE_NAME, ConfigLoader, ConfigPaths, ConfigTier, apply_env_overrides};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;

use crate::projects::ProjectDefinition;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Process environment captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// `MCP_ANSIBLE_CONFIG`: explicit registry file.
    pub registry_path: Option<PathBuf>,
    /// Project declared through `MCP_ANSIBLE_PROJECT_ROOT` and friends.
    pub project: Option<ProjectDefinition>,
}

impl Environment {
    pub fn capture() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.starts_with("MCP_ANSIBLE_"))
            .collect();
        Self {
            registry_path: vars
                .get("MCP_ANSIBLE_CONFIG")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            project: ProjectDefinition::from_env_vars(vars),
        }
    }
}
