//! Locating and reading the effective `ansible.cfg`.
//!
//! Lookup order: explicit path, `ANSIBLE_CONFIG` from the project
//! environment, `<project root>/ansible.cfg`. Finding nothing is not an
//! error; it only means less is discovered automatically.

use super::error::{InventoryError, Result};
use super::source::expand_path;
use super::vars::HashBehaviour;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "ansible.cfg";

/// Settings extracted from `ansible.cfg`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnsibleConfig {
    /// The file the settings came from, if any was found.
    pub path: Option<PathBuf>,
    /// Declared inventory sources, in order.
    pub inventory: Vec<String>,
    pub roles_paths: Vec<PathBuf>,
    pub collections_paths: Vec<PathBuf>,
    /// `hash_behaviour`, when the file sets it.
    pub hash_behaviour: Option<HashBehaviour>,
}

/// Where to look for the config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLookup<'a> {
    pub explicit: Option<&'a Path>,
    pub env: Option<&'a BTreeMap<String, String>>,
    pub project_root: Option<&'a Path>,
}

impl ConfigLookup<'_> {
    /// First existing candidate, in lookup order.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(explicit) = self.explicit {
            if explicit.is_file() {
                return Some(explicit.to_path_buf());
            }
            warn!(path = %explicit.display(), "Explicit ansible.cfg not found, falling back");
        }
        if let Some(from_env) = self.env.and_then(|env| env.get("ANSIBLE_CONFIG")) {
            let path = expand_path(from_env, self.project_root);
            if path.is_file() {
                return Some(path);
            }
        }
        if let Some(root) = self.project_root {
            let path = root.join(CONFIG_FILE_NAME);
            if path.is_file() {
                return Some(path);
            }
        }
        None
    }

    /// Locate and parse the effective configuration.
    pub fn resolve(&self) -> Result<AnsibleConfig> {
        match self.locate() {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| InventoryError::io(path.display().to_string(), e))?;
                let config = parse_config(&text, &path)?;
                debug!(
                    path = %path.display(),
                    inventory = ?config.inventory,
                    "Using ansible.cfg"
                );
                Ok(config)
            }
            None => {
                debug!("No ansible.cfg found; using caller defaults");
                Ok(AnsibleConfig::default())
            }
        }
    }
}

/// Parse `ansible.cfg` text. Relative paths resolve against the file's
/// directory.
pub fn parse_config(text: &str, path: &Path) -> Result<AnsibleConfig> {
    let origin = path.display().to_string();
    let base = path.parent();
    let defaults = read_section(text, "defaults", &origin)?;

    let mut config = AnsibleConfig {
        path: Some(path.to_path_buf()),
        ..Default::default()
    };

    if let Some(inventory) = defaults.get("inventory") {
        config.inventory = inventory
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| expand_path(s, base).display().to_string())
            .collect();
    }
    if let Some(roles) = defaults.get("roles_path") {
        config.roles_paths = split_search_path(roles, base);
    }
    if let Some(collections) = defaults
        .get("collections_path")
        .or_else(|| defaults.get("collections_paths"))
    {
        config.collections_paths = split_search_path(collections, base);
    }
    if let Some(raw) = defaults.get("hash_behaviour") {
        match HashBehaviour::parse(raw) {
            Some(b) => config.hash_behaviour = Some(b),
            None => {
                return Err(InventoryError::parse(
                    origin,
                    None,
                    format!("hash_behaviour must be 'replace' or 'merge', found '{}'", raw),
                ));
            }
        }
    }
    Ok(config)
}

fn split_search_path(raw: &str, base: Option<&Path>) -> Vec<PathBuf> {
    raw.split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| expand_path(s, base))
        .collect()
}

/// Collect `key = value` pairs of one INI section. Keys are lowercased.
fn read_section(text: &str, wanted: &str, origin: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    let mut in_section = false;
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[') {
            let Some(name) = header.strip_suffix(']') else {
                return Err(InventoryError::parse(
                    origin,
                    Some(index + 1),
                    format!("malformed section header: {}", line),
                ));
            };
            in_section = name.trim() == wanted;
            continue;
        }
        // Continuation lines of multi-line values are not used by any key we read.
        if raw.starts_with([' ', '\t']) {
            continue;
        }
        let split = match (line.find('='), line.find(':')) {
            (Some(eq), Some(colon)) => Some(eq.min(colon)),
            (Some(eq), None) => Some(eq),
            (None, Some(colon)) => Some(colon),
            (None, None) => None,
        };
        let Some(at) = split else {
            return Err(InventoryError::parse(
                origin,
                Some(index + 1),
                format!("expected 'key = value', found '{}'", line),
            ));
        };
        if in_section {
            let key = line[..at].trim().to_ascii_lowercase();
            let value = strip_inline_comment(line[at + 1..].trim());
            values.insert(key, value.to_string());
        }
    }
    Ok(values)
}

/// Drop a trailing ` ;comment` or ` #comment`.
fn strip_inline_comment(value: &str) -> &str {
    for marker in [" ;", " #", "\t;", "\t#"] {
        if let Some(at) = value.find(marker) {
            return value[..at].trim_end();
        }
    }
    value
}
