//! Named Ansible projects: the registry file, project selection, and
//! playbook discovery.
//!
//! The registry is a JSON document:
//!
//! ```json
//! { "projects": { "site": { "name": "site", "root": "/srv/site", ... } },
//!   "defaults": { "project": "site" } }
//! ```

use crate::error::{ToolError, ToolResult};
use crate::inventory::source::expand_path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Registry file looked for in the working directory.
pub const LOCAL_REGISTRY_FILE: &str = "mcp_ansible.config.json";
/// Name given to the project declared through the environment when no name
/// is set.
pub const DEFAULT_ENV_PROJECT_NAME: &str = "env";

const ENV_PREFIX: &str = "MCP_ANSIBLE_ENV_";

#[cfg(windows)]
const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: &str = ":";

/// Directories never searched for playbooks.
const SKIPPED_DIRS: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    "__pycache__",
    "collections",
    "inventory",
    "roles",
    "node_modules",
];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read project registry {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed project registry {path}: {source}")]
    Malformed {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to write project registry {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

impl From<RegistryError> for ToolError {
    fn from(err: RegistryError) -> Self {
        ToolError::registry(err)
    }
}

/// A registered project. Paths are stored absolute.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde(default)]
    pub roles_paths: Option<Vec<String>>,
    #[serde(default)]
    pub collections_paths: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
}

impl ProjectDefinition {
    pub fn root_path(&self) -> PathBuf {
        PathBuf::from(&self.root)
    }

    /// Variables exported to every command run for this project.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(paths) = self.roles_paths.as_ref().filter(|p| !p.is_empty()) {
            env.insert("ANSIBLE_ROLES_PATH".to_string(), paths.join(PATH_LIST_SEPARATOR));
        }
        if let Some(paths) = self.collections_paths.as_ref().filter(|p| !p.is_empty()) {
            env.insert(
                "ANSIBLE_COLLECTIONS_PATHS".to_string(),
                paths.join(PATH_LIST_SEPARATOR),
            );
        }
        if let Some(extra) = &self.env {
            env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env
    }

    /// Build the project declared through `MCP_ANSIBLE_*` variables, if
    /// `MCP_ANSIBLE_PROJECT_ROOT` is among them.
    pub fn from_env_vars(vars: impl IntoIterator<Item = (String, String)>) -> Option<Self> {
        let vars: BTreeMap<String, String> = vars.into_iter().collect();
        let root = vars.get("MCP_ANSIBLE_PROJECT_ROOT").filter(|r| !r.is_empty())?;
        let env: BTreeMap<String, String> = vars
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(ENV_PREFIX)
                    .filter(|stripped| !stripped.is_empty())
                    .map(|stripped| (stripped.to_string(), v.clone()))
            })
            .collect();
        Some(Self {
            name: vars
                .get("MCP_ANSIBLE_PROJECT_NAME")
                .cloned()
                .unwrap_or_else(|| DEFAULT_ENV_PROJECT_NAME.to_string()),
            root: absolute_path(root),
            inventory: vars
                .get("MCP_ANSIBLE_INVENTORY")
                .filter(|i| !i.is_empty())
                .map(|i| absolute_path(i)),
            roles_paths: split_path_list(vars.get("MCP_ANSIBLE_ROLES_PATH")),
            collections_paths: split_path_list(vars.get("MCP_ANSIBLE_COLLECTIONS_PATHS")),
            env: (!env.is_empty()).then_some(env),
        })
    }
}

fn split_path_list(raw: Option<&String>) -> Option<Vec<String>> {
    let paths: Vec<String> = raw?
        .split(PATH_LIST_SEPARATOR)
        .filter(|p| !p.is_empty())
        .map(absolute_path)
        .collect();
    (!paths.is_empty()).then_some(paths)
}

/// `~`-expanded, absolute, and canonical when the path exists.
pub fn absolute_path(raw: &str) -> String {
    let cwd = std::env::current_dir().ok();
    let path = expand_path(raw, cwd.as_deref());
    std::fs::canonicalize(&path)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Keys this server does not interpret, kept as written.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryFile {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectDefinition>,
    #[serde(default)]
    pub defaults: RegistryDefaults,
}

impl RegistryFile {
    pub fn default_project(&self) -> Option<&ProjectDefinition> {
        self.defaults
            .project
            .as_ref()
            .and_then(|name| self.projects.get(name))
    }
}

/// Handle on the registry file. Every operation reads the file afresh.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    path: PathBuf,
}

impl ProjectRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Registry location: `explicit` (from `MCP_ANSIBLE_CONFIG`), else
    /// `./mcp_ansible.config.json` when present, else
    /// `~/.config/mcp-ansible/config.json`.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return PathBuf::from(absolute_path(&path.display().to_string()));
        }
        let local = PathBuf::from(LOCAL_REGISTRY_FILE);
        if local.is_file() {
            return std::env::current_dir()
                .map(|cwd| cwd.join(&local))
                .unwrap_or(local);
        }
        dirs::home_dir()
            .unwrap_or_default()
            .join(".config")
            .join("mcp-ansible")
            .join("config.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the registry. A missing file is an empty registry.
    pub fn load(&self) -> Result<RegistryFile, RegistryError> {
        let shown = self.path.display().to_string();
        if !self.path.exists() {
            debug!(path = %shown, "No project registry yet");
            return Ok(RegistryFile::default());
        }
        let text = std::fs::read_to_string(&self.path).map_err(|source| RegistryError::Read {
            path: shown.clone(),
            source,
        })?;
        let mut file: RegistryFile =
            serde_json::from_str(&text).map_err(|source| RegistryError::Malformed {
                path: shown,
                source,
            })?;
        for (name, project) in file.projects.iter_mut() {
            if project.name.is_empty() {
                project.name = name.clone();
            }
        }
        Ok(file)
    }

    /// Replace the registry file atomically: write a temporary file beside
    /// it, then rename over the original.
    pub fn save(&self, file: &RegistryFile) -> Result<(), RegistryError> {
        let shown = self.path.display().to_string();
        let write_err = |source: std::io::Error| RegistryError::Write {
            path: shown.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;
        let json = serde_json::to_string_pretty(file).map_err(|e| write_err(std::io::Error::other(e)))?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        temp.write_all(json.as_bytes()).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.path).map_err(|e| write_err(e.error))?;
        info!(path = %shown, projects = file.projects.len(), "Saved project registry");
        Ok(())
    }

    /// Add or replace `project`, optionally making it the default.
    pub fn register(
        &self,
        project: ProjectDefinition,
        make_default: bool,
    ) -> Result<RegistryFile, RegistryError> {
        let mut file = self.load()?;
        if make_default {
            file.defaults.project = Some(project.name.clone());
        }
        file.projects.insert(project.name.clone(), project);
        self.save(&file)?;
        Ok(file)
    }
}

/// Pick the project for a request: the explicitly named one, else the
/// project declared in the environment, else the saved default.
pub fn select_project(
    file: &RegistryFile,
    explicit: Option<&str>,
    env_project: Option<&ProjectDefinition>,
) -> ToolResult<Option<ProjectDefinition>> {
    if let Some(name) = explicit {
        return file
            .projects
            .get(name)
            .cloned()
            .map(Some)
            .ok_or_else(|| ToolError::not_found("Project", name));
    }
    if let Some(project) = env_project {
        return Ok(Some(project.clone()));
    }
    Ok(file.default_project().cloned())
}

/// YAML files below `root` whose top level is a list, sorted. Files that do
/// not parse are skipped.
pub fn discover_playbooks(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk(root, &mut found);
    found.sort();
    found
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            if !SKIPPED_DIRS.contains(&name.as_str()) {
                walk(&path, found);
            }
            continue;
        }
        if !(name.ends_with(".yml") || name.ends_with(".yaml")) {
            continue;
        }
        let is_playbook = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_yaml::from_str::<serde_yaml::Value>(&text).ok())
            .is_some_and(|doc| doc.is_sequence());
        if is_playbook {
            found.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn project_env_joins_search_paths() {
        let project = ProjectDefinition {
            name: "site".into(),
            root: "/srv/site".into(),
            roles_paths: Some(vec!["/a".into(), "/b".into()]),
            collections_paths: Some(vec!["/c".into()]),
            env: Some(BTreeMap::from([("ANSIBLE_FORCE_COLOR".to_string(), "1".to_string())])),
            ..Default::default()
        };
        let vars = project.env_vars();
        assert_eq!(vars["ANSIBLE_ROLES_PATH"], format!("/a{}/b", PATH_LIST_SEPARATOR));
        assert_eq!(vars["ANSIBLE_COLLECTIONS_PATHS"], "/c");
        assert_eq!(vars["ANSIBLE_FORCE_COLOR"], "1");
    }

    #[test]
    fn env_declared_project() {
        assert!(ProjectDefinition::from_env_vars(env(&[("HOME", "/root")])).is_none());

        let project = ProjectDefinition::from_env_vars(env(&[
            ("MCP_ANSIBLE_PROJECT_ROOT", "/srv/site"),
            ("MCP_ANSIBLE_INVENTORY", "/srv/site/hosts"),
            ("MCP_ANSIBLE_ENV_ANSIBLE_STDOUT_CALLBACK", "yaml"),
        ]))
        .unwrap();
        assert_eq!(project.name, DEFAULT_ENV_PROJECT_NAME);
        assert!(project.root.ends_with("site"));
        assert!(project.inventory.as_deref().unwrap().ends_with("hosts"));
        assert_eq!(
            project.env.unwrap()["ANSIBLE_STDOUT_CALLBACK"],
            "yaml"
        );
    }

    #[test]
    fn selection_order() {
        let mut file = RegistryFile::default();
        for name in ["a", "b"] {
            file.projects.insert(
                name.to_string(),
                ProjectDefinition {
                    name: name.to_string(),
                    root: format!("/{}", name),
                    ..Default::default()
                },
            );
        }
        file.defaults.project = Some("b".into());
        let from_env = ProjectDefinition {
            name: "env".into(),
            root: "/env".into(),
            ..Default::default()
        };

        let pick = |explicit, env_project| {
            select_project(&file, explicit, env_project)
                .unwrap()
                .map(|p| p.name)
        };
        assert_eq!(pick(Some("a"), Some(&from_env)).as_deref(), Some("a"));
        assert_eq!(pick(None, Some(&from_env)).as_deref(), Some("env"));
        assert_eq!(pick(None, None).as_deref(), Some("b"));
        assert!(select_project(&file, Some("zzz"), None).is_err());
    }

    #[test]
    fn discovers_only_playbooks() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("roles/web/tasks")).unwrap();
        std::fs::create_dir_all(root.join("plays")).unwrap();
        std::fs::write(root.join("site.yml"), "- hosts: all\n  tasks: []\n").unwrap();
        std::fs::write(root.join("plays/db.yaml"), "- hosts: db\n").unwrap();
        std::fs::write(root.join("vars.yml"), "a: 1\n").unwrap();
        std::fs::write(root.join("broken.yml"), "- [unclosed\n").unwrap();
        std::fs::write(root.join("roles/web/tasks/main.yml"), "- name: skipped\n").unwrap();

        let found = discover_playbooks(root);
        assert_eq!(found, vec![root.join("plays/db.yaml"), root.join("site.yml")]);
    }
}
