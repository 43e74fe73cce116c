//! `ansible-galaxy` dependency installation and lock files.

use super::CommandSpec;
use crate::error::{ErrorCode, ToolError, ToolResult};
use serde::Serialize;
use serde_json::Value;
use serde_yaml::Value as Yaml;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const REQUIREMENTS_FILE: &str = "requirements.yml";
pub const LOCK_FILE: &str = "requirements.lock.yml";
pub const ROLES_DIR: &str = "roles";
pub const COLLECTIONS_DIR: &str = "collections";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    Role,
    Collection,
}

/// One entry of `requirements.yml`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Requirement {
    pub kind: RequirementKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    pub roles: Vec<Requirement>,
    pub collections: Vec<Requirement>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.collections.is_empty()
    }
}

/// Read `requirements.yml` from `path`.
pub fn read_requirements(path: &Path) -> ToolResult<Requirements> {
    if !path.is_file() {
        return Err(ToolError::source_not_found(path.display()));
    }
    let text = std::fs::read_to_string(path).map_err(ToolError::internal)?;
    parse_requirements(&text, &path.display().to_string())
}

/// Parse requirements text. A bare top-level list is the legacy roles-only
/// form.
pub fn parse_requirements(text: &str, origin: &str) -> ToolResult<Requirements> {
    let doc: Yaml = serde_yaml::from_str(text).map_err(|e| {
        ToolError::new(ErrorCode::ParseError, format!("{}: {}", origin, e))
    })?;
    let mut reqs = Requirements::default();
    match doc {
        Yaml::Null => {}
        Yaml::Sequence(items) => {
            reqs.roles = entries(&items, RequirementKind::Role, origin)?;
        }
        Yaml::Mapping(map) => {
            if let Some(Yaml::Sequence(items)) = map.get("roles") {
                reqs.roles = entries(items, RequirementKind::Role, origin)?;
            }
            if let Some(Yaml::Sequence(items)) = map.get("collections") {
                reqs.collections = entries(items, RequirementKind::Collection, origin)?;
            }
        }
        _ => {
            return Err(ToolError::new(
                ErrorCode::ParseError,
                format!("{}: requirements must be a mapping or a list", origin),
            ));
        }
    }
    Ok(reqs)
}

fn entries(items: &[Yaml], kind: RequirementKind, origin: &str) -> ToolResult<Vec<Requirement>> {
    items.iter().map(|item| entry(item, kind, origin)).collect()
}

fn entry(item: &Yaml, kind: RequirementKind, origin: &str) -> ToolResult<Requirement> {
    let scalar = |key: &str| -> Option<String> {
        match item.get(key)? {
            Yaml::String(s) => Some(s.clone()),
            Yaml::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    match item {
        Yaml::String(name) => Ok(Requirement {
            kind,
            name: name.clone(),
            version: None,
            src: None,
        }),
        Yaml::Mapping(_) => {
            let src = scalar("src");
            let name = scalar("name")
                .or_else(|| src.as_deref().map(name_from_src))
                .ok_or_else(|| {
                    ToolError::new(
                        ErrorCode::ParseError,
                        format!("{}: requirement without 'name' or 'src'", origin),
                    )
                })?;
            Ok(Requirement {
                kind,
                name,
                version: scalar("version"),
                src,
            })
        }
        other => Err(ToolError::new(
            ErrorCode::ParseError,
            format!("{}: unexpected requirement entry {:?}", origin, other),
        )),
    }
}

/// `https://github.com/org/ansible-role-x.git` -> `ansible-role-x`.
fn name_from_src(src: &str) -> String {
    let last = src.trim_end_matches('/').rsplit('/').next().unwrap_or(src);
    let last = last.rsplit(',').next().unwrap_or(last);
    last.trim_end_matches(".git").to_string()
}

/// Install commands for the non-empty sections of `reqs`, roles first.
pub fn install_commands(
    program: &str,
    requirements: &Path,
    root: &Path,
    reqs: &Requirements,
    force: bool,
) -> Vec<(RequirementKind, CommandSpec)> {
    let mut commands = Vec::new();
    let sections = [
        (RequirementKind::Role, "role", ROLES_DIR, reqs.roles.is_empty()),
        (
            RequirementKind::Collection,
            "collection",
            COLLECTIONS_DIR,
            reqs.collections.is_empty(),
        ),
    ];
    for (kind, sub, dir, empty) in sections {
        if empty {
            continue;
        }
        let mut spec = CommandSpec::new(program)
            .args([sub, "install", "-r"])
            .arg(requirements.display().to_string())
            .arg("-p")
            .arg(root.join(dir).display().to_string())
            .cwd(Some(root.to_path_buf()));
        if force {
            spec = spec.arg("--force");
        }
        commands.push((kind, spec));
    }
    commands
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Installed,
    AlreadyInstalled,
    Failed,
    Unknown,
}

/// Install outcome for one requirement.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ItemOutcome {
    pub kind: RequirementKind,
    pub name: String,
    pub status: ItemStatus,
}

/// Classify each requirement by what the installer printed about it.
/// `succeeded` is the installer's exit status for that section.
pub fn classify_items(items: &[Requirement], output: &str, succeeded: bool) -> Vec<ItemOutcome> {
    let nothing_to_do = output.contains("Nothing to do");
    items
        .iter()
        .map(|item| {
            let mentions: Vec<&str> = output
                .lines()
                .filter(|line| line.contains(item.name.as_str()))
                .collect();
            let status = if mentions.iter().any(|l| l.contains("NOT installed") || l.contains("ERROR")) {
                ItemStatus::Failed
            } else if mentions.iter().any(|l| l.contains("was installed successfully")) {
                ItemStatus::Installed
            } else if mentions.iter().any(|l| l.contains("already installed")) || nothing_to_do {
                ItemStatus::AlreadyInstalled
            } else if !succeeded {
                ItemStatus::Failed
            } else {
                ItemStatus::Unknown
            };
            ItemOutcome {
                kind: item.kind,
                name: item.name.clone(),
                status,
            }
        })
        .collect()
}

/// A resolved dependency in the lock file.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LockedItem {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LockFile {
    pub generated_at: String,
    pub roles: Vec<LockedItem>,
    pub collections: Vec<LockedItem>,
}

/// Scan installed roles and collections under `root`.
pub fn scan_installed(root: &Path) -> ToolResult<LockFile> {
    Ok(LockFile {
        generated_at: chrono::Utc::now().to_rfc3339(),
        roles: scan_roles(&root.join(ROLES_DIR))?,
        collections: scan_collections(&root.join(COLLECTIONS_DIR).join("ansible_collections"))?,
    })
}

/// Write `lock` as `requirements.lock.yml` under `root`.
pub fn write_lock(root: &Path, lock: &LockFile) -> ToolResult<PathBuf> {
    let path = root.join(LOCK_FILE);
    let yaml = serde_yaml::to_string(lock).map_err(ToolError::internal)?;
    std::fs::write(&path, yaml).map_err(ToolError::internal)?;
    debug!(path = %path.display(), "Wrote lock file");
    Ok(path)
}

fn sorted_dirs(dir: &Path) -> ToolResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(ToolError::internal)? {
        let path = entry.map_err(ToolError::internal)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn scan_roles(dir: &Path) -> ToolResult<Vec<LockedItem>> {
    let mut items = Vec::new();
    for role in sorted_dirs(dir)? {
        let info = role.join("meta").join(".galaxy_install_info");
        if !info.is_file() {
            continue;
        }
        let version = std::fs::read_to_string(&info)
            .ok()
            .and_then(|text| serde_yaml::from_str::<Yaml>(&text).ok())
            .and_then(|doc| match doc.get("version") {
                Some(Yaml::String(s)) => Some(s.clone()),
                Some(Yaml::Number(n)) => Some(n.to_string()),
                _ => None,
            });
        items.push(LockedItem {
            name: dir_name(&role),
            version,
        });
    }
    Ok(items)
}

fn scan_collections(dir: &Path) -> ToolResult<Vec<LockedItem>> {
    let mut items = Vec::new();
    for namespace in sorted_dirs(dir)? {
        for collection in sorted_dirs(&namespace)? {
            let manifest = collection.join("MANIFEST.json");
            if !manifest.is_file() {
                continue;
            }
            let info = match std::fs::read_to_string(&manifest)
                .ok()
                .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            {
                Some(doc) => doc,
                None => {
                    warn!(path = %manifest.display(), "Unreadable collection manifest");
                    continue;
                }
            };
            let version = info
                .pointer("/collection_info/version")
                .and_then(Value::as_str)
                .map(String::from);
            items.push(LockedItem {
                name: format!("{}.{}", dir_name(&namespace), dir_name(&collection)),
                version,
            });
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REQS: &str = "
roles:
  - name: geerlingguy.nginx
    version: 3.1.0
  - src: https://github.com/acme/ansible-role-base.git
collections:
  - community.general
  - name: ansible.posix
    version: '>=1.5'
";

    #[test]
    fn parses_both_sections() {
        let reqs = parse_requirements(REQS, "requirements.yml").unwrap();
        assert_eq!(reqs.roles.len(), 2);
        assert_eq!(reqs.roles[0].version.as_deref(), Some("3.1.0"));
        assert_eq!(reqs.roles[1].name, "ansible-role-base");
        assert_eq!(reqs.collections[0].name, "community.general");
        assert_eq!(reqs.collections[1].version.as_deref(), Some(">=1.5"));

        let legacy = parse_requirements("- foo.bar\n", "r.yml").unwrap();
        assert_eq!(legacy.roles[0].name, "foo.bar");
        assert!(legacy.collections.is_empty());

        assert!(parse_requirements("roles: [{version: 1}]\n", "r.yml").is_err());
    }

    #[test]
    fn install_commands_per_section() {
        let reqs = parse_requirements("collections:\n  - community.general\n", "r.yml").unwrap();
        let root = Path::new("/srv/site");
        let cmds = install_commands("ansible-galaxy", &root.join(REQUIREMENTS_FILE), root, &reqs, false);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].0, RequirementKind::Collection);
        assert_eq!(
            cmds[0].1.args,
            vec![
                "collection",
                "install",
                "-r",
                "/srv/site/requirements.yml",
                "-p",
                "/srv/site/collections"
            ]
        );
    }

    #[test]
    fn classifies_installer_output() {
        let reqs = parse_requirements(REQS, "requirements.yml").unwrap();
        let output = "\
- downloading role 'nginx', owned by geerlingguy
- geerlingguy.nginx (3.1.0) was installed successfully
[WARNING]: - ansible-role-base was NOT installed successfully: boom
";
        let outcomes = classify_items(&reqs.roles, output, false);
        assert_eq!(outcomes[0].status, ItemStatus::Installed);
        assert_eq!(outcomes[1].status, ItemStatus::Failed);

        let outcomes = classify_items(
            &reqs.collections,
            "Nothing to do. All requested collections are already installed.",
            true,
        );
        assert!(outcomes.iter().all(|o| o.status == ItemStatus::AlreadyInstalled));
    }

    #[test]
    fn lock_scans_installed_content() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let meta = root.join("roles/geerlingguy.nginx/meta");
        std::fs::create_dir_all(&meta).unwrap();
        std::fs::write(meta.join(".galaxy_install_info"), "install_date: today\nversion: 3.1.0\n").unwrap();
        std::fs::create_dir_all(root.join("roles/local_role")).unwrap();
        let coll = root.join("collections/ansible_collections/community/general");
        std::fs::create_dir_all(&coll).unwrap();
        std::fs::write(
            coll.join("MANIFEST.json"),
            r#"{"collection_info": {"namespace": "community", "name": "general", "version": "8.0.0"}}"#,
        )
        .unwrap();

        let lock = scan_installed(root).unwrap();
        assert_eq!(
            lock.roles,
            vec![LockedItem {
                name: "geerlingguy.nginx".into(),
                version: Some("3.1.0".into())
            }]
        );
        assert_eq!(lock.collections[0].name, "community.general");
        assert_eq!(lock.collections[0].version.as_deref(), Some("8.0.0"));

        let path = write_lock(root, &lock).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("generated_at"));
        assert!(text.contains("community.general"));
    }
}
