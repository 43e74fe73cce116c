//! Inventory source loading.
//!
//! A source is a file, a directory of files, or a comma-joined host list.
//! Each loads into one or more raw [`Fragment`]s; the merge engine unifies
//! them. Failures are collected per source rather than stopping at the first.

use super::error::{InventoryError, SourceFailure};
use super::vars::VarMap;
use super::{ini, yaml};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A host declared at a single site, with the variables attached there.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostDecl {
    pub name: String,
    pub vars: VarMap,
}

/// A group declaration site: member hosts, child groups, inline variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupDecl {
    pub name: String,
    pub hosts: Vec<String>,
    pub children: Vec<String>,
    pub vars: VarMap,
}

/// Raw, unmerged content of one inventory file or host list.
///
/// Declarations keep their file order and may repeat; the merge engine
/// folds repeats in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    /// Where the fragment came from (file path or the literal host list).
    pub origin: String,
    pub hosts: Vec<HostDecl>,
    pub groups: Vec<GroupDecl>,
}

impl Fragment {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// Record a host declaration.
    pub fn declare_host(&mut self, name: impl Into<String>, vars: VarMap) {
        self.hosts.push(HostDecl {
            name: name.into(),
            vars,
        });
    }

    /// Open a new group declaration site and return it for filling in.
    pub fn declare_group(&mut self, name: impl Into<String>) -> &mut GroupDecl {
        self.groups.push(GroupDecl {
            name: name.into(),
            ..Default::default()
        });
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }
}

/// What a source string refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    HostList(Vec<String>),
    File(PathBuf),
    Directory(PathBuf),
    Missing(PathBuf),
}

/// Decide what `source` refers to. Relative paths resolve against `base`.
pub fn classify(source: &str, base: Option<&Path>) -> SourceKind {
    let path = expand_path(source, base);
    if path.is_dir() {
        return SourceKind::Directory(path);
    }
    if path.is_file() {
        return SourceKind::File(path);
    }
    if source.contains(',') {
        let hosts = source
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect();
        return SourceKind::HostList(hosts);
    }
    SourceKind::Missing(path)
}

/// Expand `~` and resolve relative paths against `base`.
pub fn expand_path(raw: &str, base: Option<&Path>) -> PathBuf {
    let expanded = if raw == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(raw))
    } else if let Some(rest) = raw.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw))
    } else {
        PathBuf::from(raw)
    };
    match base {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    }
}

/// Everything the loader produced for a list of sources.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Fragments in source declaration order.
    pub fragments: Vec<Fragment>,
    /// Directories searched for `group_vars/` and `host_vars/`, in source
    /// order, without duplicates.
    pub companion_dirs: Vec<PathBuf>,
    pub failures: Vec<SourceFailure>,
}

impl LoadReport {
    fn add_companion_dir(&mut self, dir: PathBuf) {
        if !self.companion_dirs.contains(&dir) {
            self.companion_dirs.push(dir);
        }
    }

    fn fail(&mut self, source_name: impl Into<String>, error: InventoryError) {
        let source_name = source_name.into();
        warn!(source = %source_name, error = %error, "Inventory source failed to load");
        self.failures.push(SourceFailure { source_name, error });
    }
}

/// Load every source independently, in order.
pub fn load_sources(sources: &[String], base: Option<&Path>) -> LoadReport {
    let mut report = LoadReport::default();
    for source in sources {
        match classify(source, base) {
            SourceKind::HostList(hosts) => {
                let mut fragment = Fragment::new(source.clone());
                for host in hosts {
                    fragment.declare_host(host, VarMap::new());
                }
                report.fragments.push(fragment);
            }
            SourceKind::File(path) => {
                if let Some(parent) = path.parent() {
                    report.add_companion_dir(parent.to_path_buf());
                }
                match load_file(&path) {
                    Ok(fragment) => report.fragments.push(fragment),
                    Err(e) => report.fail(source.clone(), e),
                }
            }
            SourceKind::Directory(dir) => {
                report.add_companion_dir(dir.clone());
                load_directory(&dir, &mut report);
            }
            SourceKind::Missing(path) => report.fail(
                source.clone(),
                InventoryError::SourceNotFound {
                    path: path.display().to_string(),
                },
            ),
        }
    }
    debug!(
        fragments = report.fragments.len(),
        failures = report.failures.len(),
        "Loaded inventory sources"
    );
    report
}

/// File name suffixes skipped inside inventory directories.
const IGNORED_SUFFIXES: &[&str] = &["~", ".orig", ".bak", ".retry", ".pyc", ".pyo", ".cfg"];

/// Subdirectories of an inventory directory that hold variables, not hosts.
const COMPANION_DIRS: &[&str] = &["group_vars", "host_vars"];

fn load_directory(dir: &Path, report: &mut LoadReport) {
    let entries = match sorted_entries(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.fail(dir.display().to_string(), e);
            return;
        }
    };
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') || IGNORED_SUFFIXES.iter().any(|s| name.ends_with(s)) {
            continue;
        }
        if path.is_dir() {
            if !COMPANION_DIRS.contains(&name) {
                load_directory(&path, report);
            }
            continue;
        }
        match load_file(&path) {
            Ok(fragment) => report.fragments.push(fragment),
            Err(e) => report.fail(path.display().to_string(), e),
        }
    }
}

/// Directory entries sorted by path, so load order never depends on the
/// filesystem's listing order.
pub fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, InventoryError> {
    let read = std::fs::read_dir(dir).map_err(|e| InventoryError::io(dir.display().to_string(), e))?;
    let mut entries = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| InventoryError::io(dir.display().to_string(), e))?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Inventory file syntaxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Ini,
    Yaml,
    Json,
}

/// Pick the format by extension, falling back to a look at the content.
pub fn detect_format(path: &Path, text: &str) -> FileFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml" | "yaml") => return FileFormat::Yaml,
        Some("json") => return FileFormat::Json,
        _ => {}
    }
    let first = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with(';'));
    match first {
        Some(line) if line.starts_with('{') => FileFormat::Json,
        Some("---") => FileFormat::Yaml,
        Some(line) if line.ends_with(':') && !line.starts_with('[') && !line.contains('=') => {
            FileFormat::Yaml
        }
        _ => FileFormat::Ini,
    }
}

/// Load a single inventory file.
pub fn load_file(path: &Path) -> Result<Fragment, InventoryError> {
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| InventoryError::io(origin.clone(), e))?;
    let fragment = match detect_format(path, &text) {
        // Without an extension the sniff can mistake flow-style YAML for
        // INI, so YAML gets a second chance before the INI error stands.
        FileFormat::Ini if path.extension().is_none() => match ini::parse_ini(&text, &origin) {
            Ok(fragment) => fragment,
            Err(ini_err) => yaml::parse_yaml(&text, &origin).map_err(|_| ini_err)?,
        },
        FileFormat::Ini => ini::parse_ini(&text, &origin)?,
        FileFormat::Yaml => yaml::parse_yaml(&text, &origin)?,
        FileFormat::Json => yaml::parse_json(&text, &origin)?,
    };
    debug!(
        path = %origin,
        hosts = fragment.hosts.len(),
        groups = fragment.groups.len(),
        "Parsed inventory file"
    );
    Ok(fragment)
}
