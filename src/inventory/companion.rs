//! `group_vars/` and `host_vars/` companion directories.
//!
//! An entity's variables may live in `<name>`, `<name>.yml`, `<name>.yaml`,
//! `<name>.json`, or in any file below a `<name>/` directory. Files are read
//! in directory order first, then sorted path order.

use super::error::{InventoryError, Result, SourceFailure};
use super::source::sorted_entries;
use super::vars::{VarMap, parse_vars_document};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which companion directory to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Group,
    Host,
}

impl Scope {
    pub fn dir_name(self) -> &'static str {
        match self {
            Scope::Group => "group_vars",
            Scope::Host => "host_vars",
        }
    }
}

/// Variables for one entity, read from one file.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionFile {
    pub entity: String,
    pub path: PathBuf,
    pub vars: VarMap,
}

const VAR_EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

/// Companion files that loaded, plus one failure per file or directory that
/// could not be read or parsed.
#[derive(Debug, Default)]
pub struct CompanionLoad {
    pub files: Vec<CompanionFile>,
    pub failures: Vec<SourceFailure>,
}

impl CompanionLoad {
    fn read(&mut self, entity: &str, path: &Path) {
        match read_file(entity, path) {
            Ok(file) => self.files.push(file),
            Err(e) => self.fail(path, e),
        }
    }

    fn fail(&mut self, path: &Path, error: InventoryError) {
        let source_name = path.display().to_string();
        warn!(source = %source_name, error = %error, "Companion variables failed to load");
        self.failures.push(SourceFailure { source_name, error });
    }
}

/// Read companion variables for every entity accepted by `wanted`, across
/// `dirs` in order. Entities not accepted are skipped without being parsed.
/// A bad file is recorded and skipped; the rest still load.
pub fn load_companions(dirs: &[PathBuf], scope: Scope, wanted: impl Fn(&str) -> bool) -> CompanionLoad {
    let mut load = CompanionLoad::default();
    for base in dirs {
        let dir = base.join(scope.dir_name());
        if !dir.is_dir() {
            continue;
        }
        let entries = match sorted_entries(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                load.fail(&dir, e);
                continue;
            }
        };
        for entry in entries {
            let Some(file_name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if entry.is_dir() {
                if wanted(file_name) {
                    match var_files_below(&entry) {
                        Ok(paths) => {
                            for path in paths {
                                load.read(file_name, &path);
                            }
                        }
                        Err(e) => load.fail(&entry, e),
                    }
                }
                continue;
            }
            let Some(entity) = entity_name(file_name) else {
                continue;
            };
            if wanted(entity) {
                load.read(entity, &entry);
            }
        }
    }
    debug!(
        scope = scope.dir_name(),
        files = load.files.len(),
        failures = load.failures.len(),
        "Loaded companion variables"
    );
    load
}

/// Entity name for a companion file, or `None` for files that are not
/// variable files.
fn entity_name(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if VAR_EXTENSIONS.contains(&ext) => Some(stem),
        _ if file_name.ends_with('~') => None,
        // Host names often contain dots, so any other file is named after
        // its entity verbatim.
        _ => Some(file_name),
    }
}

fn var_files_below(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in sorted_entries(dir)? {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if entry.is_dir() {
            files.extend(var_files_below(&entry)?);
            continue;
        }
        let known = match name.rsplit_once('.') {
            Some((_, ext)) => VAR_EXTENSIONS.contains(&ext),
            None => true,
        };
        if known {
            files.push(entry);
        }
    }
    Ok(files)
}

fn read_file(entity: &str, path: &Path) -> Result<CompanionFile> {
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| InventoryError::io(origin.clone(), e))?;
    Ok(CompanionFile {
        entity: entity.to_string(),
        path: path.to_path_buf(),
        vars: parse_vars_document(&text, &origin)?,
    })
}
