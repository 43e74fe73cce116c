//! Inventory resolution engine.
//!
//! Sources are loaded into raw fragments ([`source`]), unified into one
//! [`ResolvedGraph`] with companion overlays ([`graph`]), and queried
//! ([`query`]). Nothing here runs the external toolchain.

pub mod ansible_cfg;
pub mod companion;
pub mod error;
pub mod graph;
pub mod ini;
pub mod pattern;
pub mod query;
pub mod source;
pub mod vars;
pub mod yaml;

pub use ansible_cfg::{AnsibleConfig, ConfigLookup};
pub use error::{InventoryError, Result, SourceFailure, SourceFailureReport};
pub use graph::{Group, GroupId, Host, MergeOptions, OverlayOrigin, ResolvedGraph, ROOT_GROUP, UNGROUPED_GROUP};
pub use query::{GraphDiff, HostView, InventoryListing, MembershipChange, TreeLines};
pub use vars::{HashBehaviour, VarMap};

use std::path::PathBuf;
use tracing::{info, warn};

/// Everything needed to build one graph.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Source strings in declaration order.
    pub sources: Vec<String>,
    /// Base for relative source paths.
    pub base_dir: Option<PathBuf>,
    /// Extra directories searched for `group_vars/` and `host_vars/` after
    /// the ones next to each source.
    pub companion_dirs: Vec<PathBuf>,
    pub hash_behaviour: HashBehaviour,
    /// Resolve with the sources that loaded when others fail.
    pub continue_on_error: bool,
}

/// A graph plus the sources and companion files skipped under
/// `continue_on_error`.
#[derive(Debug)]
pub struct Resolution {
    pub graph: ResolvedGraph,
    pub failures: Vec<SourceFailure>,
}

impl ResolveRequest {
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            ..Default::default()
        }
    }

    /// Load, merge and return a fresh graph.
    ///
    /// Failing inventory sources and failing companion files are reported
    /// together. Without `continue_on_error` any failure aborts with all of
    /// them; with it, the graph is built from whatever loaded.
    pub fn resolve(&self) -> Result<Resolution> {
        let report = source::load_sources(&self.sources, self.base_dir.as_deref());
        let mut failures = report.failures;

        let mut companion_dirs = report.companion_dirs;
        for dir in &self.companion_dirs {
            if !companion_dirs.contains(dir) {
                companion_dirs.push(dir.clone());
            }
        }

        let options = MergeOptions {
            hash_behaviour: self.hash_behaviour,
        };
        let graph = match graph::merge_fragments(&report.fragments, &companion_dirs, options) {
            Ok((graph, companion_failures)) => {
                failures.extend(companion_failures);
                graph
            }
            // A partial graph may be malformed only because a source is
            // missing, so the source failures take precedence.
            Err(_) if !failures.is_empty() && !self.continue_on_error => {
                return Err(InventoryError::Sources(failures));
            }
            Err(e) => return Err(e),
        };

        if !failures.is_empty() {
            if !self.continue_on_error {
                return Err(InventoryError::Sources(failures));
            }
            warn!(
                failed = failures.len(),
                loaded = report.fragments.len(),
                "Continuing with the inventory files that loaded"
            );
        }
        info!(
            sources = self.sources.len(),
            hosts = graph.host_count(),
            groups = graph.group_count(),
            "Inventory resolved"
        );
        Ok(Resolution { graph, failures })
    }
}

/// Resolve `sources` with default options.
pub fn resolve(sources: &[String]) -> Result<ResolvedGraph> {
    ResolveRequest::new(sources.to_vec())
        .resolve()
        .map(|r| r.graph)
}
