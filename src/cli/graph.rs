//! Offline inventory subcommands: `graph` and `host`.

use crate::config::Config;
use crate::inventory::{ConfigLookup, ResolveRequest};
use anyhow::{Result, bail};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where the inventory comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Inventory source (file, directory or comma-separated host list); repeatable
    #[arg(short = 'i', long = "inventory", value_name = "SRC")]
    pub inventory: Vec<String>,

    /// ansible.cfg to read when no -i is given (default: ANSIBLE_CONFIG, then ./ansible.cfg)
    #[arg(long, value_name = "FILE")]
    pub ansible_config: Option<PathBuf>,

    /// Extra directory searched for group_vars/ and host_vars/
    #[arg(long, value_name = "DIR")]
    pub playbook_dir: Option<PathBuf>,

    /// Resolve from the sources that loaded when some fail
    #[arg(long)]
    pub continue_on_error: bool,
}

impl SourceArgs {
    /// Resolution request for `sources`, falling back to `-i` and then to
    /// the effective ansible.cfg.
    pub fn request_for(&self, sources: &[String], config: &Config) -> Result<ResolveRequest> {
        let cwd = std::env::current_dir()?;
        let env: BTreeMap<String, String> = std::env::var("ANSIBLE_CONFIG")
            .ok()
            .map(|v| BTreeMap::from([("ANSIBLE_CONFIG".to_string(), v)]))
            .unwrap_or_default();
        let ansible_cfg = ConfigLookup {
            explicit: self.ansible_config.as_deref(),
            env: Some(&env),
            project_root: Some(&cwd),
        }
        .resolve()?;

        let sources = if !sources.is_empty() {
            sources.to_vec()
        } else if !self.inventory.is_empty() {
            self.inventory.clone()
        } else if !ansible_cfg.inventory.is_empty() {
            ansible_cfg.inventory.clone()
        } else {
            bail!("no inventory given: pass -i or run where ansible.cfg names one");
        };

        Ok(ResolveRequest {
            sources,
            base_dir: Some(cwd),
            companion_dirs: self.playbook_dir.iter().cloned().collect(),
            hash_behaviour: ansible_cfg
                .hash_behaviour
                .unwrap_or(config.inventory.hash_behaviour),
            continue_on_error: self.continue_on_error || config.inventory.continue_on_error,
        })
    }

    pub fn request(&self, config: &Config) -> Result<ResolveRequest> {
        self.request_for(&[], config)
    }
}

/// Arguments for the graph subcommand
#[derive(Args, Debug)]
pub struct GraphArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Show each host's variables
    #[arg(long)]
    pub vars: bool,

    /// Start from this group instead of all
    #[arg(long, value_name = "GROUP")]
    pub group: Option<String>,
}

/// Arguments for the host subcommand
#[derive(Args, Debug)]
pub struct HostArgs {
    /// Host name (case-sensitive)
    #[arg(value_name = "NAME")]
    pub name: String,

    #[command(flatten)]
    pub sources: SourceArgs,

    /// Show where each variable's value came from
    #[arg(long)]
    pub provenance: bool,
}
