//! The resolved inventory graph and the merge engine that builds it.
//!
//! Groups live in an arena indexed by [`GroupId`]; parent/child edges are
//! sets of ids, so the ancestry relation never forms live reference cycles.
//! Variable precedence, lowest to highest:
//!
//! 1. inline group variables, ancestors ordered root first
//! 2. `group_vars/` files, same ordering
//! 3. inline host variables
//! 4. `host_vars/` files
//!
//! Within a layer, later sources and later (sorted) files win.

use super::companion::{Scope, load_companions};
use super::error::{InventoryError, Result, SourceFailure};
use super::source::Fragment;
use super::vars::{HashBehaviour, VarMap, combine_into, display_value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, trace, warn};

/// Index of a group in the graph's arena.
pub type GroupId = usize;

/// Name of the implicit root group.
pub const ROOT_GROUP: &str = "all";
/// Group that collects hosts declared outside any other group.
pub const UNGROUPED_GROUP: &str = "ungrouped";

const ROOT_ID: GroupId = 0;
const DEFAULT_GROUP_PRIORITY: i64 = 1;
const PRIORITY_VAR: &str = "ansible_group_priority";

/// Where a variable overlay came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayOrigin {
    InlineGroup { group: String, source: String },
    GroupVarsFile { group: String, path: String },
    InlineHost { source: String },
    HostVarsFile { path: String },
}

impl fmt::Display for OverlayOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayOrigin::InlineGroup { group, source } => {
                write!(f, "group '{}' vars in {}", group, source)
            }
            OverlayOrigin::GroupVarsFile { group, path } => {
                write!(f, "group_vars for '{}' in {}", group, path)
            }
            OverlayOrigin::InlineHost { source } => write!(f, "host vars in {}", source),
            OverlayOrigin::HostVarsFile { path } => write!(f, "host_vars in {}", path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    /// Direct member hosts.
    pub hosts: BTreeSet<String>,
    pub children: BTreeSet<GroupId>,
    pub parents: BTreeSet<GroupId>,
    /// Inline variables, folded across declaration sites (pre-merge).
    pub vars: VarMap,
    /// Longest distance from the root group.
    pub depth: usize,
    pub priority: i64,
    inline: Vec<(String, VarMap)>,
    companion: Vec<(PathBuf, VarMap)>,
}

impl Group {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hosts: BTreeSet::new(),
            children: BTreeSet::new(),
            parents: BTreeSet::new(),
            vars: VarMap::new(),
            depth: 0,
            priority: DEFAULT_GROUP_PRIORITY,
            inline: Vec::new(),
            companion: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Host {
    pub name: String,
    /// Groups the host was declared in directly.
    pub groups: BTreeSet<GroupId>,
    /// Every group the host belongs to, directly or transitively, in merge
    /// order (root first).
    pub ancestors: Vec<GroupId>,
    /// Overlays applied to this host, in application order.
    pub overlays: Vec<OverlayOrigin>,
    /// Effective variables.
    pub vars: VarMap,
    /// Overlay that supplied each effective variable.
    pub provenance: BTreeMap<String, OverlayOrigin>,
    inline: Vec<(String, VarMap)>,
    companion: Vec<(PathBuf, VarMap)>,
}

impl Host {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            groups: BTreeSet::new(),
            ancestors: Vec::new(),
            overlays: Vec::new(),
            vars: VarMap::new(),
            provenance: BTreeMap::new(),
            inline: Vec::new(),
            companion: Vec::new(),
        }
    }
}

/// Knobs for [`merge_fragments`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub hash_behaviour: HashBehaviour,
}

/// A merged, queryable inventory. Immutable once built.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    groups: Vec<Group>,
    index: HashMap<String, GroupId>,
    hosts: BTreeMap<String, Host>,
}

impl Default for ResolvedGraph {
    fn default() -> Self {
        let mut index = HashMap::new();
        index.insert(ROOT_GROUP.to_string(), ROOT_ID);
        Self {
            groups: vec![Group::new(ROOT_GROUP)],
            index,
            hosts: BTreeMap::new(),
        }
    }
}

impl ResolvedGraph {
    pub fn root(&self) -> &Group {
        &self.groups[ROOT_ID]
    }

    pub fn root_id(&self) -> GroupId {
        ROOT_ID
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id]
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.index.get(name).copied()
    }

    pub fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.group_id(name).map(|id| &self.groups[id])
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Hosts in name order.
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Names of the given groups, sorted.
    pub fn names_of<'a>(&self, ids: impl IntoIterator<Item = &'a GroupId>) -> Vec<String> {
        let mut names: Vec<String> = ids
            .into_iter()
            .map(|id| self.groups[*id].name.clone())
            .collect();
        names.sort();
        names
    }

    /// Child group ids of `id`, sorted by name.
    pub fn sorted_children(&self, id: GroupId) -> Vec<GroupId> {
        let mut children: Vec<GroupId> = self.groups[id].children.iter().copied().collect();
        children.sort_by(|a, b| self.groups[*a].name.cmp(&self.groups[*b].name));
        children
    }

    /// Emit the provenance of every effective variable of `host` at debug
    /// level.
    pub fn log_provenance(&self, host: &str) -> Result<()> {
        let entry = self.host(host).ok_or_else(|| InventoryError::HostNotFound {
            host: host.to_string(),
        })?;
        for (key, origin) in &entry.provenance {
            let value = entry.vars.get(key).map(display_value).unwrap_or_default();
            debug!(host = %host, key = %key, value = %value, origin = %origin, "Variable provenance");
        }
        Ok(())
    }

    fn intern(&mut self, name: &str) -> GroupId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.groups.len();
        self.groups.push(Group::new(name));
        self.index.insert(name.to_string(), id);
        id
    }

    fn host_entry(&mut self, name: &str) -> &mut Host {
        self.hosts
            .entry(name.to_string())
            .or_insert_with(|| Host::new(name))
    }

    fn link(&mut self, parent: GroupId, child: GroupId) {
        self.groups[parent].children.insert(child);
        self.groups[child].parents.insert(parent);
    }

    /// Union one fragment into the graph.
    fn absorb(&mut self, fragment: &Fragment, behaviour: HashBehaviour) {
        for decl in &fragment.groups {
            let id = self.intern(&decl.name);
            for host in &decl.hosts {
                self.host_entry(host).groups.insert(id);
                self.groups[id].hosts.insert(host.clone());
            }
            for child in &decl.children {
                let child_id = self.intern(child);
                if child_id == ROOT_ID {
                    warn!(
                        group = %decl.name,
                        source = %fragment.origin,
                        "Ignoring declaration of the root group as a child"
                    );
                    continue;
                }
                self.link(id, child_id);
            }
            if !decl.vars.is_empty() {
                let group = &mut self.groups[id];
                combine_into(&mut group.vars, &decl.vars, behaviour);
                group.inline.push((fragment.origin.clone(), decl.vars.clone()));
            }
        }
        for decl in &fragment.hosts {
            let origin = fragment.origin.clone();
            let host = self.host_entry(&decl.name);
            if !decl.vars.is_empty() {
                host.inline.push((origin, decl.vars.clone()));
            }
        }
    }

    /// Groups with no declared parent hang off the root.
    fn link_orphans_to_root(&mut self) {
        for id in 1..self.groups.len() {
            if self.groups[id].parents.is_empty() {
                self.link(ROOT_ID, id);
            }
        }
    }

    /// Depth-first search over every group (root first, then by name);
    /// a back edge is a cycle. Walks an explicit stack so deep `children`
    /// chains cannot exhaust the call stack.
    fn check_cycles(&self) -> Result<()> {
        let mut marks = vec![Mark::New; self.groups.len()];
        let mut starts: Vec<GroupId> = (0..self.groups.len()).collect();
        starts.sort_by(|a, b| {
            (*a != ROOT_ID)
                .cmp(&(*b != ROOT_ID))
                .then_with(|| self.groups[*a].name.cmp(&self.groups[*b].name))
        });
        for start in starts {
            if marks[start] != Mark::New {
                continue;
            }
            // Groups on the current path, each with its children and the
            // index of the next child to visit.
            let mut stack: Vec<(GroupId, Vec<GroupId>, usize)> = Vec::new();
            marks[start] = Mark::Active;
            stack.push((start, self.sorted_children(start), 0));
            while let Some((id, children, next)) = stack.last_mut() {
                let Some(&child) = children.get(*next) else {
                    marks[*id] = Mark::Done;
                    stack.pop();
                    continue;
                };
                *next += 1;
                match marks[child] {
                    Mark::Active => {
                        let from = stack.iter().position(|(g, _, _)| *g == child).unwrap_or(0);
                        let mut groups: Vec<String> = stack[from..]
                            .iter()
                            .map(|(g, _, _)| self.groups[*g].name.clone())
                            .collect();
                        groups.push(self.groups[child].name.clone());
                        return Err(InventoryError::Cycle { groups });
                    }
                    Mark::New => {
                        marks[child] = Mark::Active;
                        stack.push((child, self.sorted_children(child), 0));
                    }
                    Mark::Done => {}
                }
            }
        }
        Ok(())
    }

    /// Hosts without a group other than the root join `ungrouped`.
    fn place_ungrouped_hosts(&mut self) {
        let loose: Vec<String> = self
            .hosts
            .values()
            .filter(|h| h.groups.iter().all(|g| *g == ROOT_ID))
            .map(|h| h.name.clone())
            .collect();
        if loose.is_empty() {
            return;
        }
        let id = self.intern(UNGROUPED_GROUP);
        if self.groups[id].parents.is_empty() {
            self.link(ROOT_ID, id);
        }
        for name in loose {
            self.groups[id].hosts.insert(name.clone());
            self.host_entry(&name).groups.insert(id);
        }
    }

    /// Longest path from the root, in topological order. Only called on an
    /// acyclic graph.
    fn compute_depths(&mut self) {
        let mut pending: Vec<usize> = self.groups.iter().map(|g| g.parents.len()).collect();
        let mut depths = vec![0usize; self.groups.len()];
        let mut queue: VecDeque<GroupId> = (0..self.groups.len()).filter(|id| pending[*id] == 0).collect();
        while let Some(id) = queue.pop_front() {
            for &child in &self.groups[id].children {
                depths[child] = depths[child].max(depths[id] + 1);
                pending[child] -= 1;
                if pending[child] == 0 {
                    queue.push_back(child);
                }
            }
        }
        for (group, depth) in self.groups.iter_mut().zip(depths) {
            group.depth = depth;
        }
    }

    fn compute_priorities(&mut self) {
        for group in &mut self.groups {
            group.priority = group
                .vars
                .get(PRIORITY_VAR)
                .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(DEFAULT_GROUP_PRIORITY);
        }
    }

    /// Transitive closure of each host's memberships, sorted into merge order.
    fn compute_ancestors(&mut self) {
        let groups = &self.groups;
        for host in self.hosts.values_mut() {
            let mut seen: BTreeSet<GroupId> = BTreeSet::from([ROOT_ID]);
            let mut queue: VecDeque<GroupId> = host.groups.iter().copied().collect();
            while let Some(id) = queue.pop_front() {
                if seen.insert(id) {
                    queue.extend(groups[id].parents.iter().copied());
                }
            }
            let mut ancestors: Vec<GroupId> = seen.into_iter().collect();
            ancestors.sort_by(|a, b| {
                let (ga, gb) = (&groups[*a], &groups[*b]);
                ga.depth
                    .cmp(&gb.depth)
                    .then(ga.priority.cmp(&gb.priority))
                    .then_with(|| ga.name.cmp(&gb.name))
            });
            host.ancestors = ancestors;
        }
    }

    /// Attach `group_vars/` and `host_vars/` files. Files that fail to load
    /// are returned and contribute nothing.
    fn attach_companions(&mut self, dirs: &[PathBuf]) -> Vec<SourceFailure> {
        if dirs.is_empty() {
            return Vec::new();
        }
        let group_load = load_companions(dirs, Scope::Group, |name| self.index.contains_key(name));
        let host_load = load_companions(dirs, Scope::Host, |name| self.hosts.contains_key(name));
        for file in group_load.files {
            if let Some(&id) = self.index.get(&file.entity) {
                self.groups[id].companion.push((file.path, file.vars));
            }
        }
        for file in host_load.files {
            if let Some(host) = self.hosts.get_mut(&file.entity) {
                host.companion.push((file.path, file.vars));
            }
        }
        let mut failures = group_load.failures;
        failures.extend(host_load.failures);
        failures
    }

    fn merge_variables(&mut self, behaviour: HashBehaviour) {
        let groups = &self.groups;
        for host in self.hosts.values_mut() {
            let mut acc = Accumulator::new(behaviour);
            for &id in &host.ancestors {
                let group = &groups[id];
                for (source, vars) in &group.inline {
                    let origin = OverlayOrigin::InlineGroup {
                        group: group.name.clone(),
                        source: source.clone(),
                    };
                    acc.apply(origin, vars);
                }
            }
            for &id in &host.ancestors {
                let group = &groups[id];
                for (path, vars) in &group.companion {
                    let origin = OverlayOrigin::GroupVarsFile {
                        group: group.name.clone(),
                        path: path.display().to_string(),
                    };
                    acc.apply(origin, vars);
                }
            }
            for (source, vars) in &host.inline {
                acc.apply(OverlayOrigin::InlineHost { source: source.clone() }, vars);
            }
            for (path, vars) in &host.companion {
                let origin = OverlayOrigin::HostVarsFile {
                    path: path.display().to_string(),
                };
                acc.apply(origin, vars);
            }
            trace!(host = %host.name, overlays = acc.overlays.len(), vars = acc.vars.len(), "Merged host variables");
            host.vars = acc.vars;
            host.provenance = acc.provenance;
            host.overlays = acc.overlays;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

struct Accumulator {
    behaviour: HashBehaviour,
    vars: VarMap,
    provenance: BTreeMap<String, OverlayOrigin>,
    overlays: Vec<OverlayOrigin>,
}

impl Accumulator {
    fn new(behaviour: HashBehaviour) -> Self {
        Self {
            behaviour,
            vars: VarMap::new(),
            provenance: BTreeMap::new(),
            overlays: Vec::new(),
        }
    }

    fn apply(&mut self, origin: OverlayOrigin, overlay: &VarMap) {
        combine_into(&mut self.vars, overlay, self.behaviour);
        for key in overlay.keys() {
            self.provenance.insert(key.clone(), origin.clone());
        }
        self.overlays.push(origin);
    }
}

/// Unify raw fragments and companion overlays into one resolved graph.
///
/// Fragments are applied in the order given; `companion_dirs` are searched
/// for `group_vars/` and `host_vars/` in the order given. Companion files that
/// failed to load are returned beside the graph, which is built without them.
pub fn merge_fragments(
    fragments: &[Fragment],
    companion_dirs: &[PathBuf],
    options: MergeOptions,
) -> Result<(ResolvedGraph, Vec<SourceFailure>)> {
    let mut graph = ResolvedGraph::default();
    for fragment in fragments {
        graph.absorb(fragment, options.hash_behaviour);
    }
    graph.link_orphans_to_root();
    graph.check_cycles()?;
    graph.place_ungrouped_hosts();
    graph.compute_depths();
    graph.compute_priorities();
    graph.compute_ancestors();
    let failures = graph.attach_companions(companion_dirs);
    graph.merge_variables(options.hash_behaviour);
    debug!(
        hosts = graph.host_count(),
        groups = graph.group_count(),
        "Resolved inventory graph"
    );
    Ok((graph, failures))
}
