//! Read-only queries over a [`ResolvedGraph`]: list, tree, host lookup, diff.

use super::error::{InventoryError, Result};
use super::graph::{GroupId, OverlayOrigin, ROOT_GROUP, ResolvedGraph};
use super::vars::{VarMap, display_value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Direct members of one group.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GroupListing {
    pub hosts: Vec<String>,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InventoryListing {
    pub hosts: Vec<String>,
    pub groups: BTreeMap<String, GroupListing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostvars: Option<BTreeMap<String, VarMap>>,
}

/// One host as seen through the resolved graph.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostView {
    pub name: String,
    /// Every group the host belongs to, including `all`, sorted.
    pub groups: Vec<String>,
    pub direct_groups: Vec<String>,
    pub vars: VarMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<BTreeMap<String, OverlayOrigin>>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MembershipChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

/// Structural difference between two graphs. `added`/`removed` are seen
/// from the left graph towards the right one.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct GraphDiff {
    pub only_left: Vec<String>,
    pub only_right: Vec<String>,
    pub membership: BTreeMap<String, MembershipChange>,
    pub groups_only_left: Vec<String>,
    pub groups_only_right: Vec<String>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.only_left.is_empty()
            && self.only_right.is_empty()
            && self.membership.is_empty()
            && self.groups_only_left.is_empty()
            && self.groups_only_right.is_empty()
    }
}

impl ResolvedGraph {
    /// All hosts and, per group, its direct hosts and child groups.
    pub fn list(&self, include_vars: bool) -> InventoryListing {
        let groups = self
            .groups()
            .map(|group| {
                let listing = GroupListing {
                    hosts: group.hosts.iter().cloned().collect(),
                    children: self.names_of(&group.children),
                };
                (group.name.clone(), listing)
            })
            .collect();
        let hostvars = include_vars.then(|| {
            self.hosts()
                .map(|h| (h.name.clone(), h.vars.clone()))
                .collect()
        });
        InventoryListing {
            hosts: self.hosts().map(|h| h.name.clone()).collect(),
            groups,
            hostvars,
        }
    }

    /// Tree lines from `all`, without variables.
    pub fn tree(&self) -> TreeLines<'_> {
        TreeLines::new(self, self.root_id(), false)
    }

    /// Tree lines from `group`, optionally with each host's variables.
    pub fn tree_from(&self, group: &str, with_vars: bool) -> Result<TreeLines<'_>> {
        let id = self.group_id(group).ok_or_else(|| InventoryError::GroupNotFound {
            group: group.to_string(),
        })?;
        Ok(TreeLines::new(self, id, with_vars))
    }

    /// The whole tree as newline-joined text.
    pub fn render_tree(&self, group: Option<&str>, with_vars: bool) -> Result<String> {
        let lines = self.tree_from(group.unwrap_or(ROOT_GROUP), with_vars)?;
        Ok(lines.collect::<Vec<_>>().join("\n"))
    }

    pub fn find_host(&self, name: &str, include_provenance: bool) -> Result<HostView> {
        let host = self.host(name).ok_or_else(|| InventoryError::HostNotFound {
            host: name.to_string(),
        })?;
        Ok(HostView {
            name: host.name.clone(),
            groups: self.names_of(&host.ancestors),
            direct_groups: self.names_of(&host.groups),
            vars: host.vars.clone(),
            provenance: include_provenance.then(|| host.provenance.clone()),
        })
    }

    /// Groups `host` belongs to, directly or transitively, without `all`.
    fn effective_groups(&self, host: &str) -> BTreeSet<String> {
        self.host(host)
            .map(|h| {
                h.ancestors
                    .iter()
                    .map(|id| self.group(*id).name.clone())
                    .filter(|name| name != ROOT_GROUP)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hosts and effective group memberships that differ between `self`
    /// (left) and `other` (right). Variables are not compared.
    pub fn diff(&self, other: &ResolvedGraph) -> GraphDiff {
        let left: BTreeSet<&str> = self.hosts().map(|h| h.name.as_str()).collect();
        let right: BTreeSet<&str> = other.hosts().map(|h| h.name.as_str()).collect();

        let mut membership = BTreeMap::new();
        for host in left.intersection(&right) {
            let before = self.effective_groups(host);
            let after = other.effective_groups(host);
            let change = MembershipChange {
                added: after.difference(&before).cloned().collect(),
                removed: before.difference(&after).cloned().collect(),
            };
            if !change.added.is_empty() || !change.removed.is_empty() {
                membership.insert(host.to_string(), change);
            }
        }

        let left_groups: BTreeSet<&str> = self.groups().map(|g| g.name.as_str()).collect();
        let right_groups: BTreeSet<&str> = other.groups().map(|g| g.name.as_str()).collect();

        GraphDiff {
            only_left: owned(left.difference(&right)),
            only_right: owned(right.difference(&left)),
            membership,
            groups_only_left: owned(left_groups.difference(&right_groups)),
            groups_only_right: owned(right_groups.difference(&left_groups)),
        }
    }
}

fn owned<S: ToString>(names: impl Iterator<Item = S>) -> Vec<String> {
    names.map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone)]
enum Pending<'a> {
    Group(GroupId, usize),
    Host(&'a str, usize),
    Var(&'a str, &'a serde_json::Value, usize),
}

/// Lazy `ansible-inventory --graph` style rendering.
///
/// Lines are produced on demand from an explicit stack; cloning the
/// iterator, or calling [`ResolvedGraph::tree`] again, restarts it.
#[derive(Debug, Clone)]
pub struct TreeLines<'a> {
    graph: &'a ResolvedGraph,
    stack: Vec<Pending<'a>>,
    with_vars: bool,
}

impl<'a> TreeLines<'a> {
    fn new(graph: &'a ResolvedGraph, start: GroupId, with_vars: bool) -> Self {
        Self {
            graph,
            stack: vec![Pending::Group(start, 0)],
            with_vars,
        }
    }
}

fn prefix(depth: usize) -> String {
    if depth == 0 {
        String::new()
    } else {
        format!("  {}|--", "|  ".repeat(depth - 1))
    }
}

impl<'a> Iterator for TreeLines<'a> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let graph = self.graph;
        match self.stack.pop()? {
            Pending::Group(id, depth) => {
                let group = graph.group(id);
                // Pushed in reverse so child groups come out first, then hosts,
                // each alphabetically.
                for host in group.hosts.iter().rev() {
                    self.stack.push(Pending::Host(host.as_str(), depth + 1));
                }
                for child in graph.sorted_children(id).into_iter().rev() {
                    self.stack.push(Pending::Group(child, depth + 1));
                }
                Some(format!("{}@{}:", prefix(depth), group.name))
            }
            Pending::Host(name, depth) => {
                if self.with_vars
                    && let Some(host) = graph.host(name)
                {
                    for (key, value) in host.vars.iter().rev() {
                        self.stack.push(Pending::Var(key.as_str(), value, depth + 1));
                    }
                }
                Some(format!("{}{}", prefix(depth), name))
            }
            Pending::Var(key, value, depth) => {
                Some(format!("{}{{{} = {}}}", prefix(depth), key, display_value(value)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::graph::{MergeOptions, merge_fragments};
    use crate::inventory::ini::parse_ini;

    fn graph(text: &str) -> ResolvedGraph {
        let fragment = parse_ini(text, "hosts").unwrap();
        merge_fragments(&[fragment], &[], MergeOptions::default()).unwrap().0
    }

    #[test]
    fn tree_matches_graph_style() {
        let g = graph("loose\n[web]\nhost2\nhost1\n[db]\ndb1\n[prod:children]\nweb\n");
        let lines: Vec<String> = g.tree().collect();
        assert_eq!(
            lines,
            vec![
                "@all:",
                "  |--@db:",
                "  |  |--db1",
                "  |--@prod:",
                "  |  |--@web:",
                "  |  |  |--host1",
                "  |  |  |--host2",
                "  |--@ungrouped:",
                "  |  |--loose",
            ]
        );
    }

    #[test]
    fn tree_is_restartable_and_can_start_anywhere() {
        let g = graph("[web]\nh1 port=80\n");
        let mut lines = g.tree();
        let first = lines.next();
        let again = g.tree().next();
        assert_eq!(first, again);

        let from_web: Vec<String> = g.tree_from("web", true).unwrap().collect();
        assert_eq!(from_web, vec!["@web:", "  |--h1", "  |  |--{port = 80}"]);

        assert!(g.tree_from("nope", false).is_err());
    }

    #[test]
    fn listing_and_lookup() {
        let g = graph("[web]\nhost1\nhost2\n[web:vars]\nrole=frontend\n");
        let listing = g.list(false);
        assert_eq!(listing.hosts, vec!["host1", "host2"]);
        assert_eq!(listing.groups["web"].hosts, vec!["host1", "host2"]);
        assert_eq!(listing.groups["all"].children, vec!["web"]);
        assert!(listing.hostvars.is_none());
        assert!(g.list(true).hostvars.unwrap().contains_key("host1"));

        let view = g.find_host("host1", false).unwrap();
        assert_eq!(view.groups, vec!["all", "web"]);
        assert_eq!(view.direct_groups, vec!["web"]);
        assert!(view.provenance.is_none());

        let err = g.find_host("host9", false).unwrap_err();
        assert_eq!(err.to_string(), "host not found: host9");
    }

    #[test]
    fn diff_compares_effective_membership() {
        let left = graph("[web]\nh1\nh2\n[old]\nh3\n");
        let right = graph("[web]\nh1\n[db]\nh2\n[prod:children]\nweb\n[new]\nh4\n");
        let diff = left.diff(&right);
        assert_eq!(diff.only_left, vec!["h3"]);
        assert_eq!(diff.only_right, vec!["h4"]);
        assert_eq!(diff.membership["h1"].added, vec!["prod"]);
        assert_eq!(diff.membership["h2"].removed, vec!["web"]);
        assert_eq!(diff.membership["h2"].added, vec!["db"]);
        assert_eq!(diff.groups_only_left, vec!["old"]);
        assert!(left.diff(&left).is_empty());
    }
}
