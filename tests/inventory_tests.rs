//! Integration tests for inventory resolution.
//!
//! Inventories are written into temporary directories and resolved through
//! the public API, the same way the tools and the CLI drive it.

use ansible_mcp::inventory::{
    HashBehaviour, InventoryError, ROOT_GROUP, ResolveRequest, ResolvedGraph, resolve,
};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

/// Helper to write a file, creating parent directories.
fn write(dir: &Path, rel: &str, content: &str) -> String {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}

fn resolve_one(path: &str) -> ResolvedGraph {
    resolve(&[path.to_string()]).expect("inventory should resolve")
}

const LAYERED: &str = "\
[all:vars]
tier=root

[web]
host1

[web:vars]
tier=group

[prod:children]
web
";

#[test]
fn web_group_scenario() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[web]\nhost1\nhost2\n\n[web:vars]\nrole=frontend\n");

    let graph = resolve_one(&inv);
    let host = graph.find_host("host1", false).unwrap();
    assert_eq!(host.groups, vec!["all", "web"]);
    assert_eq!(host.vars, json!({"role": "frontend"}).as_object().unwrap().clone());
    assert!(host.provenance.is_none());
}

#[test]
fn every_host_reaches_the_root_group() {
    let temp = TempDir::new().unwrap();
    let inv = write(
        temp.path(),
        "hosts.ini",
        "loose1\n[web]\nweb1\n[db]\ndb1\n[prod:children]\nweb\n[eu:children]\nprod\n",
    );

    let graph = resolve_one(&inv);
    assert_eq!(graph.host_count(), 3);
    for host in graph.hosts() {
        let view = graph.find_host(&host.name, false).unwrap();
        assert!(view.groups.iter().any(|g| g == ROOT_GROUP), "{} lost the root", host.name);
    }
    let loose = graph.find_host("loose1", false).unwrap();
    assert_eq!(loose.groups, vec!["all", "ungrouped"]);
    let web1 = graph.find_host("web1", false).unwrap();
    assert_eq!(web1.groups, vec!["all", "eu", "prod", "web"]);
    assert_eq!(web1.direct_groups, vec!["web"]);
}

#[test]
fn resolution_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "inventory/10-hosts.ini", LAYERED);
    write(temp.path(), "inventory/20-more.yml", "all:\n  hosts:\n    extra1:\n      tier: yaml\n");
    write(temp.path(), "inventory/group_vars/web/b.yml", "nested: {b: 2}\n");
    write(temp.path(), "inventory/group_vars/web/a.yml", "nested: {a: 1}\n");
    let dir = Path::new(&inv).parent().unwrap().display().to_string();

    let first = resolve_one(&dir);
    let second = resolve_one(&dir);
    let dump = |g: &ResolvedGraph| serde_json::to_string(&g.list(true)).unwrap();
    assert_eq!(dump(&first), dump(&second));
    assert_eq!(
        first.find_host("host1", false).unwrap().vars.get("nested"),
        Some(&json!({"b": 2}))
    );
}

#[test]
fn three_level_precedence() {
    let temp = TempDir::new().unwrap();
    let with_host = write(
        temp.path(),
        "with_host.ini",
        &LAYERED.replace("[web]\nhost1\n", "[web]\nhost1 tier=host\n"),
    );
    let without_host = write(temp.path(), "without_host.ini", LAYERED);

    let graph = resolve_one(&with_host);
    let view = graph.find_host("host1", true).unwrap();
    assert_eq!(view.vars.get("tier"), Some(&json!("host")));
    let origin = view.provenance.unwrap().get("tier").unwrap().to_string();
    assert!(origin.contains("with_host.ini"), "unexpected origin {}", origin);

    let graph = resolve_one(&without_host);
    assert_eq!(
        graph.find_host("host1", false).unwrap().vars.get("tier"),
        Some(&json!("group"))
    );
}

#[test]
fn companion_files_override_inline_values() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[web]\nhost1 inline=host\n[web:vars]\nport=80\n");
    write(temp.path(), "group_vars/all.yml", "port: 1\nntp: pool.example.com\n");
    write(temp.path(), "group_vars/web.yml", "port: 8080\n");
    write(temp.path(), "host_vars/host1.yml", "inline: file\n");

    let graph = resolve_one(&inv);
    let vars = graph.find_host("host1", false).unwrap().vars;
    // Group files outrank inline group vars at any depth.
    assert_eq!(vars.get("port"), Some(&json!(8080)));
    assert_eq!(vars.get("ntp"), Some(&json!("pool.example.com")));
    assert_eq!(vars.get("inline"), Some(&json!("file")));
}

#[test]
fn deeper_group_vars_files_win() {
    let temp = TempDir::new().unwrap();
    // Alphabetical order would let `zone` win; depth puts `app` last.
    let inv = write(temp.path(), "hosts.ini", "[app]\nhost1\n[zone:children]\napp\n");
    write(temp.path(), "group_vars/zone.yml", "site: zone\nregion: eu\n");
    write(temp.path(), "group_vars/app.yml", "site: app\n");

    let graph = resolve_one(&inv);
    let view = graph.find_host("host1", true).unwrap();
    assert_eq!(view.vars.get("site"), Some(&json!("app")));
    assert_eq!(view.vars.get("region"), Some(&json!("eu")));
    let origin = view.provenance.unwrap().get("site").unwrap().to_string();
    assert!(origin.contains("app.yml"), "unexpected origin {}", origin);
}

#[test]
fn group_priority_orders_sibling_group_vars_files() {
    let temp = TempDir::new().unwrap();
    let plain = write(temp.path(), "plain/hosts.ini", "[a]\nhost1\n[b]\nhost1\n");
    let weighted = write(
        temp.path(),
        "weighted/hosts.ini",
        "[a]\nhost1\n[b]\nhost1\n[a:vars]\nansible_group_priority=10\n",
    );
    for dir in ["plain", "weighted"] {
        write(temp.path(), &format!("{}/group_vars/a.yml", dir), "color: red\n");
        write(temp.path(), &format!("{}/group_vars/b.yml", dir), "color: blue\n");
    }

    // Equal depth and priority: name order, so `b` applies last.
    let graph = resolve_one(&plain);
    assert_eq!(
        graph.find_host("host1", false).unwrap().vars.get("color"),
        Some(&json!("blue"))
    );
    // The higher priority group applies last.
    let graph = resolve_one(&weighted);
    assert_eq!(
        graph.find_host("host1", false).unwrap().vars.get("color"),
        Some(&json!("red"))
    );
}

#[test]
fn broken_companion_files_are_reported_together() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[web]\nweb1\n[db]\ndb1\n");
    let web = write(temp.path(), "group_vars/web.yml", "port: [80\n");
    let db = write(temp.path(), "group_vars/db.yml", "engine: postgres\nreplicas: [1, 2\n");
    write(temp.path(), "group_vars/all.yml", "ntp: pool.example.com\n");
    write(temp.path(), "host_vars/db1.yml", "role: primary\n");

    match ResolveRequest::new(vec![inv.clone()]).resolve() {
        Err(InventoryError::Sources(failures)) => {
            let names: Vec<_> = failures.iter().map(|f| f.source_name.clone()).collect();
            assert_eq!(names, vec![db, web]);
            assert!(failures.iter().all(|f| f.error.kind() == "parse_error"));
        }
        other => panic!("expected companion failures, got {:?}", other.map(|r| r.failures.len())),
    }

    let mut request = ResolveRequest::new(vec![inv]);
    request.continue_on_error = true;
    let resolution = request.resolve().unwrap();
    assert_eq!(resolution.failures.len(), 2);
    let db1 = resolution.graph.find_host("db1", false).unwrap();
    assert_eq!(db1.vars.get("role"), Some(&json!("primary")));
    assert_eq!(db1.vars.get("ntp"), Some(&json!("pool.example.com")));
    assert_eq!(db1.vars.get("engine"), None);
    let web1 = resolution.graph.find_host("web1", false).unwrap();
    assert_eq!(web1.vars.get("port"), None);
}

#[test]
fn source_and_companion_failures_share_one_report() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[web]\nweb1\n");
    write(temp.path(), "host_vars/web1.yml", "- not a mapping\n");
    let missing = temp.path().join("missing.ini").display().to_string();

    match resolve(&[inv, missing.clone()]) {
        Err(InventoryError::Sources(failures)) => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].source_name, missing);
            assert!(failures[1].source_name.ends_with("web1.yml"));
        }
        other => panic!("expected aggregated failures, got {:?}", other.map(|g| g.host_count())),
    }
}

#[test]
fn vaulted_group_vars_resolve_to_ciphertext() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[db]\ndb1\n");
    write(
        temp.path(),
        "group_vars/db.yml",
        "db_password: !vault |\n  $ANSIBLE_VAULT;1.1;AES256\n  6231336539\ndb_port: 5432\n",
    );

    let graph = resolve_one(&inv);
    let vars = graph.find_host("db1", false).unwrap().vars;
    assert_eq!(vars.get("db_port"), Some(&json!(5432)));
    let secret = vars.get("db_password").and_then(|v| v.as_str()).unwrap();
    assert!(secret.starts_with("$ANSIBLE_VAULT;"));
}

#[test]
fn extensionless_flow_yaml_source() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts", "all: {hosts: {h1: {x: 1}}}\n");

    let graph = resolve_one(&inv);
    assert_eq!(graph.find_host("h1", false).unwrap().vars.get("x"), Some(&json!(1)));
}

#[test]
fn playbook_dir_companions_apply_last() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "inv/hosts.ini", "[web]\nhost1\n");
    write(temp.path(), "inv/group_vars/web.yml", "site: inventory\n");
    write(temp.path(), "play/group_vars/web.yml", "site: playbook\n");

    let mut request = ResolveRequest::new(vec![inv]);
    request.companion_dirs = vec![temp.path().join("play")];
    let graph = request.resolve().unwrap().graph;
    assert_eq!(
        graph.find_host("host1", false).unwrap().vars.get("site"),
        Some(&json!("playbook"))
    );
}

#[test]
fn hash_behaviour_merge_combines_mappings() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[web]\nhost1\n");
    write(temp.path(), "group_vars/all.yml", "app: {user: deploy, port: 80}\n");
    write(temp.path(), "group_vars/web.yml", "app: {port: 8080}\n");

    let replaced = resolve_one(&inv);
    assert_eq!(
        replaced.find_host("host1", false).unwrap().vars.get("app"),
        Some(&json!({"port": 8080}))
    );

    let mut request = ResolveRequest::new(vec![inv]);
    request.hash_behaviour = HashBehaviour::Merge;
    let merged = request.resolve().unwrap().graph;
    assert_eq!(
        merged.find_host("host1", false).unwrap().vars.get("app"),
        Some(&json!({"user": "deploy", "port": 8080}))
    );
}

#[test]
fn mutual_ancestors_are_a_cycle() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[a:children]\nb\n[b:children]\na\n[b]\nh1\n");

    match resolve(&[inv]) {
        Err(InventoryError::Cycle { groups }) => {
            assert!(groups.contains(&"a".to_string()));
            assert!(groups.contains(&"b".to_string()));
        }
        other => panic!("expected a cycle error, got {:?}", other.map(|g| g.host_count())),
    }
}

#[test]
fn diff_is_symmetric() {
    let temp = TempDir::new().unwrap();
    let left = write(temp.path(), "left.ini", "[web]\nshared\nold\n[db]\nmoved\n");
    let right = write(temp.path(), "right.ini", "[web]\nshared\nmoved\nnew\n[cache]\nshared\n");

    let left = resolve_one(&left);
    let right = resolve_one(&right);
    let forward = left.diff(&right);
    let backward = right.diff(&left);

    assert_eq!(forward.only_left, vec!["old"]);
    assert_eq!(forward.only_right, vec!["new"]);
    assert_eq!(forward.only_left, backward.only_right);
    assert_eq!(forward.only_right, backward.only_left);
    assert_eq!(forward.groups_only_left, backward.groups_only_right);
    for (host, change) in &forward.membership {
        let reverse = &backward.membership[host];
        assert_eq!(change.added, reverse.removed);
        assert_eq!(change.removed, reverse.added);
    }
    assert_eq!(forward.membership["moved"].added, vec!["web"]);
    assert_eq!(forward.membership["moved"].removed, vec!["db"]);
    assert_eq!(forward.membership["shared"].added, vec!["cache"]);
    assert!(left.diff(&left).is_empty());
}

#[test]
fn empty_inventory_is_valid() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "empty.ini", "# nothing here\n");

    let graph = resolve_one(&inv);
    assert_eq!(graph.host_count(), 0);
    assert_eq!(graph.group_count(), 1);
    assert_eq!(graph.root().name, ROOT_GROUP);
    assert!(graph.list(false).hosts.is_empty());
}

#[test]
fn later_source_wins_for_inline_host_vars() {
    let temp = TempDir::new().unwrap();
    let first = write(temp.path(), "a/hosts.ini", "[web]\nhost1 color=red\n");
    let second = write(temp.path(), "b/hosts.yml", "all:\n  hosts:\n    host1:\n      color: blue\n");

    let graph = resolve(&[first.clone(), second.clone()]).unwrap();
    assert_eq!(
        graph.find_host("host1", false).unwrap().vars.get("color"),
        Some(&json!("blue"))
    );
    let graph = resolve(&[second, first]).unwrap();
    assert_eq!(
        graph.find_host("host1", false).unwrap().vars.get("color"),
        Some(&json!("red"))
    );
}

#[test]
fn names_are_case_sensitive() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", "[Web]\nHost1\n[web]\nhost1\n");

    let graph = resolve_one(&inv);
    assert_eq!(graph.host_count(), 2);
    assert_eq!(graph.find_host("Host1", false).unwrap().groups, vec!["Web", "all"]);
    assert!(graph.find_host("HOST1", false).is_err());
}

#[test]
fn missing_and_broken_sources_are_reported_together() {
    let temp = TempDir::new().unwrap();
    let good = write(temp.path(), "good.ini", "[web]\nhost1\n");
    let broken = write(temp.path(), "broken.ini", "[web:bogus]\n");
    let missing = temp.path().join("missing.ini").display().to_string();

    let request = ResolveRequest::new(vec![good.clone(), broken.clone(), missing.clone()]);
    match request.resolve() {
        Err(InventoryError::Sources(failures)) => {
            let names: Vec<_> = failures.iter().map(|f| f.source_name.clone()).collect();
            assert_eq!(names, vec![broken, missing]);
        }
        other => panic!("expected source failures, got {:?}", other.map(|r| r.failures.len())),
    }

    let mut request = ResolveRequest::new(vec![good, temp.path().join("missing.ini").display().to_string()]);
    request.continue_on_error = true;
    let resolution = request.resolve().unwrap();
    assert_eq!(resolution.failures.len(), 1);
    assert_eq!(resolution.graph.host_count(), 1);
}

#[test]
fn host_list_and_json_sources() {
    let temp = TempDir::new().unwrap();
    let json_inv = write(
        temp.path(),
        "inv.json",
        r#"{"web": {"hosts": ["host1"], "vars": {"port": 80}}, "_meta": {"hostvars": {"host1": {"id": 7}}}}"#,
    );

    let graph = resolve(&[json_inv, "adhoc1,adhoc2".to_string()]).unwrap();
    let host1 = graph.find_host("host1", false).unwrap();
    assert_eq!(host1.vars.get("port"), Some(&json!(80)));
    assert_eq!(host1.vars.get("id"), Some(&json!(7)));
    assert!(graph.host("adhoc2").is_some());
}

#[test]
fn graph_renders_as_tree() {
    let temp = TempDir::new().unwrap();
    let inv = write(temp.path(), "hosts.ini", LAYERED);

    let graph = resolve_one(&inv);
    let tree = graph.render_tree(None, false).unwrap();
    let lines: Vec<&str> = tree.lines().collect();
    assert_eq!(lines[0], "@all:");
    assert!(tree.contains("@prod:"));
    assert!(tree.contains("host1"));
    assert!(graph.render_tree(Some("nope"), false).is_err());
}
