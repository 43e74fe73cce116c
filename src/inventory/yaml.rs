//! YAML inventories and `ansible-inventory --list` JSON.
//!
//! YAML layout:
//!
//! ```yaml
//! all:
//!   vars: { ntp: pool.ntp.org }
//!   hosts:
//!     bastion:
//!   children:
//!     web:
//!       hosts:
//!         web[01:02]:
//!           http_port: 8080
//! ```

use super::error::{InventoryError, Result};
use super::pattern::expand_hosts;
use super::source::Fragment;
use super::vars::mapping_from_yaml;
use serde_json::Value;
use serde_yaml::{Mapping, Value as Yaml};
use tracing::warn;

/// Parse YAML inventory text.
pub fn parse_yaml(text: &str, origin: &str) -> Result<Fragment> {
    let doc: Yaml = serde_yaml::from_str(text).map_err(|e| yaml_error(origin, &e))?;
    let mut fragment = Fragment::new(origin);
    match doc {
        Yaml::Null => {}
        Yaml::Mapping(groups) => {
            for (name, body) in groups {
                let name = group_name(name, origin)?;
                walk_group(&mut fragment, &name, body, origin)?;
            }
        }
        _ => {
            return Err(InventoryError::parse(
                origin,
                None,
                "inventory must be a mapping of group names",
            ));
        }
    }
    Ok(fragment)
}

fn yaml_error(origin: &str, e: &serde_yaml::Error) -> InventoryError {
    InventoryError::parse(origin, e.location().map(|l| l.line()), e.to_string())
}

fn group_name(key: Yaml, origin: &str) -> Result<String> {
    match key {
        Yaml::String(s) if !s.trim().is_empty() => Ok(s),
        other => Err(InventoryError::parse(
            origin,
            None,
            format!("invalid group name {:?}", other),
        )),
    }
}

fn walk_group(fragment: &mut Fragment, name: &str, body: Yaml, origin: &str) -> Result<()> {
    fragment.declare_group(name);
    let index = fragment.groups.len() - 1;

    let body = match body {
        Yaml::Null => return Ok(()),
        Yaml::Mapping(body) => body,
        _ => {
            return Err(InventoryError::parse(
                origin,
                None,
                format!("group '{}' must be a mapping", name),
            ));
        }
    };

    for (key, value) in body {
        let key = key.as_str().unwrap_or_default().to_string();
        match key.as_str() {
            "vars" => {
                fragment.groups[index].vars = mapping_from_yaml(value, origin)?;
            }
            "hosts" => {
                for (host_pattern, host_vars) in section(value, name, "hosts", origin)? {
                    let pattern = host_pattern.as_str().map(String::from).ok_or_else(|| {
                        InventoryError::parse(
                            origin,
                            None,
                            format!("host names in group '{}' must be strings", name),
                        )
                    })?;
                    let vars = mapping_from_yaml(host_vars, origin)?;
                    let hosts = expand_hosts(&pattern)
                        .map_err(|e| InventoryError::parse(origin, None, e))?;
                    for host in hosts {
                        fragment.groups[index].hosts.push(host.clone());
                        fragment.declare_host(host, vars.clone());
                    }
                }
            }
            "children" => {
                for (child, child_body) in section(value, name, "children", origin)? {
                    let child = group_name(child, origin)?;
                    fragment.groups[index].children.push(child.clone());
                    walk_group(fragment, &child, child_body, origin)?;
                }
            }
            other => {
                warn!(group = %name, key = %other, path = %origin, "Skipping unexpected key in inventory group");
            }
        }
    }
    Ok(())
}

fn section(value: Yaml, group: &str, key: &str, origin: &str) -> Result<Mapping> {
    match value {
        Yaml::Null => Ok(Mapping::new()),
        Yaml::Mapping(m) => Ok(m),
        _ => Err(InventoryError::parse(
            origin,
            None,
            format!("'{}' of group '{}' must be a mapping", key, group),
        )),
    }
}

/// Parse a JSON inventory. Output of `ansible-inventory --list` (script
/// style, with `_meta.hostvars` and host arrays) is recognised; any other
/// JSON is read with the YAML layout.
pub fn parse_json(text: &str, origin: &str) -> Result<Fragment> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| InventoryError::parse(origin, Some(e.line()), e.to_string()))?;
    let Value::Object(root) = &value else {
        return Err(InventoryError::parse(origin, None, "inventory must be a JSON object"));
    };
    if !is_script_style(root) {
        return parse_yaml(text, origin);
    }

    let mut fragment = Fragment::new(origin);
    for (name, body) in root {
        if name == "_meta" {
            continue;
        }
        let group = fragment.declare_group(name.clone());
        match body {
            // Legacy form: a bare list of hosts.
            Value::Array(hosts) => group.hosts = string_list(hosts, name, origin)?,
            Value::Object(body) => {
                if let Some(Value::Array(hosts)) = body.get("hosts") {
                    group.hosts = string_list(hosts, name, origin)?;
                }
                if let Some(Value::Array(children)) = body.get("children") {
                    group.children = string_list(children, name, origin)?;
                }
                if let Some(Value::Object(vars)) = body.get("vars") {
                    group.vars = vars.clone();
                }
            }
            _ => {
                return Err(InventoryError::parse(
                    origin,
                    None,
                    format!("group '{}' must be an object or a list of hosts", name),
                ));
            }
        }
    }

    let hostvars = root
        .get("_meta")
        .and_then(|m| m.get("hostvars"))
        .and_then(Value::as_object);
    let mut declared: Vec<String> = fragment
        .groups
        .iter()
        .flat_map(|g| g.hosts.iter().cloned())
        .collect();
    if let Some(hostvars) = hostvars {
        declared.extend(hostvars.keys().cloned());
    }
    declared.sort();
    declared.dedup();
    for host in declared {
        let vars = hostvars
            .and_then(|hv| hv.get(&host))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        fragment.declare_host(host, vars);
    }
    Ok(fragment)
}

fn is_script_style(root: &serde_json::Map<String, Value>) -> bool {
    root.contains_key("_meta")
        || root.values().any(|group| match group {
            Value::Array(_) => true,
            Value::Object(body) => {
                matches!(body.get("hosts"), Some(Value::Array(_)))
                    || matches!(body.get("children"), Some(Value::Array(_)))
            }
            _ => false,
        })
}

fn string_list(values: &[Value], group: &str, origin: &str) -> Result<Vec<String>> {
    values
        .iter()
        .map(|v| {
            v.as_str().map(String::from).ok_or_else(|| {
                InventoryError::parse(
                    origin,
                    None,
                    format!("group '{}' lists a non-string entry {}", group, v),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn yaml_nested_children() {
        let text = "
all:
  vars:
    ntp: pool.ntp.org
  hosts:
    bastion:
  children:
    web:
      hosts:
        web[01:02]:
          http_port: 8080
      vars:
        role: frontend
    db:
";
        let fragment = parse_yaml(text, "hosts.yml").unwrap();
        let names: Vec<_> = fragment.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["all", "web", "db"]);
        assert_eq!(fragment.groups[0].children, vec!["web", "db"]);
        assert_eq!(fragment.groups[0].hosts, vec!["bastion"]);
        assert_eq!(fragment.groups[1].hosts, vec!["web01", "web02"]);
        assert_eq!(fragment.groups[1].vars.get("role"), Some(&json!("frontend")));
        assert_eq!(fragment.hosts[1].vars.get("http_port"), Some(&json!(8080)));
    }

    #[test]
    fn yaml_errors_carry_line() {
        let err = parse_yaml("all:\n  hosts: [a, b\n", "bad.yml").unwrap_err();
        match err {
            InventoryError::Parse { path, line, .. } => {
                assert_eq!(path, "bad.yml");
                assert!(line.is_some());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(parse_yaml("- a\n- b\n", "list.yml").is_err());
    }

    #[test]
    fn script_style_json() {
        let text = r#"{
            "_meta": {"hostvars": {"h1": {"x": 1}, "h3": {}}},
            "all": {"children": ["ungrouped", "web"]},
            "web": {"hosts": ["h1", "h2"], "vars": {"role": "frontend"}},
            "ungrouped": {"hosts": ["h3"]}
        }"#;
        let fragment = parse_json(text, "inv.json").unwrap();
        let hosts: Vec<_> = fragment.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(hosts, vec!["h1", "h2", "h3"]);
        assert_eq!(fragment.hosts[0].vars.get("x"), Some(&json!(1)));
        let web = fragment.groups.iter().find(|g| g.name == "web").unwrap();
        assert_eq!(web.vars.get("role"), Some(&json!("frontend")));
    }

    #[test]
    fn yaml_shaped_json_uses_yaml_layout() {
        let text = r#"{"all": {"hosts": {"h1": {"a": 1}}}}"#;
        let fragment = parse_json(text, "inv.json").unwrap();
        assert_eq!(fragment.groups[0].hosts, vec!["h1"]);
        assert_eq!(fragment.hosts[0].vars.get("a"), Some(&json!(1)));
    }
}
