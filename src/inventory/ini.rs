//! INI-style inventory files.
//!
//! ```text
//! ungrouped-host
//!
//! [web]
//! web[01:02].example.com http_port=8080
//!
//! [web:vars]
//! role=frontend
//!
//! [prod:children]
//! web
//! ```

use super::error::{InventoryError, Result};
use super::pattern::expand_hosts;
use super::source::Fragment;
use super::vars::{VarMap, parse_literal, split_words};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Hosts,
    Vars,
    Children,
}

/// Parse INI inventory text. `origin` labels errors and provenance.
pub fn parse_ini(text: &str, origin: &str) -> Result<Fragment> {
    let mut fragment = Fragment::new(origin);
    // Index into `fragment.groups` of the open section, plus its kind.
    let mut current: Option<(usize, Section)> = None;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let err = |message: String| InventoryError::parse(origin, Some(line_no), message);

        if line.starts_with('[') {
            let Some(header) = line.strip_prefix('[').and_then(|l| l.split(']').next()) else {
                return Err(err(format!("malformed section header: {}", line)));
            };
            if !line[1 + header.len()..].starts_with(']') {
                return Err(err(format!("malformed section header: {}", line)));
            }
            let (name, section) = match header.split_once(':') {
                None => (header, Section::Hosts),
                Some((name, "vars")) => (name, Section::Vars),
                Some((name, "children")) => (name, Section::Children),
                Some((_, other)) => {
                    return Err(err(format!(
                        "section suffix must be 'vars' or 'children', found '{}'",
                        other
                    )));
                }
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(err(format!("invalid group name '{}'", name)));
            }
            fragment.declare_group(name);
            current = Some((fragment.groups.len() - 1, section));
            continue;
        }

        match current {
            None => {
                for (host, vars) in parse_host_line(line).map_err(err)? {
                    fragment.declare_host(host, vars);
                }
            }
            Some((group, Section::Hosts)) => {
                for (host, vars) in parse_host_line(line).map_err(err)? {
                    fragment.groups[group].hosts.push(host.clone());
                    fragment.declare_host(host, vars);
                }
            }
            Some((group, Section::Children)) => {
                let words = split_words(line).map_err(err)?;
                let Some(child) = words.first() else {
                    continue;
                };
                fragment.groups[group].children.push(child.clone());
            }
            Some((group, Section::Vars)) => {
                let Some((key, value)) = line.split_once('=') else {
                    return Err(err(format!("expected key=value in vars section, found '{}'", line)));
                };
                let key = key.trim();
                if key.is_empty() {
                    return Err(err("empty variable name".to_string()));
                }
                fragment.groups[group]
                    .vars
                    .insert(key.to_string(), parse_literal(value));
            }
        }
    }
    Ok(fragment)
}

/// Parse `host[:port] [key=value ...]`, expanding ranges.
fn parse_host_line(line: &str) -> std::result::Result<Vec<(String, VarMap)>, String> {
    let words = split_words(line)?;
    let Some((pattern, rest)) = words.split_first() else {
        return Ok(Vec::new());
    };

    let mut vars = VarMap::new();
    for word in rest {
        let Some((key, value)) = word.split_once('=') else {
            return Err(format!(
                "expected key=value host variable assignment, found '{}'",
                word
            ));
        };
        vars.insert(key.to_string(), parse_literal(value));
    }

    let (pattern, port) = split_port(pattern);
    if let Some(port) = port {
        vars.entry("ansible_port".to_string())
            .or_insert(Value::Number(port.into()));
    }

    Ok(expand_hosts(pattern)?
        .into_iter()
        .map(|host| (host, vars.clone()))
        .collect())
}

/// Split a trailing `:port` off a host pattern. Only the text after the last
/// range bracket is considered; IPv6 literals (several colons) are left alone.
fn split_port(pattern: &str) -> (&str, Option<u16>) {
    let tail_start = pattern.rfind(']').map(|i| i + 1).unwrap_or(0);
    let tail = &pattern[tail_start..];
    if tail.matches(':').count() != 1 {
        return (pattern, None);
    }
    match pattern.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host, Some(port)),
            Err(_) => (pattern, None),
        },
        None => (pattern, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_groups_vars_and_children() {
        let text = "\
top1

[web]
host1 http_port=8080
host2

[web:vars]
role=frontend
max = 3

[prod:children]
web
";
        let fragment = parse_ini(text, "hosts").unwrap();
        let hosts: Vec<_> = fragment.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(hosts, vec!["top1", "host1", "host2"]);
        assert_eq!(fragment.hosts[1].vars.get("http_port"), Some(&json!(8080)));

        assert_eq!(fragment.groups.len(), 3);
        assert_eq!(fragment.groups[0].name, "web");
        assert_eq!(fragment.groups[0].hosts, vec!["host1", "host2"]);
        assert_eq!(fragment.groups[1].vars.get("role"), Some(&json!("frontend")));
        assert_eq!(fragment.groups[1].vars.get("max"), Some(&json!(3)));
        assert_eq!(fragment.groups[2].name, "prod");
        assert_eq!(fragment.groups[2].children, vec!["web"]);
    }

    #[test]
    fn ports_and_ranges() {
        let fragment = parse_ini("[db]\ndb[1:2]:2222\n", "hosts").unwrap();
        assert_eq!(fragment.groups[0].hosts, vec!["db1", "db2"]);
        assert_eq!(fragment.hosts[0].vars.get("ansible_port"), Some(&json!(2222)));
    }

    #[test]
    fn malformed_lines_report_position() {
        let err = parse_ini("[web]\nh1 novalue\n", "inv.ini").unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse inv.ini:2: expected key=value host variable assignment, found 'novalue'"
        );

        let err = parse_ini("[web:vars]\nflag\n", "inv.ini").unwrap_err();
        assert!(err.to_string().contains("inv.ini:2"));

        let err = parse_ini("[web:bogus]\n", "inv.ini").unwrap_err();
        assert!(err.to_string().contains("'bogus'"));
    }

    #[test]
    fn oversized_range_names_the_line() {
        let err = parse_ini("[web]\nweb1\nh[0:999999999]\n", "inv.ini").unwrap_err();
        assert_eq!(err.kind(), "parse_error");
        assert!(err.to_string().starts_with("failed to parse inv.ini:3: host range"), "{}", err);
    }

    #[test]
    fn names_are_case_sensitive() {
        let fragment = parse_ini("[Web]\nHost1\n[web]\nhost1\n", "hosts").unwrap();
        assert_eq!(fragment.groups[0].name, "Web");
        assert_eq!(fragment.groups[1].name, "web");
        assert_eq!(fragment.hosts.len(), 2);
    }
}
