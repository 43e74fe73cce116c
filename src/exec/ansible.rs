//! `ansible` and `ansible-playbook` invocations and output parsing.

use super::{shell_quote, verbosity_flag};
use regex_lite::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::OnceLock;

/// Host patterns that run over the local connection unless told otherwise.
const LOCAL_PATTERNS: &[&str] = &["localhost", "127.0.0.1"];

/// An ad-hoc module run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdhocRequest {
    pub pattern: String,
    pub module: String,
    /// A mapping renders as `key=value` pairs; a string is passed verbatim.
    pub args: Option<Value>,
    pub inventory: Vec<String>,
    pub connection: Option<String>,
    /// `--become`.
    pub escalate: bool,
    pub become_user: Option<String>,
    pub check: bool,
    pub diff: bool,
    pub verbose: Option<u64>,
}

impl AdhocRequest {
    pub fn new(pattern: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            module: module.into(),
            ..Default::default()
        }
    }

    /// Arguments following the `ansible` executable.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.pattern.clone(), "-m".to_string(), self.module.clone()];
        if let Some(module_args) = &self.args {
            args.push("-a".to_string());
            args.push(module_args_string(module_args));
        }
        push_inventory(&mut args, &self.inventory);
        let connection = self.connection.clone().or_else(|| {
            LOCAL_PATTERNS
                .contains(&self.pattern.as_str())
                .then(|| "local".to_string())
        });
        if let Some(connection) = connection {
            args.push("-c".to_string());
            args.push(connection);
        }
        if self.escalate {
            args.push("--become".to_string());
        }
        if let Some(user) = &self.become_user {
            args.push("--become-user".to_string());
            args.push(user.clone());
        }
        push_run_flags(&mut args, self.check, self.diff, self.verbose);
        args
    }
}

/// A playbook run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybookRequest {
    pub playbook: String,
    pub inventory: Vec<String>,
    pub extra_vars: Option<Value>,
    pub tags: Vec<String>,
    pub skip_tags: Vec<String>,
    pub limit: Option<String>,
    pub check: bool,
    pub diff: bool,
    pub verbose: Option<u64>,
}

impl PlaybookRequest {
    pub fn new(playbook: impl Into<String>) -> Self {
        Self {
            playbook: playbook.into(),
            ..Default::default()
        }
    }

    /// Arguments following the `ansible-playbook` executable.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.playbook.clone()];
        push_inventory(&mut args, &self.inventory);
        if let Some(extra) = self.extra_vars.as_ref().filter(|v| !is_empty_value(v)) {
            args.push("--extra-vars".to_string());
            args.push(extra.to_string());
        }
        if !self.tags.is_empty() {
            args.push("--tags".to_string());
            args.push(self.tags.join(","));
        }
        if !self.skip_tags.is_empty() {
            args.push("--skip-tags".to_string());
            args.push(self.skip_tags.join(","));
        }
        if let Some(limit) = &self.limit {
            args.push("--limit".to_string());
            args.push(limit.clone());
        }
        push_run_flags(&mut args, self.check, self.diff, self.verbose);
        args
    }
}

/// Arguments for `ansible-playbook --syntax-check`.
pub fn syntax_check_args(playbook: &str, inventory: &[String]) -> Vec<String> {
    let mut args = vec!["--syntax-check".to_string(), playbook.to_string()];
    push_inventory(&mut args, inventory);
    args
}

fn push_inventory(args: &mut Vec<String>, inventory: &[String]) {
    for source in inventory {
        args.push("-i".to_string());
        args.push(source.clone());
    }
}

fn push_run_flags(args: &mut Vec<String>, check: bool, diff: bool, verbose: Option<u64>) {
    if check {
        args.push("--check".to_string());
    }
    if diff {
        args.push("--diff".to_string());
    }
    if let Some(flag) = verbosity_flag(verbose) {
        args.push(flag);
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Render module arguments. Mappings become space-separated `key=value`
/// pairs: nested values as quoted JSON, booleans as `yes`/`no`, null as an
/// empty value, everything else shell-quoted.
pub fn module_args_string(args: &Value) -> String {
    match args {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value {
                Value::Object(_) | Value::Array(_) => {
                    format!("{}={}", key, shell_quote(&value.to_string()))
                }
                Value::Bool(b) => format!("{}={}", key, if *b { "yes" } else { "no" }),
                Value::Null => format!("{}=", key),
                Value::String(s) => format!("{}={}", key, shell_quote(s)),
                other => format!("{}={}", key, shell_quote(&other.to_string())),
            })
            .collect::<Vec<_>>()
            .join(" "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Single-play playbook applying one role.
pub fn role_playbook(role: &str, hosts: &str, vars: Option<&Value>) -> Value {
    let mut entry = json!({ "role": role });
    if let Some(vars) = vars.filter(|v| !is_empty_value(v)) {
        entry["vars"] = vars.clone();
    }
    json!([{
        "hosts": hosts,
        "gather_facts": false,
        "roles": [entry],
    }])
}

/// Write `playbook` to a temporary `.yml` file that lives as long as the
/// returned handle.
pub fn write_temp_playbook(playbook: &Value) -> std::io::Result<tempfile::NamedTempFile> {
    let yaml = serde_yaml::to_string(playbook).map_err(std::io::Error::other)?;
    let mut file = tempfile::Builder::new()
        .prefix("ansible-mcp-")
        .suffix(".yml")
        .tempfile()?;
    file.write_all(yaml.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Outcome for one host of an ad-hoc run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostResult {
    pub host: String,
    /// `success`, `changed`, `failed` or `unreachable`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    /// Module result, for `host | STATUS => {...}` lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Raw command output, for `host | STATUS | rc=N >>` lines.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

fn adhoc_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\S+) \| ([A-Z]+)!?(?: \| rc=(-?\d+))? (=>|>>)\s*(.*)$")
            .expect("static ad-hoc header pattern")
    })
}

/// Split ad-hoc output into per-host results. Lines before the first
/// header (warnings and the like) are ignored.
pub fn parse_adhoc_output(stdout: &str) -> Vec<HostResult> {
    let mut results = Vec::new();
    let mut current: Option<(HostResult, bool, Vec<String>)> = None;

    for line in stdout.lines() {
        if let Some(caps) = adhoc_header().captures(line) {
            if let Some(open) = current.take() {
                results.push(finish_block(open));
            }
            let result = HostResult {
                host: caps[1].to_string(),
                status: caps[2].to_ascii_lowercase(),
                rc: caps.get(3).and_then(|m| m.as_str().parse().ok()),
                data: None,
                output: None,
            };
            let is_json = &caps[4] == "=>";
            let rest = caps[5].to_string();
            let body = if rest.is_empty() { Vec::new() } else { vec![rest] };
            current = Some((result, is_json, body));
        } else if let Some((_, _, body)) = current.as_mut() {
            body.push(line.to_string());
        }
    }
    if let Some(open) = current.take() {
        results.push(finish_block(open));
    }
    results
}

fn finish_block((mut result, is_json, body): (HostResult, bool, Vec<String>)) -> HostResult {
    let text = body.join("\n");
    let text = text.trim_end();
    if is_json {
        match serde_json::from_str::<Value>(text) {
            Ok(data) => {
                if result.rc.is_none() {
                    result.rc = data.get("rc").and_then(Value::as_i64).map(|rc| rc as i32);
                }
                result.data = Some(data);
            }
            Err(_) => result.output = Some(text.to_string()),
        }
    } else {
        result.output = Some(text.to_string());
    }
    result
}

/// Per-host counters from a `PLAY RECAP` block.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RecapCounts {
    pub ok: u32,
    pub changed: u32,
    pub unreachable: u32,
    pub failed: u32,
    pub skipped: u32,
    pub rescued: u32,
    pub ignored: u32,
}

fn recap_counter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w+)=(\d+)").expect("static recap counter pattern"))
}

/// Parse the last `PLAY RECAP` block of playbook output.
pub fn parse_recap(stdout: &str) -> BTreeMap<String, RecapCounts> {
    let mut recap = BTreeMap::new();
    let mut in_recap = false;
    for line in stdout.lines() {
        if line.starts_with("PLAY RECAP") {
            in_recap = true;
            recap.clear();
            continue;
        }
        if !in_recap {
            continue;
        }
        let Some((host, counters)) = line.split_once(" : ").or_else(|| line.split_once(':')) else {
            if line.trim().is_empty() {
                in_recap = false;
            }
            continue;
        };
        let host = host.trim();
        if host.is_empty() || host.contains(char::is_whitespace) {
            in_recap = false;
            continue;
        }
        let mut counts = RecapCounts::default();
        for caps in recap_counter().captures_iter(counters) {
            let value: u32 = caps[2].parse().unwrap_or(0);
            match &caps[1] {
                "ok" => counts.ok = value,
                "changed" => counts.changed = value,
                "unreachable" => counts.unreachable = value,
                "failed" => counts.failed = value,
                "skipped" => counts.skipped = value,
                "rescued" => counts.rescued = value,
                "ignored" => counts.ignored = value,
                _ => {}
            }
        }
        recap.insert(host.to_string(), counts);
    }
    recap
}

/// Comparison of two consecutive runs of the same playbook.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IdempotenceReport {
    pub idempotent: bool,
    /// Hosts that still reported changes on the second run.
    pub changed_hosts: Vec<String>,
    pub first_run: BTreeMap<String, RecapCounts>,
    pub second_run: BTreeMap<String, RecapCounts>,
}

impl IdempotenceReport {
    pub fn from_runs(first_stdout: &str, second_stdout: &str) -> Self {
        let first_run = parse_recap(first_stdout);
        let second_run = parse_recap(second_stdout);
        let changed_hosts: Vec<String> = second_run
            .iter()
            .filter(|(_, counts)| counts.changed > 0)
            .map(|(host, _)| host.clone())
            .collect();
        Self {
            idempotent: changed_hosts.is_empty() && !second_run.is_empty(),
            changed_hosts,
            first_run,
            second_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adhoc_args_default_local_connection() {
        let mut req = AdhocRequest::new("localhost", "ping");
        req.inventory = vec!["localhost,".to_string()];
        assert_eq!(
            req.to_args(),
            vec!["localhost", "-m", "ping", "-i", "localhost,", "-c", "local"]
        );

        let mut req = AdhocRequest::new("web", "shell");
        req.args = Some(json!("uptime"));
        req.escalate = true;
        req.become_user = Some("deploy".into());
        req.check = true;
        req.verbose = Some(7);
        assert_eq!(
            req.to_args(),
            vec![
                "web", "-m", "shell", "-a", "uptime", "--become", "--become-user", "deploy",
                "--check", "-vvvv"
            ]
        );
    }

    #[test]
    fn module_args_rendering() {
        let rendered = module_args_string(&json!({
            "name": "nginx",
            "state": "present",
            "update_cache": true,
            "opts": {"a": 1},
            "empty": null,
            "msg": "hello world"
        }));
        let mut pairs: Vec<&str> = rendered.split(' ').collect();
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                "empty=",
                "msg='hello",
                "name=nginx",
                r#"opts='{"a":1}'"#,
                "state=present",
                "update_cache=yes",
                "world'",
            ]
        );
    }

    #[test]
    fn playbook_args() {
        let mut req = PlaybookRequest::new("site.yml");
        req.inventory = vec!["inv/prod".into()];
        req.extra_vars = Some(json!({"version": "1.2"}));
        req.tags = vec!["web".into(), "db".into()];
        req.skip_tags = vec!["slow".into()];
        req.limit = Some("web01".into());
        req.diff = true;
        assert_eq!(
            req.to_args(),
            vec![
                "site.yml", "-i", "inv/prod", "--extra-vars", r#"{"version":"1.2"}"#, "--tags",
                "web,db", "--skip-tags", "slow", "--limit", "web01", "--diff"
            ]
        );
        assert_eq!(
            syntax_check_args("site.yml", &[]),
            vec!["--syntax-check", "site.yml"]
        );
    }

    #[test]
    fn role_playbook_shape() {
        let play = role_playbook("nginx", "web", Some(&json!({"port": 80})));
        assert_eq!(
            play,
            json!([{"hosts": "web", "gather_facts": false, "roles": [{"role": "nginx", "vars": {"port": 80}}]}])
        );
        let play = role_playbook("nginx", "all", Some(&json!({})));
        assert_eq!(play[0]["roles"][0], json!({"role": "nginx"}));

        let file = write_temp_playbook(&play).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("gather_facts: false"));
    }

    #[test]
    fn adhoc_output_parsing() {
        let stdout = r#"[WARNING]: something
web01 | SUCCESS => {
    "changed": false,
    "ping": "pong"
}
web02 | UNREACHABLE! => {
    "changed": false,
    "msg": "timed out",
    "unreachable": true
}
db01 | CHANGED | rc=0 >>
 10:00:01 up 3 days
db02 | FAILED | rc=2 >>
ls: cannot access
"#;
        let results = parse_adhoc_output(stdout);
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].host, "web01");
        assert_eq!(results[0].status, "success");
        assert_eq!(results[0].data.as_ref().unwrap()["ping"], "pong");
        assert_eq!(results[1].status, "unreachable");
        assert_eq!(results[2].status, "changed");
        assert_eq!(results[2].rc, Some(0));
        assert_eq!(results[2].output.as_deref(), Some(" 10:00:01 up 3 days"));
        assert_eq!(results[3].status, "failed");
        assert_eq!(results[3].rc, Some(2));
    }

    const RUN: &str = "
PLAY [all] *********************************************************************

TASK [ping] ********************************************************************
ok: [web01]

PLAY RECAP *********************************************************************
web01                      : ok=2    changed=1    unreachable=0    failed=0    skipped=1    rescued=0    ignored=0
db01                       : ok=1    changed=0    unreachable=1    failed=0    skipped=0    rescued=0    ignored=0

";

    #[test]
    fn recap_parsing() {
        let recap = parse_recap(RUN);
        assert_eq!(recap.len(), 2);
        assert_eq!(recap["web01"].changed, 1);
        assert_eq!(recap["web01"].skipped, 1);
        assert_eq!(recap["db01"].unreachable, 1);
        assert!(parse_recap("no recap here").is_empty());
    }

    #[test]
    fn idempotence_from_two_runs() {
        let second = RUN.replace("changed=1", "changed=0");
        let report = IdempotenceReport::from_runs(RUN, &second);
        assert!(report.idempotent);
        assert_eq!(report.first_run["web01"].changed, 1);

        let report = IdempotenceReport::from_runs(RUN, RUN);
        assert!(!report.idempotent);
        assert_eq!(report.changed_hosts, vec!["web01"]);
    }
}
