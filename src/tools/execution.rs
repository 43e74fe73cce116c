//! Tools that run `ansible` and `ansible-playbook`.

use super::{
    Scope, ToolContext, ToolHandler, get_bool, get_object, get_string, get_string_list, get_u64,
    make_tool, require_string, with_scope,
};
use crate::error::{ToolError, ToolResult};
use crate::exec::ansible::{
    AdhocRequest, IdempotenceReport, PlaybookRequest, parse_adhoc_output, parse_recap,
    role_playbook, syntax_check_args, write_temp_playbook,
};
use crate::exec::{ExecOutcome, execute, run_captured};
use crate::format::ToolOutput;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "ansible_task",
            "Run an ad-hoc Ansible module against a host pattern. Targeting localhost or \
             127.0.0.1 uses the local connection unless one is given. Returns captured output \
             and per-host results.",
            with_scope(adhoc_properties(json!({
                "host_pattern": {
                    "type": "string",
                    "description": "Host pattern, e.g. all, web, db1:db2"
                },
                "module": {
                    "type": "string",
                    "description": "Module name, e.g. command, copy, ansible.builtin.service"
                },
                "args": {
                    "oneOf": [{ "type": "object" }, { "type": "string" }],
                    "description": "Module arguments: an object rendered as key=value pairs, or a raw string"
                }
            }))),
            vec!["host_pattern", "module"],
        ),
        make_tool(
            "ansible_ping",
            "Check connectivity with the ping module.",
            with_scope(adhoc_properties(json!({
                "host_pattern": {
                    "type": "string",
                    "description": "Host pattern (default: all)"
                }
            }))),
            vec![],
        ),
        make_tool(
            "gather_facts",
            "Collect facts with the setup module.",
            with_scope(adhoc_properties(json!({
                "host_pattern": {
                    "type": "string",
                    "description": "Host pattern (default: all)"
                },
                "filter": {
                    "type": "string",
                    "description": "Fact filter, e.g. ansible_distribution*"
                }
            }))),
            vec![],
        ),
        make_tool(
            "ansible_playbook",
            "Run a playbook. Returns captured output and the parsed PLAY RECAP counters per host.",
            with_scope(playbook_properties(json!({
                "playbook_path": {
                    "type": "string",
                    "description": "Path to the playbook file"
                },
                "check": { "type": "boolean", "description": "Check mode" },
                "diff": { "type": "boolean", "description": "Show diffs" },
                "verbose": { "type": "integer", "minimum": 0, "maximum": 4, "description": "Verbosity 1-4" }
            }))),
            vec!["playbook_path"],
        ),
        make_tool(
            "ansible_role",
            "Run one role by generating a temporary single-play playbook.",
            with_scope(json!({
                "role_name": { "type": "string", "description": "Role to apply" },
                "hosts": { "type": "string", "description": "Host pattern (default: all)" },
                "inventory": inventory_schema(),
                "vars": { "type": "object", "description": "Role variables" },
                "check": { "type": "boolean", "description": "Check mode" },
                "diff": { "type": "boolean", "description": "Show diffs" },
                "verbose": { "type": "integer", "minimum": 0, "maximum": 4, "description": "Verbosity 1-4" }
            })),
            vec!["role_name"],
        ),
        make_tool(
            "validate_playbook",
            "Check playbook syntax with ansible-playbook --syntax-check. Reports valid=false \
             with the checker's output instead of failing.",
            with_scope(json!({
                "playbook_path": { "type": "string", "description": "Path to the playbook file" },
                "inventory": inventory_schema()
            })),
            vec!["playbook_path"],
        ),
        make_tool(
            "playbook_idempotence",
            "Run a playbook twice and report whether the second run changed anything.",
            with_scope(playbook_properties(json!({
                "playbook_path": {
                    "type": "string",
                    "description": "Path to the playbook file"
                }
            }))),
            vec!["playbook_path"],
        ),
    ]
}

fn inventory_schema() -> Value {
    json!({
        "oneOf": [
            { "type": "string" },
            { "type": "array", "items": { "type": "string" } }
        ],
        "description": "Inventory path(s) or host list (default: project inventory)"
    })
}

fn adhoc_properties(extra: Value) -> Value {
    let mut props = json!({
        "inventory": inventory_schema(),
        "become": { "type": "boolean", "description": "Escalate privileges" },
        "become_user": { "type": "string", "description": "User to become" },
        "connection": { "type": "string", "description": "Connection type, e.g. ssh, local" },
        "check": { "type": "boolean", "description": "Check mode" },
        "diff": { "type": "boolean", "description": "Show diffs" },
        "verbose": { "type": "integer", "minimum": 0, "maximum": 4, "description": "Verbosity 1-4" }
    });
    merge_props(&mut props, extra);
    props
}

fn playbook_properties(extra: Value) -> Value {
    let mut props = json!({
        "inventory": inventory_schema(),
        "extra_vars": { "type": "object", "description": "Passed as --extra-vars JSON" },
        "tags": { "type": "array", "items": { "type": "string" }, "description": "Tags to run" },
        "skip_tags": { "type": "array", "items": { "type": "string" }, "description": "Tags to skip" },
        "limit": { "type": "string", "description": "Host limit pattern" }
    });
    merge_props(&mut props, extra);
    props
}

fn merge_props(props: &mut Value, extra: Value) {
    if let (Value::Object(map), Value::Object(more)) = (props, extra) {
        map.extend(more);
    }
}

fn outcome_json(outcome: &ExecOutcome) -> Value {
    json!({
        "ok": outcome.ok,
        "rc": outcome.rc,
        "command": outcome.command,
        "stdout": outcome.stdout,
        "stderr": outcome.stderr,
    })
}

/// Build the ad-hoc request shared by task, ping and facts.
fn adhoc_request(
    handler: &ToolHandler,
    args: &Value,
    scope: &Scope,
    pattern: String,
    module: String,
) -> ToolResult<AdhocRequest> {
    let mut req = AdhocRequest::new(pattern, module);
    req.inventory = handler.inventory_args(args, scope)?;
    req.connection = get_string(args, "connection");
    req.escalate = get_bool(args, "become").unwrap_or(false);
    req.become_user = get_string(args, "become_user");
    req.check = get_bool(args, "check").unwrap_or(false);
    req.diff = get_bool(args, "diff").unwrap_or(false);
    req.verbose = get_u64(args, "verbose");
    Ok(req)
}

async fn run_adhoc(
    handler: &ToolHandler,
    scope: &Scope,
    req: &AdhocRequest,
    ctx: &ToolContext,
) -> ToolResult<ToolOutput> {
    let spec = scope.command(&handler.config.exec.ansible).args(req.to_args());
    ctx.logger.info(&format!("Running {}", spec.display()));
    let outcome = execute(handler.runner.as_ref(), &spec).await?;
    let mut body = outcome_json(&outcome);
    body["hosts"] = serde_json::to_value(parse_adhoc_output(&outcome.stdout))
        .map_err(ToolError::internal)?;
    Ok(ToolOutput::Json(body))
}

pub async fn ansible_task(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let pattern = require_string(args, "host_pattern")?;
    let module = require_string(args, "module")?;
    let scope = handler.scope(args)?;
    let mut req = adhoc_request(handler, args, &scope, pattern, module)?;
    req.args = match args.get("args") {
        None | Some(Value::Null) => None,
        Some(v @ (Value::Object(_) | Value::String(_))) => Some(v.clone()),
        Some(_) => return Err(ToolError::invalid_value("args", "expected an object or string")),
    };
    run_adhoc(handler, &scope, &req, ctx).await
}

pub async fn ansible_ping(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let pattern = get_string(args, "host_pattern").unwrap_or_else(|| "all".to_string());
    let scope = handler.scope(args)?;
    let req = adhoc_request(handler, args, &scope, pattern, "ping".to_string())?;
    run_adhoc(handler, &scope, &req, ctx).await
}

pub async fn gather_facts(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let pattern = get_string(args, "host_pattern").unwrap_or_else(|| "all".to_string());
    let scope = handler.scope(args)?;
    let mut req = adhoc_request(handler, args, &scope, pattern, "setup".to_string())?;
    req.args = get_string(args, "filter").map(|filter| json!({ "filter": filter }));
    run_adhoc(handler, &scope, &req, ctx).await
}

/// Playbook request from the common playbook arguments.
pub(crate) fn playbook_request(
    handler: &ToolHandler,
    args: &Value,
    scope: &Scope,
    playbook: String,
) -> ToolResult<PlaybookRequest> {
    let mut req = PlaybookRequest::new(playbook);
    req.inventory = handler.inventory_args(args, scope)?;
    req.extra_vars = get_object(args, "extra_vars")?;
    req.tags = get_string_list(args, "tags")?;
    req.skip_tags = get_string_list(args, "skip_tags")?;
    req.limit = get_string(args, "limit");
    req.check = get_bool(args, "check").unwrap_or(false);
    req.diff = get_bool(args, "diff").unwrap_or(false);
    req.verbose = get_u64(args, "verbose");
    Ok(req)
}

async fn run_playbook_outcome(
    handler: &ToolHandler,
    scope: &Scope,
    req: &PlaybookRequest,
    ctx: &ToolContext,
) -> ToolResult<ExecOutcome> {
    let spec = scope
        .command(&handler.config.exec.ansible_playbook)
        .args(req.to_args());
    ctx.logger.info(&format!("Running {}", spec.display()));
    execute(handler.runner.as_ref(), &spec).await
}

/// Run a playbook and report its output and recap.
pub(crate) async fn run_playbook(
    handler: &ToolHandler,
    scope: &Scope,
    req: &PlaybookRequest,
    ctx: &ToolContext,
) -> ToolResult<ToolOutput> {
    let outcome = run_playbook_outcome(handler, scope, req, ctx).await?;
    let mut body = outcome_json(&outcome);
    body["recap"] = serde_json::to_value(parse_recap(&outcome.stdout)).map_err(ToolError::internal)?;
    Ok(ToolOutput::Json(body))
}

pub async fn ansible_playbook(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let playbook = require_string(args, "playbook_path")?;
    let scope = handler.scope(args)?;
    let req = playbook_request(handler, args, &scope, playbook)?;
    run_playbook(handler, &scope, &req, ctx).await
}

pub async fn ansible_role(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let role = require_string(args, "role_name")?;
    let hosts = get_string(args, "hosts").unwrap_or_else(|| "all".to_string());
    let vars = get_object(args, "vars")?;
    let scope = handler.scope(args)?;

    let playbook = role_playbook(&role, &hosts, vars.as_ref());
    // Removed when dropped, after the run completes.
    let temp = write_temp_playbook(&playbook).map_err(ToolError::internal)?;
    let mut req = PlaybookRequest::new(temp.path().display().to_string());
    req.inventory = handler.inventory_args(args, &scope)?;
    req.check = get_bool(args, "check").unwrap_or(false);
    req.diff = get_bool(args, "diff").unwrap_or(false);
    req.verbose = get_u64(args, "verbose");

    run_playbook(handler, &scope, &req, ctx).await
}

pub async fn validate_playbook(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let playbook = require_string(args, "playbook_path")?;
    let scope = handler.scope(args)?;
    let inventory = handler.inventory_args(args, &scope)?;
    let spec = scope
        .command(&handler.config.exec.ansible_playbook)
        .args(syntax_check_args(&playbook, &inventory));
    ctx.logger.debug(&format!("Running {}", spec.display()));
    let outcome = run_captured(handler.runner.as_ref(), &spec).await?;
    let mut body = outcome_json(&outcome);
    body["valid"] = json!(outcome.ok);
    Ok(ToolOutput::Json(body))
}

pub async fn playbook_idempotence(
    handler: &ToolHandler,
    args: &Value,
    ctx: &ToolContext,
) -> ToolResult<ToolOutput> {
    let playbook = require_string(args, "playbook_path")?;
    let scope = handler.scope(args)?;
    let req = playbook_request(handler, args, &scope, playbook)?;

    let first = run_playbook_outcome(handler, &scope, &req, ctx).await?;
    ctx.logger.info("First run finished; running again to check idempotence");
    let second = run_playbook_outcome(handler, &scope, &req, ctx).await?;

    let report = IdempotenceReport::from_runs(&first.stdout, &second.stdout);
    if !report.idempotent {
        ctx.logger.warning(&format!(
            "Second run changed hosts: {}",
            report.changed_hosts.join(", ")
        ));
    }
    let mut body = serde_json::to_value(&report).map_err(ToolError::internal)?;
    body["command"] = json!(second.command);
    body["second_stdout"] = json!(second.stdout);
    Ok(ToolOutput::Json(body))
}
