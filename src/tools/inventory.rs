//! Inventory query tools: list, graph, host, diff.
//!
//! Every call resolves a fresh graph. Sources come from `inventory`, else
//! the project's inventory, else the `inventory` setting of the effective
//! `ansible.cfg`.

use super::{ToolHandler, get_bool, get_string, get_string_list, make_tool, require_string, with_scope};
use crate::error::{ToolError, ToolResult};
use crate::format::{
    OutputFormat, ToolOutput, format_diff_markdown, format_host_markdown, format_listing_markdown,
};
use crate::inventory::{ConfigLookup, Resolution, ResolveRequest, SourceFailureReport};
use rmcp::model::{Tool, ToolAnnotations};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::debug;

pub fn get_tools() -> Vec<Tool> {
    let mut tools = vec![
        make_tool(
            "inventory_list",
            "Resolve the inventory and list all hosts, and per group its direct hosts and \
             child groups. Resolution follows Ansible's precedence: group vars by depth, \
             group_vars/ files, host vars, host_vars/ files.",
            with_scope(source_properties(json!({
                "include_vars": {
                    "type": "boolean",
                    "description": "Include each host's effective variables"
                }
            }))),
            vec![],
        ),
        make_tool(
            "inventory_graph",
            "Render the resolved inventory as an ansible-inventory --graph style tree.",
            with_scope(source_properties(json!({
                "group": {
                    "type": "string",
                    "description": "Group to start from (default: all)"
                },
                "include_vars": {
                    "type": "boolean",
                    "description": "Show each host's variables under it"
                }
            }))),
            vec![],
        ),
        make_tool(
            "inventory_host",
            "Show one host: every group it belongs to, its direct groups and its effective \
             variables, optionally with the origin of each variable.",
            with_scope(source_properties(json!({
                "host": {
                    "type": "string",
                    "description": "Host name (case-sensitive)"
                },
                "provenance": {
                    "type": "boolean",
                    "description": "Report which overlay set each variable"
                }
            }))),
            vec!["host"],
        ),
        make_tool(
            "inventory_diff",
            "Compare two inventories structurally: hosts and groups present on only one \
             side, and group membership changes for hosts present on both.",
            with_scope(source_properties(json!({
                "left": {
                    "oneOf": [
                        { "type": "string" },
                        { "type": "array", "items": { "type": "string" } }
                    ],
                    "description": "Left inventory source(s)"
                },
                "right": {
                    "oneOf": [
                        { "type": "string" },
                        { "type": "array", "items": { "type": "string" } }
                    ],
                    "description": "Right inventory source(s)"
                }
            }))),
            vec!["left", "right"],
        ),
    ];

    for tool in &mut tools {
        tool.annotations = Some(ToolAnnotations {
            title: None,
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
        });
    }
    tools
}

/// Properties shared by the inventory tools, plus `extra`.
fn source_properties(extra: Value) -> Value {
    let mut props = json!({
        "inventory": {
            "oneOf": [
                { "type": "string" },
                { "type": "array", "items": { "type": "string" } }
            ],
            "description": "Inventory file, directory or comma-separated host list; several sources merge in order"
        },
        "config": {
            "type": "string",
            "description": "Explicit ansible.cfg path"
        },
        "playbook_dir": {
            "type": "string",
            "description": "Extra directory searched for group_vars/ and host_vars/"
        },
        "continue_on_error": {
            "type": "boolean",
            "description": "Resolve from the sources that loaded when some fail"
        },
        "format": {
            "type": "string",
            "enum": ["json", "markdown"],
            "description": "Output format (default: json)"
        }
    });
    if let (Value::Object(map), Value::Object(more)) = (&mut props, extra) {
        map.extend(more);
    }
    props
}

/// Resolve `sources`, or the default sources for the call's scope when
/// empty.
fn resolve(handler: &ToolHandler, args: &Value, sources: Vec<String>) -> ToolResult<Resolution> {
    let scope = handler.scope(args)?;
    let root = scope.cwd.clone().or_else(|| std::env::current_dir().ok());
    let explicit_cfg = get_string(args, "config").map(PathBuf::from);

    let ansible_cfg = ConfigLookup {
        explicit: explicit_cfg.as_deref(),
        env: Some(&scope.env),
        project_root: root.as_deref(),
    }
    .resolve()?;

    let sources = if !sources.is_empty() {
        sources
    } else if let Some(inventory) = scope.project.as_ref().and_then(|p| p.inventory.clone()) {
        vec![inventory]
    } else if !ansible_cfg.inventory.is_empty() {
        ansible_cfg.inventory.clone()
    } else {
        return Err(ToolError::missing_field("inventory").with_details(
            "no inventory given, and neither the project nor ansible.cfg names one",
        ));
    };
    debug!(sources = ?sources, "Resolving inventory");

    let request = ResolveRequest {
        sources,
        base_dir: root,
        companion_dirs: get_string(args, "playbook_dir")
            .map(PathBuf::from)
            .into_iter()
            .collect(),
        hash_behaviour: ansible_cfg
            .hash_behaviour
            .unwrap_or(handler.config.inventory.hash_behaviour),
        continue_on_error: get_bool(args, "continue_on_error")
            .unwrap_or(handler.config.inventory.continue_on_error),
    };
    Ok(request.resolve()?)
}

fn resolve_default(handler: &ToolHandler, args: &Value) -> ToolResult<Resolution> {
    resolve(handler, args, get_string_list(args, "inventory")?)
}

/// JSON output with `skipped_sources` when some sources failed, or
/// markdown with a trailing note.
fn render<T: Serialize>(
    format: OutputFormat,
    body: &T,
    markdown: impl FnOnce(&T) -> String,
    skipped: &[SourceFailureReport],
) -> ToolResult<ToolOutput> {
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(body).map_err(ToolError::internal)?;
            if !skipped.is_empty()
                && let Value::Object(map) = &mut value
            {
                map.insert(
                    "skipped_sources".to_string(),
                    serde_json::to_value(skipped).map_err(ToolError::internal)?,
                );
            }
            Ok(ToolOutput::Json(value))
        }
        OutputFormat::Markdown => {
            let mut md = markdown(body);
            if !skipped.is_empty() {
                md.push_str("\n## Skipped sources\n");
                for failure in skipped {
                    md.push_str(&format!("- {} ({}): {}\n", failure.source, failure.kind, failure.message));
                }
            }
            Ok(ToolOutput::Raw(md))
        }
    }
}

fn reports(resolution: &Resolution) -> Vec<SourceFailureReport> {
    resolution.failures.iter().map(SourceFailureReport::from).collect()
}

pub fn inventory_list(handler: &ToolHandler, args: &Value) -> ToolResult<ToolOutput> {
    let format = handler.output_format(args)?;
    let resolution = resolve_default(handler, args)?;
    let listing = resolution
        .graph
        .list(get_bool(args, "include_vars").unwrap_or(false));
    render(format, &listing, format_listing_markdown, &reports(&resolution))
}

pub fn inventory_graph(handler: &ToolHandler, args: &Value) -> ToolResult<ToolOutput> {
    let format = handler.output_format(args)?;
    let resolution = resolve_default(handler, args)?;
    let group = get_string(args, "group");
    let tree = resolution.graph.render_tree(
        group.as_deref(),
        get_bool(args, "include_vars").unwrap_or(false),
    )?;
    let body = json!({ "tree": tree });
    render(
        format,
        &body,
        |_| format!("```\n{}\n```\n", tree),
        &reports(&resolution),
    )
}

pub fn inventory_host(handler: &ToolHandler, args: &Value) -> ToolResult<ToolOutput> {
    let format = handler.output_format(args)?;
    let name = require_string(args, "host")?;
    let resolution = resolve_default(handler, args)?;
    let provenance = get_bool(args, "provenance").unwrap_or(false);
    let view = resolution.graph.find_host(&name, provenance)?;
    if provenance {
        resolution.graph.log_provenance(&name)?;
    }
    render(format, &view, format_host_markdown, &reports(&resolution))
}

pub fn inventory_diff(handler: &ToolHandler, args: &Value) -> ToolResult<ToolOutput> {
    let format = handler.output_format(args)?;
    let left_sources = get_string_list(args, "left")?;
    let right_sources = get_string_list(args, "right")?;
    if left_sources.is_empty() {
        return Err(ToolError::missing_field("left"));
    }
    if right_sources.is_empty() {
        return Err(ToolError::missing_field("right"));
    }

    let left = resolve(handler, args, left_sources)?;
    let right = resolve(handler, args, right_sources)?;
    let diff = left.graph.diff(&right.graph);

    let mut skipped = reports(&left);
    skipped.extend(reports(&right));
    render(format, &diff, format_diff_markdown, &skipped)
}
