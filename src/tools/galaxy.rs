//! Dependency tools backed by `ansible-galaxy`.

use super::{Scope, ToolContext, ToolHandler, get_bool, get_string, make_tool, with_scope};
use crate::error::{CapturedOutput, ErrorCode, ToolError, ToolResult};
use crate::exec::galaxy::{
    ItemOutcome, ItemStatus, REQUIREMENTS_FILE, RequirementKind, classify_items, install_commands,
    read_requirements, scan_installed, write_lock,
};
use crate::exec::run_captured;
use crate::format::ToolOutput;
use rmcp::model::Tool;
use serde_json::{Value, json};
use std::path::PathBuf;

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "galaxy_install",
            "Install the roles and collections listed in requirements.yml under the project \
             root into roles/ and collections/. Reports an outcome per requirement.",
            with_scope(json!({
                "requirements": {
                    "type": "string",
                    "description": "Requirements file (default: <root>/requirements.yml)"
                },
                "force": { "type": "boolean", "description": "Reinstall even when present" }
            })),
            vec![],
        ),
        make_tool(
            "galaxy_lock",
            "Record the installed role and collection versions in requirements.lock.yml.",
            with_scope(json!({})),
            vec![],
        ),
    ]
}

/// Project root for dependency work: `cwd`, else the project root.
fn root_dir(scope: &Scope) -> ToolResult<PathBuf> {
    scope.cwd.clone().ok_or_else(|| {
        ToolError::missing_field("project")
            .with_details("select a project or pass cwd to locate requirements.yml")
    })
}

pub async fn galaxy_install(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let scope = handler.scope(args)?;
    let root = root_dir(&scope)?;
    let requirements_path = get_string(args, "requirements")
        .map(|p| root.join(p))
        .unwrap_or_else(|| root.join(REQUIREMENTS_FILE));
    let requirements = read_requirements(&requirements_path)?;
    if requirements.is_empty() {
        return Ok(ToolOutput::Json(json!({
            "ok": true,
            "requirements": requirements_path.display().to_string(),
            "items": [],
        })));
    }

    let commands = install_commands(
        &handler.config.exec.ansible_galaxy,
        &requirements_path,
        &root,
        &requirements,
        get_bool(args, "force").unwrap_or(false),
    );

    let mut items: Vec<ItemOutcome> = Vec::new();
    let mut failed: Option<CapturedOutput> = None;
    let mut commands_run = Vec::new();
    for (kind, spec) in commands {
        let spec = spec.envs(&scope.env);
        ctx.logger.info(&format!("Running {}", spec.display()));
        let outcome = run_captured(handler.runner.as_ref(), &spec).await?;
        let section = match kind {
            RequirementKind::Role => &requirements.roles,
            RequirementKind::Collection => &requirements.collections,
        };
        let combined = format!("{}\n{}", outcome.stdout, outcome.stderr);
        items.extend(classify_items(section, &combined, outcome.ok));
        commands_run.push(outcome.command.clone());
        if !outcome.ok && failed.is_none() {
            failed = Some(CapturedOutput {
                command: spec.argv(),
                rc: outcome.rc,
                stdout: outcome.stdout,
                stderr: outcome.stderr,
            });
        }
    }

    if let Some(output) = failed {
        let failed_names: Vec<&str> = items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .map(|i| i.name.as_str())
            .collect();
        let details = serde_json::to_string(&items).map_err(ToolError::internal)?;
        return Err(ToolError::new(
            ErrorCode::ExternalFailure,
            format!("ansible-galaxy install failed for: {}", failed_names.join(", ")),
        )
        .with_details(details)
        .with_output(output));
    }

    Ok(ToolOutput::Json(json!({
        "ok": true,
        "requirements": requirements_path.display().to_string(),
        "commands": commands_run,
        "items": items,
    })))
}

pub fn galaxy_lock(handler: &ToolHandler, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let scope = handler.scope(args)?;
    let root = root_dir(&scope)?;
    let lock = scan_installed(&root)?;
    let path = write_lock(&root, &lock)?;
    ctx.logger.info(&format!(
        "Locked {} roles and {} collections",
        lock.roles.len(),
        lock.collections.len()
    ));
    let mut body = serde_json::to_value(&lock).map_err(ToolError::internal)?;
    body["path"] = json!(path.display().to_string());
    Ok(ToolOutput::Json(body))
}
