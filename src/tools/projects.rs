//! Project registry tools.

use super::execution::{playbook_request, run_playbook};
use super::{
    Scope, ToolContext, ToolHandler, get_bool, get_string, get_string_list, get_string_map,
    make_tool, require_string,
};
use crate::error::{ToolError, ToolResult};
use crate::format::ToolOutput;
use crate::projects::{ProjectDefinition, absolute_path, discover_playbooks};
use rmcp::model::Tool;
use serde_json::{Value, json};
use std::path::Path;

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "register_project",
            "Register an existing Ansible project: its root, default inventory, role and \
             collection search paths and extra environment. Paths are stored absolute.",
            json!({
                "name": { "type": "string", "description": "Unique project name" },
                "root": { "type": "string", "description": "Project root directory" },
                "inventory": { "type": "string", "description": "Default inventory file or directory" },
                "roles_paths": {
                    "type": "array", "items": { "type": "string" },
                    "description": "Exported as ANSIBLE_ROLES_PATH"
                },
                "collections_paths": {
                    "type": "array", "items": { "type": "string" },
                    "description": "Exported as ANSIBLE_COLLECTIONS_PATHS"
                },
                "env": {
                    "type": "object", "additionalProperties": { "type": "string" },
                    "description": "Extra environment variables for commands in this project"
                },
                "make_default": { "type": "boolean", "description": "Make this the default project" }
            }),
            vec!["name", "root"],
        ),
        make_tool(
            "list_projects",
            "List registered projects, the default project and the registry location.",
            json!({}),
            vec![],
        ),
        make_tool(
            "project_playbooks",
            "Find playbooks (YAML files whose top level is a list) under a project root.",
            json!({
                "project": { "type": "string", "description": "Project name (default: selected project)" }
            }),
            vec![],
        ),
        make_tool(
            "project_run_playbook",
            "Run a playbook inside a project: the project root is the working directory and its \
             inventory and environment apply.",
            json!({
                "playbook_path": { "type": "string", "description": "Playbook path, relative to the project root" },
                "project": { "type": "string", "description": "Project name (default: selected project)" },
                "extra_vars": { "type": "object", "description": "Passed as --extra-vars JSON" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "skip_tags": { "type": "array", "items": { "type": "string" } },
                "limit": { "type": "string", "description": "Host limit pattern" },
                "check": { "type": "boolean" },
                "diff": { "type": "boolean" },
                "verbose": { "type": "integer", "minimum": 0, "maximum": 4 }
            }),
            vec!["playbook_path"],
        ),
    ]
}

fn absolute_list(paths: Vec<String>) -> Option<Vec<String>> {
    let resolved: Vec<String> = paths.iter().map(|p| absolute_path(p)).collect();
    (!resolved.is_empty()).then_some(resolved)
}

pub fn register_project(handler: &ToolHandler, args: &Value) -> ToolResult<ToolOutput> {
    let name = require_string(args, "name")?;
    let root = require_string(args, "root")?;
    let env = get_string_map(args, "env")?;

    let project = ProjectDefinition {
        name: name.clone(),
        root: absolute_path(&root),
        inventory: get_string(args, "inventory").map(|i| absolute_path(&i)),
        roles_paths: absolute_list(get_string_list(args, "roles_paths")?),
        collections_paths: absolute_list(get_string_list(args, "collections_paths")?),
        env: (!env.is_empty()).then_some(env),
    };
    if !Path::new(&project.root).is_dir() {
        tracing::warn!(project = %name, root = %project.root, "Registered project root does not exist");
    }

    let registry = handler.registry();
    let file = registry.register(project, get_bool(args, "make_default").unwrap_or(false))?;
    Ok(ToolOutput::Json(json!({
        "path": registry.path().display().to_string(),
        "projects": file.projects.keys().collect::<Vec<_>>(),
        "default": file.defaults.project,
    })))
}

pub fn list_projects(handler: &ToolHandler) -> ToolResult<ToolOutput> {
    let registry = handler.registry();
    let file = registry.load()?;
    Ok(ToolOutput::Json(json!({
        "default": file.defaults.project,
        "projects": file.projects,
        "env_project": handler.environment.project,
        "config_path": registry.path().display().to_string(),
    })))
}

/// The selected project, which these tools cannot do without.
fn selected(scope: Scope, args: &Value) -> ToolResult<ProjectDefinition> {
    scope.project.ok_or_else(|| {
        let name = get_string(args, "project").unwrap_or_else(|| "(no default set)".to_string());
        ToolError::not_found("Project", &name)
    })
}

pub fn project_playbooks(handler: &ToolHandler, args: &Value) -> ToolResult<ToolOutput> {
    let project = selected(handler.scope(args)?, args)?;
    let root = project.root_path();
    if !root.is_dir() {
        return Err(ToolError::source_not_found(root.display()));
    }
    let playbooks: Vec<String> = discover_playbooks(&root)
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    Ok(ToolOutput::Json(json!({
        "project": project.name,
        "root": project.root,
        "playbooks": playbooks,
    })))
}

pub async fn project_run_playbook(
    handler: &ToolHandler,
    args: &Value,
    ctx: &ToolContext,
) -> ToolResult<ToolOutput> {
    let playbook = require_string(args, "playbook_path")?;
    let project = selected(handler.scope(args)?, args)?;
    let root = project.root_path();

    let scope = Scope {
        cwd: Some(root.clone()),
        env: project.env_vars(),
        project: Some(project),
    };
    let playbook_path = root.join(&playbook);
    let req = playbook_request(handler, args, &scope, playbook_path.display().to_string())?;
    run_playbook(handler, &scope, &req, ctx).await
}
