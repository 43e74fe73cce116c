//! MCP tool implementations.

pub mod authoring;
pub mod context;
pub mod execution;
pub mod galaxy;
pub mod inventory;
pub mod projects;
pub mod vault;

pub use context::ToolContext;

use crate::config::{Config, Environment};
use crate::error::{ToolError, ToolResult};
use crate::exec::{CommandRunner, CommandSpec, ProcessRunner};
use crate::format::{OutputFormat, ToolOutput};
use crate::projects::{ProjectDefinition, ProjectRegistry, select_project};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Tool handler that processes MCP tool calls.
pub struct ToolHandler {
    pub config: Arc<Config>,
    pub environment: Arc<Environment>,
    pub runner: Arc<dyn CommandRunner>,
}

impl ToolHandler {
    pub fn new(config: Arc<Config>, environment: Arc<Environment>) -> Self {
        Self::with_runner(config, environment, Arc::new(ProcessRunner))
    }

    pub fn with_runner(
        config: Arc<Config>,
        environment: Arc<Environment>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            environment,
            runner,
        }
    }

    /// Get all available tools.
    pub fn get_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        tools.extend(inventory::get_tools());
        tools.extend(execution::get_tools());
        tools.extend(galaxy::get_tools());
        tools.extend(vault::get_tools());
        tools.extend(projects::get_tools());
        tools.extend(authoring::get_tools());
        tools
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let result = match name {
            // Inventory tools
            "inventory_list" => inventory::inventory_list(self, &args),
            "inventory_graph" => inventory::inventory_graph(self, &args),
            "inventory_host" => inventory::inventory_host(self, &args),
            "inventory_diff" => inventory::inventory_diff(self, &args),

            // Execution tools
            "ansible_task" => execution::ansible_task(self, &args, ctx).await,
            "ansible_ping" => execution::ansible_ping(self, &args, ctx).await,
            "gather_facts" => execution::gather_facts(self, &args, ctx).await,
            "ansible_playbook" => execution::ansible_playbook(self, &args, ctx).await,
            "ansible_role" => execution::ansible_role(self, &args, ctx).await,
            "validate_playbook" => execution::validate_playbook(self, &args, ctx).await,
            "playbook_idempotence" => execution::playbook_idempotence(self, &args, ctx).await,

            // Dependency tools
            "galaxy_install" => galaxy::galaxy_install(self, &args, ctx).await,
            "galaxy_lock" => galaxy::galaxy_lock(self, &args, ctx),

            // Vault tools
            "vault_encrypt" | "vault_decrypt" | "vault_view" | "vault_rekey" => {
                vault::run(self, name, &args, ctx).await
            }

            // Project tools
            "register_project" => projects::register_project(self, &args),
            "list_projects" => projects::list_projects(self),
            "project_playbooks" => projects::project_playbooks(self, &args),
            "project_run_playbook" => projects::project_run_playbook(self, &args, ctx).await,

            // Authoring tools
            "create_playbook" => authoring::create_playbook(&args),
            "create_role_structure" => authoring::create_role_structure(&args),
            "validate_yaml" => authoring::validate_yaml(&args),

            _ => Err(ToolError::unknown_tool(name)),
        };
        result.map_err(anyhow::Error::from)
    }

    /// Registry handle: `MCP_ANSIBLE_CONFIG`, then the configured path,
    /// then the standard locations.
    pub fn registry(&self) -> ProjectRegistry {
        let explicit = self
            .environment
            .registry_path
            .as_deref()
            .or(self.config.server.registry_path.as_deref());
        ProjectRegistry::new(ProjectRegistry::locate(explicit))
    }

    /// Working directory, environment and project for one call.
    ///
    /// The project comes from `project`, else the environment-declared
    /// project, else the registry default. `cwd` overrides the project root
    /// and `env` is layered over the project's environment.
    pub fn scope(&self, args: &Value) -> ToolResult<Scope> {
        let explicit = get_string(args, "project");
        let project = if explicit.is_none() && self.environment.project.is_some() {
            self.environment.project.clone()
        } else {
            let file = self.registry().load()?;
            select_project(&file, explicit.as_deref(), self.environment.project.as_ref())?
        };

        let mut env = project
            .as_ref()
            .map(ProjectDefinition::env_vars)
            .unwrap_or_default();
        env.extend(get_string_map(args, "env")?);

        let cwd = get_string(args, "cwd")
            .map(PathBuf::from)
            .or_else(|| project.as_ref().map(ProjectDefinition::root_path));

        Ok(Scope { project, cwd, env })
    }

    /// `inventory` from the arguments, else the project's inventory.
    pub fn inventory_args(&self, args: &Value, scope: &Scope) -> ToolResult<Vec<String>> {
        let explicit = get_string_list(args, "inventory")?;
        if !explicit.is_empty() {
            return Ok(explicit);
        }
        Ok(scope
            .project
            .as_ref()
            .and_then(|p| p.inventory.clone())
            .into_iter()
            .collect())
    }

    pub fn output_format(&self, args: &Value) -> ToolResult<OutputFormat> {
        match get_string(args, "format") {
            Some(raw) => OutputFormat::from_str(&raw)
                .ok_or_else(|| ToolError::invalid_value("format", "expected json or markdown")),
            None => Ok(self.config.server.default_format),
        }
    }
}

/// Per-call execution context.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub project: Option<ProjectDefinition>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl Scope {
    /// A command for `program` running in this scope.
    pub fn command(&self, program: &str) -> CommandSpec {
        CommandSpec::new(program)
            .cwd(self.cwd.clone())
            .envs(&self.env)
    }
}

/// Helper to create a tool definition.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let input_schema = rmcp::model::JsonObject::from_iter([
        ("type".to_string(), serde_json::json!("object")),
        ("properties".to_string(), properties),
        ("required".to_string(), serde_json::json!(required)),
    ]);

    Tool::new(name.to_string(), description.to_string(), input_schema)
}

/// Schema properties shared by every tool that runs a command.
pub fn scope_properties() -> serde_json::Map<String, Value> {
    let props = serde_json::json!({
        "project": {
            "type": "string",
            "description": "Registered project name (default: environment project, then saved default)"
        },
        "cwd": {
            "type": "string",
            "description": "Working directory (default: project root)"
        },
        "env": {
            "type": "object",
            "additionalProperties": { "type": "string" },
            "description": "Extra environment variables for the command"
        }
    });
    match props {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// `extra` plus the shared scope properties.
pub fn with_scope(extra: Value) -> Value {
    let mut props = scope_properties();
    if let Value::Object(map) = extra {
        props.extend(map);
    }
    Value::Object(props)
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(|v| v.as_str().map(String::from))
        .filter(|s| !s.is_empty())
}

/// Helper to get a required string from arguments.
pub fn require_string(args: &Value, key: &str) -> ToolResult<String> {
    get_string(args, key).ok_or_else(|| ToolError::missing_field(key))
}

/// Helper to get a bool from arguments.
pub fn get_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

/// Helper to get a non-negative integer from arguments.
pub fn get_u64(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(|v| v.as_u64())
}

/// A string or a list of strings. Absent or null is empty.
pub fn get_string_list(args: &Value, key: &str) -> ToolResult<Vec<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| ToolError::invalid_value(key, "expected a list of strings"))
            })
            .collect(),
        Some(_) => Err(ToolError::invalid_value(key, "expected a string or list of strings")),
    }
}

/// A mapping of strings. Scalar values are stringified.
pub fn get_string_map(args: &Value, key: &str) -> ToolResult<BTreeMap<String, String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                Value::Number(_) | Value::Bool(_) => Ok((k.clone(), v.to_string())),
                _ => Err(ToolError::invalid_value(key, "values must be strings")),
            })
            .collect(),
        Some(_) => Err(ToolError::invalid_value(key, "expected an object")),
    }
}

/// An object argument, if present.
pub fn get_object(args: &Value, key: &str) -> ToolResult<Option<Value>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Object(_)) => Ok(Some(v.clone())),
        Some(_) => Err(ToolError::invalid_value(key, "expected an object")),
    }
}
