//! Ansible MCP Server
//!
//! Exposes Ansible inventory resolution, playbook execution, vault and
//! galaxy operations as MCP tools over stdio.

use anyhow::Result;
use ansible_mcp::cli::diff::{DiffArgs, DiffFormat};
use ansible_mcp::cli::graph::{GraphArgs, HostArgs};
use ansible_mcp::cli::{Cli, Command};
use ansible_mcp::config::{Config, ConfigLoader, Environment};
use ansible_mcp::error::ToolError;
use ansible_mcp::format::format_diff_text;
use ansible_mcp::inventory::{Resolution, SourceFailure};
use ansible_mcp::logging::{LogLevelFilter, Logger};
use ansible_mcp::tools::{ToolContext, ToolHandler};
use clap::Parser;
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, InitializeResult, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities,
    },
    service::RequestContext,
    transport::io::stdio,
};
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

/// MCP server handler.
#[derive(Clone)]
struct AnsibleMcpServer {
    tool_handler: Arc<ToolHandler>,
    /// Atomic level filter for logging (client can adjust via logging/setLevel).
    level_filter: Arc<LogLevelFilter>,
}

impl AnsibleMcpServer {
    fn new(config: Config, environment: Environment) -> Self {
        Self {
            tool_handler: Arc::new(ToolHandler::new(Arc::new(config), Arc::new(environment))),
            level_filter: Arc::new(LogLevelFilter::default()),
        }
    }
}

const INSTRUCTIONS: &str = "\
Ansible automation over MCP. Inventory tools (inventory_list, inventory_graph, inventory_host, \
inventory_diff) resolve groups and variables without running Ansible. Register projects with \
register_project so later calls can pass project=<name> instead of paths.";

impl ServerHandler for AnsibleMcpServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: Default::default(),
            server_info: rmcp::model::Implementation {
                name: "ansible-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            capabilities: ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                logging: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn set_level(
        &self,
        request: rmcp::model::SetLevelRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        self.level_filter.set(request.level);
        tracing::info!(level = ?request.level, "Logging level updated via MCP");
        Ok(())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_handler.get_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tool_name = request.name.clone();
        let start = std::time::Instant::now();

        let logger = Logger::new()
            .with_peer(context.peer.clone())
            .with_level_filter(Arc::clone(&self.level_filter))
            .with_name(format!("tool:{}", tool_name));
        let tool_ctx = ToolContext::new(logger);

        let args = Value::Object(request.arguments.unwrap_or_default());
        match self.tool_handler.call_tool(&tool_name, args, &tool_ctx).await {
            Ok(result) => {
                let elapsed = start.elapsed();
                debug!(tool = %tool_name, duration_ms = elapsed.as_millis() as u64, "Tool call succeeded");
                Ok(CallToolResult {
                    content: vec![Content::text(result.into_string())],
                    is_error: None,
                    meta: None,
                    structured_content: None,
                })
            }
            Err(e) => {
                let elapsed = start.elapsed();
                let error_json = match e.downcast::<ToolError>() {
                    Ok(tool_err) => {
                        warn!(
                            tool = %tool_name,
                            error_code = ?tool_err.code,
                            error_message = %tool_err.message,
                            duration_ms = elapsed.as_millis() as u64,
                            "Tool call failed"
                        );
                        serde_json::to_string(&tool_err).unwrap_or_else(|_| {
                            json!({ "error": tool_err.to_string() }).to_string()
                        })
                    }
                    Err(e) => {
                        warn!(
                            tool = %tool_name,
                            error = %e,
                            duration_ms = elapsed.as_millis() as u64,
                            "Tool call failed with internal error"
                        );
                        json!({
                            "code": "INTERNAL_ERROR",
                            "message": e.to_string()
                        })
                        .to_string()
                    }
                };
                Ok(CallToolResult {
                    content: vec![Content::text(error_json)],
                    is_error: Some(true),
                    meta: None,
                    structured_content: None,
                })
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on --log option
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    // SAFETY: This is safe at program startup before any other threads are spawned
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var("ANSIBLE_MCP_CONFIG_PATH", config_path);
        }
    }
    let loader = ConfigLoader::load()?;
    for (tier, path) in loader.sources() {
        debug!(tier = %tier, path = %path.display(), "Using config file");
    }
    let config = loader.into_config();

    match cli.command {
        Some(Command::Graph(args)) => run_graph(&config, args)?,
        Some(Command::Host(args)) => run_host(&config, args)?,
        Some(Command::Diff(args)) => run_diff(&config, args)?,
        Some(Command::Serve) | None => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    info!("Starting Ansible MCP Server v{}", env!("CARGO_PKG_VERSION"));
    let environment = Environment::capture();
    if let Some(project) = &environment.project {
        info!(project = %project.name, root = %project.root, "Project declared by environment");
    }

    let server = AnsibleMcpServer::new(config, environment);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

fn report_skipped(resolution: &Resolution) {
    for SourceFailure { source_name, error } in &resolution.failures {
        eprintln!("Warning: skipped inventory source {}: {}", source_name, error);
    }
}

/// Run the graph command
fn run_graph(config: &Config, args: GraphArgs) -> Result<()> {
    let resolution = args.sources.request(config)?.resolve()?;
    report_skipped(&resolution);
    let tree = resolution
        .graph
        .render_tree(args.group.as_deref(), args.vars)?;
    println!("{}", tree);
    Ok(())
}

/// Run the host command
fn run_host(config: &Config, args: HostArgs) -> Result<()> {
    let resolution = args.sources.request(config)?.resolve()?;
    report_skipped(&resolution);
    let view = resolution.graph.find_host(&args.name, args.provenance)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Run the diff command
fn run_diff(config: &Config, args: DiffArgs) -> Result<()> {
    let left = args.sources.request_for(&args.left, config)?.resolve()?;
    let right = args.sources.request_for(&args.right, config)?.resolve()?;
    report_skipped(&left);
    report_skipped(&right);

    let diff = left.graph.diff(&right.graph);
    match args.format {
        DiffFormat::Text => {
            println!("Diff: {} -> {}", args.left.join(","), args.right.join(","));
            print!("{}", format_diff_text(&diff));
        }
        DiffFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
    }

    if args.exit_code && !diff.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
