//! CLI command definitions for ansible-mcp
//!
//! Without a subcommand the binary serves MCP over stdio. The `graph`,
//! `host` and `diff` subcommands run the inventory engine offline.

pub mod diff;
pub mod graph;

use clap::{Parser, Subcommand};
use diff::DiffArgs;
use graph::{GraphArgs, HostArgs};

/// Ansible MCP server and offline inventory tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server (default if no subcommand given)
    Serve,

    /// Print the resolved group tree
    Graph(GraphArgs),

    /// Show one host's groups and variables
    Host(HostArgs),

    /// Compare hosts and group memberships of two inventories
    Diff(DiffArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_offline_subcommands() {
        let cli = Cli::parse_from(["ansible-mcp", "graph", "-i", "hosts.ini", "--vars"]);
        match cli.command {
            Some(Command::Graph(args)) => {
                assert_eq!(args.sources.inventory, vec!["hosts.ini"]);
                assert!(args.vars);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from([
            "ansible-mcp", "diff", "--left", "a.ini", "--right", "b.ini", "c.ini", "-f", "json",
        ]);
        match cli.command {
            Some(Command::Diff(args)) => {
                assert_eq!(args.left, vec!["a.ini"]);
                assert_eq!(args.right, vec!["b.ini", "c.ini"]);
                assert_eq!(args.format, diff::DiffFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::parse_from(["ansible-mcp", "--log", "0"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "0");
    }
}
