//! Diff subcommand: compare two inventories offline.

use super::graph::SourceArgs;
use clap::Args;

/// Arguments for the diff subcommand
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Left inventory source(s)
    #[arg(long, value_name = "SRC", num_args = 1.., required = true)]
    pub left: Vec<String>,

    /// Right inventory source(s)
    #[arg(long, value_name = "SRC", num_args = 1.., required = true)]
    pub right: Vec<String>,

    #[command(flatten)]
    pub sources: SourceArgs,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    pub format: DiffFormat,

    /// Exit with status 1 when the inventories differ
    #[arg(long)]
    pub exit_code: bool,
}

/// Output format for diff results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for DiffFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(DiffFormat::Text),
            "json" => Ok(DiffFormat::Json),
            _ => Err(format!("Invalid format '{}'. Valid options: text, json", s)),
        }
    }
}

impl std::fmt::Display for DiffFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffFormat::Text => write!(f, "text"),
            DiffFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<DiffFormat>().unwrap(), DiffFormat::Json);
        assert_eq!("text".parse::<DiffFormat>().unwrap(), DiffFormat::Text);
        assert!("summary".parse::<DiffFormat>().is_err());
        assert_eq!(DiffFormat::Json.to_string(), "json");
    }
}
