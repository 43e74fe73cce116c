//! Errors raised while resolving an inventory.

use serde::Serialize;
use thiserror::Error;

/// Resolution-layer error. Every variant names the file, source, or entity
/// it concerns so callers can branch on the kind.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory source not found: {path}")]
    SourceNotFound { path: String },

    #[error("failed to parse {path}{}: {message}", line_suffix(.line))]
    Parse {
        path: String,
        line: Option<usize>,
        message: String,
    },

    #[error("group cycle detected: {}", .groups.join(" -> "))]
    Cycle { groups: Vec<String> },

    #[error("host not found: {host}")]
    HostNotFound { host: String },

    #[error("group not found: {group}")]
    GroupNotFound { group: String },

    #[error("invalid variable data in {path}: {message}")]
    InvalidValue { path: String, message: String },

    #[error("failed to read {path}: {error}")]
    Io {
        path: String,
        #[source]
        error: std::io::Error,
    },

    #[error("{} inventory source(s) failed: {}", .0.len(), summarize(.0))]
    Sources(Vec<SourceFailure>),
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(":{}", l)).unwrap_or_default()
}

fn summarize(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| f.error.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl InventoryError {
    pub fn parse(path: impl Into<String>, line: Option<usize>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Stable kind label used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "source_not_found",
            Self::Parse { .. } | Self::InvalidValue { .. } => "parse_error",
            Self::Cycle { .. } => "cycle_error",
            Self::HostNotFound { .. } | Self::GroupNotFound { .. } => "not_found",
            Self::Io { .. } => "io_error",
            Self::Sources(_) => "source_errors",
        }
    }
}

/// One inventory source that could not be loaded.
#[derive(Debug)]
pub struct SourceFailure {
    /// The source string as given by the caller, or the file inside a
    /// directory source that failed.
    pub source_name: String,
    pub error: InventoryError,
}

/// Wire form of a [`SourceFailure`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SourceFailureReport {
    pub source: String,
    pub kind: String,
    pub message: String,
}

impl From<&SourceFailure> for SourceFailureReport {
    fn from(failure: &SourceFailure) -> Self {
        Self {
            source: failure.source_name.clone(),
            kind: failure.error.kind().to_string(),
            message: failure.error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
