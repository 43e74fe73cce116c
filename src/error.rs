//! Structured error types for tool responses.

use crate::inventory::{InventoryError, SourceFailureReport};
use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,

    // Resolution errors
    SourceNotFound,
    ParseError,
    CycleError,
    NotFound,

    // Collaborator errors
    ExternalFailure,
    RegistryError,

    // Internal errors
    InternalError,
    UnknownTool,
}

/// Captured output of a failed external command.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CapturedOutput {
    pub command: Vec<String>,
    pub rc: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Structured error for tool responses.
#[derive(Debug, Serialize)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CapturedOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SourceFailureReport>,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
            output: None,
            failures: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_output(mut self, output: CapturedOutput) -> Self {
        self.output = Some(output);
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn source_not_found(path: impl fmt::Display) -> Self {
        Self::new(ErrorCode::SourceNotFound, format!("Not found: {}", path))
    }

    pub fn not_found(what: &str, name: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found: {}", what, name))
    }

    pub fn external(message: impl Into<String>, output: CapturedOutput) -> Self {
        Self::new(ErrorCode::ExternalFailure, message).with_output(output)
    }

    pub fn registry(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::RegistryError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("Unknown tool: {}", name))
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolError {}

impl From<InventoryError> for ToolError {
    fn from(err: InventoryError) -> Self {
        let mut tool_err = Self::new(code_for(&err), err.to_string());
        if let InventoryError::Sources(failures) = &err {
            tool_err.failures = failures.iter().map(SourceFailureReport::from).collect();
        }
        tool_err
    }
}

/// An aggregate of source failures reports PARSE_ERROR if any source was
/// malformed, otherwise the code of its first failure.
fn code_for(err: &InventoryError) -> ErrorCode {
    match err {
        InventoryError::SourceNotFound { .. } | InventoryError::Io { .. } => {
            ErrorCode::SourceNotFound
        }
        InventoryError::Parse { .. } | InventoryError::InvalidValue { .. } => {
            ErrorCode::ParseError
        }
        InventoryError::Cycle { .. } => ErrorCode::CycleError,
        InventoryError::HostNotFound { .. } | InventoryError::GroupNotFound { .. } => {
            ErrorCode::NotFound
        }
        InventoryError::Sources(failures) => {
            let codes: Vec<ErrorCode> = failures.iter().map(|f| code_for(&f.error)).collect();
            if codes.contains(&ErrorCode::ParseError) {
                ErrorCode::ParseError
            } else {
                codes.first().copied().unwrap_or(ErrorCode::SourceNotFound)
            }
        }
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        // Try to downcast to ToolError first
        match err.downcast::<ToolError>() {
            Ok(tool_err) => tool_err,
            Err(err) => ToolError::internal(err),
        }
    }
}

/// Result type for tool operations.
pub type ToolResult<T> = std::result::Result<T, ToolError>;
