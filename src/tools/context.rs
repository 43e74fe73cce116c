//! Per-request context passed to tool functions.

use crate::logging::Logger;

/// Per-request context. The logger mirrors progress of long-running
/// commands to the client.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub logger: Logger,
}

impl ToolContext {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}
