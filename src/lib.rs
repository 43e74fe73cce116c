//! Ansible MCP Server Library
//!
//! This module exports the core components for testing and integration.
//! The inventory engine in [`inventory`] has no MCP dependencies and can be
//! used on its own.

pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod format;
pub mod inventory;
pub mod logging;
pub mod projects;
pub mod tools;
