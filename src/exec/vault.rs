//! `ansible-vault` invocations.

use crate::error::{ToolError, ToolResult};
use std::collections::BTreeMap;

/// Environment variable `ansible-vault` reads a password file from.
pub const PASSWORD_FILE_ENV: &str = "ANSIBLE_VAULT_PASSWORD_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultAction {
    Encrypt,
    Decrypt,
    View,
    Rekey,
}

impl VaultAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VaultAction::Encrypt => "encrypt",
            VaultAction::Decrypt => "decrypt",
            VaultAction::View => "view",
            VaultAction::Rekey => "rekey",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRequest {
    pub action: VaultAction,
    pub files: Vec<String>,
    pub password_file: Option<String>,
    pub vault_id: Option<String>,
    /// Rekey only.
    pub new_password_file: Option<String>,
}

impl VaultRequest {
    pub fn new(action: VaultAction, files: Vec<String>) -> Self {
        Self {
            action,
            files,
            password_file: None,
            vault_id: None,
            new_password_file: None,
        }
    }

    /// Arguments following the `ansible-vault` executable. `env` is the
    /// environment the command will run with; a password file configured
    /// there counts as a password source.
    pub fn to_args(&self, env: &BTreeMap<String, String>) -> ToolResult<Vec<String>> {
        if self.files.is_empty() {
            return Err(ToolError::missing_field("files"));
        }
        if self.action == VaultAction::View && self.files.len() != 1 {
            return Err(ToolError::invalid_value("files", "view takes exactly one file"));
        }
        let has_env_password = env.contains_key(PASSWORD_FILE_ENV)
            || std::env::var_os(PASSWORD_FILE_ENV).is_some();
        if self.password_file.is_none() && self.vault_id.is_none() && !has_env_password {
            return Err(ToolError::missing_field("password_file").with_details(format!(
                "provide password_file or vault_id, or set {} in the project env",
                PASSWORD_FILE_ENV
            )));
        }

        let mut args = vec![self.action.as_str().to_string()];
        args.extend(self.files.iter().cloned());
        if let Some(file) = &self.password_file {
            args.push("--vault-password-file".to_string());
            args.push(file.clone());
        }
        if let Some(id) = &self.vault_id {
            args.push("--vault-id".to_string());
            args.push(id.clone());
        }
        if self.action == VaultAction::Rekey {
            let Some(new_file) = &self.new_password_file else {
                return Err(ToolError::missing_field("new_password_file"));
            };
            args.push("--new-vault-password-file".to_string());
            args.push(new_file.clone());
        }
        Ok(args)
    }
}
