//! Vault tools backed by `ansible-vault`.

use super::{ToolContext, ToolHandler, get_string, get_string_list, make_tool, with_scope};
use crate::error::{ToolError, ToolResult};
use crate::exec::execute;
use crate::exec::vault::{VaultAction, VaultRequest};
use crate::format::ToolOutput;
use rmcp::model::Tool;
use serde_json::{Value, json};

fn vault_properties(rekey: bool) -> Value {
    let mut props = json!({
        "files": {
            "oneOf": [
                { "type": "string" },
                { "type": "array", "items": { "type": "string" } }
            ],
            "description": "File(s) to operate on, relative to the working directory"
        },
        "password_file": {
            "type": "string",
            "description": "Vault password file (or set ANSIBLE_VAULT_PASSWORD_FILE in the project env)"
        },
        "vault_id": {
            "type": "string",
            "description": "Vault identity, e.g. prod@~/.vault_pass"
        }
    });
    if rekey {
        props["new_password_file"] = json!({
            "type": "string",
            "description": "Password file holding the new password"
        });
    }
    with_scope(props)
}

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "vault_encrypt",
            "Encrypt files in place with ansible-vault.",
            vault_properties(false),
            vec!["files"],
        ),
        make_tool(
            "vault_decrypt",
            "Decrypt files in place with ansible-vault.",
            vault_properties(false),
            vec!["files"],
        ),
        make_tool(
            "vault_view",
            "Show the plaintext of one vault-encrypted file without decrypting it on disk.",
            vault_properties(false),
            vec!["files"],
        ),
        make_tool(
            "vault_rekey",
            "Re-encrypt files with a new vault password.",
            vault_properties(true),
            vec!["files", "new_password_file"],
        ),
    ]
}

fn action_for(tool: &str) -> ToolResult<VaultAction> {
    match tool {
        "vault_encrypt" => Ok(VaultAction::Encrypt),
        "vault_decrypt" => Ok(VaultAction::Decrypt),
        "vault_view" => Ok(VaultAction::View),
        "vault_rekey" => Ok(VaultAction::Rekey),
        other => Err(ToolError::unknown_tool(other)),
    }
}

pub async fn run(handler: &ToolHandler, tool: &str, args: &Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
    let action = action_for(tool)?;
    let scope = handler.scope(args)?;

    let mut req = VaultRequest::new(action, get_string_list(args, "files")?);
    req.password_file = get_string(args, "password_file");
    req.vault_id = get_string(args, "vault_id");
    req.new_password_file = get_string(args, "new_password_file");

    let spec = scope
        .command(&handler.config.exec.ansible_vault)
        .args(req.to_args(&scope.env)?);
    ctx.logger.info(&format!("Running ansible-vault {}", action.as_str()));
    let outcome = execute(handler.runner.as_ref(), &spec).await?;

    let mut body = json!({
        "ok": true,
        "action": action.as_str(),
        "files": req.files,
        "command": outcome.command,
    });
    if action == VaultAction::View {
        body["content"] = json!(outcome.stdout);
    }
    Ok(ToolOutput::Json(body))
}
