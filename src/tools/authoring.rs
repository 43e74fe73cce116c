//! Authoring helpers: write playbooks, scaffold roles, check YAML.

use super::{get_string, make_tool, require_string};
use crate::error::{ErrorCode, ToolError, ToolResult};
use crate::format::ToolOutput;
use rmcp::model::{Tool, ToolAnnotations};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lines of the written playbook echoed back.
const PREVIEW_LINES: usize = 50;

const ROLE_DIRS: &[&str] = &[
    "defaults",
    "files",
    "handlers",
    "meta",
    "tasks",
    "templates",
    "tests",
    "vars",
];

/// Role directories that get a `main.yml` stub.
const ROLE_MAIN_FILES: &[&str] = &["defaults", "handlers", "meta", "tasks", "vars"];

pub fn get_tools() -> Vec<Tool> {
    let mut validate = make_tool(
        "validate_yaml",
        "Parse YAML from a file or inline text. Fails with PARSE_ERROR naming the line and \
         column of the first problem.",
        json!({
            "path": { "type": "string", "description": "File to check" },
            "content": { "type": "string", "description": "Inline YAML to check (when no path)" }
        }),
        vec![],
    );
    validate.annotations = Some(ToolAnnotations {
        title: Some("Validate YAML".into()),
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        open_world_hint: Some(false),
    });

    vec![
        make_tool(
            "create_playbook",
            "Write a playbook from YAML text or a structured value. Without output_path a \
             temporary file is created. Returns the path, bytes written and a preview.",
            json!({
                "playbook": {
                    "oneOf": [{ "type": "string" }, { "type": "array" }, { "type": "object" }],
                    "description": "Playbook as YAML text or as a list of plays"
                },
                "output_path": { "type": "string", "description": "Where to write the playbook" }
            }),
            vec!["playbook"],
        ),
        make_tool(
            "create_role_structure",
            "Create the standard role directory layout with main.yml stubs.",
            json!({
                "base_path": { "type": "string", "description": "Directory that will contain the role" },
                "role_name": { "type": "string", "description": "Role directory name" }
            }),
            vec!["base_path", "role_name"],
        ),
        validate,
    ]
}

fn parse_error(origin: &str, err: &serde_yaml::Error) -> ToolError {
    let mut tool_err = ToolError::new(ErrorCode::ParseError, format!("{}: {}", origin, err));
    if let Some(location) = err.location() {
        tool_err = tool_err.with_details(format!(
            "line {}, column {}",
            location.line(),
            location.column()
        ));
    }
    tool_err
}

/// Parse every document in `text`, returning how many there were.
fn check_yaml(text: &str, origin: &str) -> ToolResult<usize> {
    let mut count = 0;
    for document in serde_yaml::Deserializer::from_str(text) {
        serde_yaml::Value::deserialize(document).map_err(|e| parse_error(origin, &e))?;
        count += 1;
    }
    Ok(count)
}

fn playbook_text(playbook: &Value) -> ToolResult<String> {
    match playbook {
        Value::String(text) => {
            check_yaml(text, "playbook")?;
            Ok(text.clone())
        }
        Value::Array(_) | Value::Object(_) => {
            serde_yaml::to_string(playbook).map_err(ToolError::internal)
        }
        _ => Err(ToolError::invalid_value("playbook", "expected YAML text or a list of plays")),
    }
}

pub fn create_playbook(args: &Value) -> ToolResult<ToolOutput> {
    let playbook = args
        .get("playbook")
        .filter(|v| !v.is_null())
        .ok_or_else(|| ToolError::missing_field("playbook"))?;
    let text = playbook_text(playbook)?;

    let path = match get_string(args, "output_path") {
        Some(output) => {
            let path = PathBuf::from(output);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(ToolError::internal)?;
            }
            path
        }
        None => {
            let (_, path) = tempfile::Builder::new()
                .prefix("playbook_")
                .suffix(".yml")
                .tempfile()
                .and_then(|f| f.keep().map_err(|e| e.error))
                .map_err(ToolError::internal)?;
            path
        }
    };
    std::fs::write(&path, text.as_bytes()).map_err(ToolError::internal)?;
    let path = std::fs::canonicalize(&path).unwrap_or(path);
    debug!(path = %path.display(), bytes = text.len(), "Wrote playbook");

    let preview = text.lines().take(PREVIEW_LINES).collect::<Vec<_>>().join("\n");
    Ok(ToolOutput::Json(json!({
        "path": path.display().to_string(),
        "bytes_written": text.len(),
        "preview": preview,
    })))
}

pub fn create_role_structure(args: &Value) -> ToolResult<ToolOutput> {
    let base = require_string(args, "base_path")?;
    let role = require_string(args, "role_name")?;
    if role.contains('/') || role.contains('\\') || role == "." || role == ".." {
        return Err(ToolError::invalid_value("role_name", "must be a single directory name"));
    }
    let role_dir = Path::new(&base).join(&role);

    let mut created = Vec::new();
    for sub in ROLE_DIRS {
        let dir = role_dir.join(sub);
        std::fs::create_dir_all(&dir).map_err(ToolError::internal)?;
        created.push(dir.display().to_string());
    }
    for sub in ROLE_MAIN_FILES {
        let main = role_dir.join(sub).join("main.yml");
        if !main.exists() {
            std::fs::write(&main, "---\n").map_err(ToolError::internal)?;
            created.push(main.display().to_string());
        }
    }

    Ok(ToolOutput::Json(json!({
        "created": created,
        "role_path": role_dir.display().to_string(),
    })))
}

pub fn validate_yaml(args: &Value) -> ToolResult<ToolOutput> {
    let (text, origin) = match (get_string(args, "path"), get_string(args, "content")) {
        (Some(path), _) => {
            let file = Path::new(&path);
            if !file.is_file() {
                return Err(ToolError::source_not_found(&path));
            }
            let text = std::fs::read_to_string(file).map_err(ToolError::internal)?;
            (text, path)
        }
        (None, Some(content)) => (content, "content".to_string()),
        (None, None) => {
            return Err(ToolError::missing_field("path")
                .with_details("provide path or content"));
        }
    };
    let documents = check_yaml(&text, &origin)?;
    Ok(ToolOutput::Json(json!({
        "valid": true,
        "source": origin,
        "documents": documents,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn structured_playbook_is_serialized() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("plays/site.yml");
        let result = create_playbook(&json!({
            "playbook": [{"hosts": "all", "tasks": [{"ping": null}]}],
            "output_path": out.display().to_string(),
        }))
        .unwrap();
        let body = result.as_json().unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(body["bytes_written"], json!(written.len()));
        assert!(written.contains("hosts: all"));
    }

    #[test]
    fn preview_is_capped() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("long.yml");
        let text: String = (0..80).map(|i| format!("# line {}\n", i)).collect::<String>() + "- hosts: all\n";
        let result = create_playbook(&json!({
            "playbook": text,
            "output_path": out.display().to_string(),
        }))
        .unwrap();
        let preview = result.as_json().unwrap()["preview"].as_str().unwrap().to_string();
        assert_eq!(preview.lines().count(), PREVIEW_LINES);
    }

    #[test]
    fn invalid_yaml_reports_location() {
        let err = validate_yaml(&json!({"content": "a: 1\nb: [unclosed\n"})).unwrap_err();
        assert_eq!(err.code, ErrorCode::ParseError);
        assert!(err.details.unwrap().starts_with("line "));

        let ok = validate_yaml(&json!({"content": "a: 1\n---\nb: 2\n"})).unwrap();
        assert_eq!(ok.as_json().unwrap()["documents"], json!(2));
    }

    #[test]
    fn role_layout() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().display().to_string();
        create_role_structure(&json!({"base_path": base, "role_name": "web"})).unwrap();
        let role = temp.path().join("web");
        assert!(role.join("templates").is_dir());
        assert_eq!(std::fs::read_to_string(role.join("tasks/main.yml")).unwrap(), "---\n");
        assert!(!role.join("files/main.yml").exists());

        let err = create_role_structure(&json!({"base_path": base, "role_name": "../x"})).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    }
}
