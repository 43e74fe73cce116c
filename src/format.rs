//! Output formatting for tool results: JSON or markdown.

use crate::inventory::{GraphDiff, HostView, InventoryListing};
use crate::inventory::vars::display_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// Body of a successful tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Json(Value),
    /// Pre-rendered text (markdown, tree lines).
    Raw(String),
}

impl ToolOutput {
    pub fn into_string(self) -> String {
        match self {
            ToolOutput::Json(value) => {
                serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
            }
            ToolOutput::Raw(text) => text,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ToolOutput::Json(value) => Some(value),
            ToolOutput::Raw(_) => None,
        }
    }
}

/// Format an inventory listing as markdown.
pub fn format_listing_markdown(listing: &InventoryListing) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Inventory ({} hosts)\n\n", listing.hosts.len()));
    md.push_str("## Groups\n\n");
    for (name, group) in &listing.groups {
        md.push_str(&format!("### {}\n", name));
        if !group.children.is_empty() {
            md.push_str(&format!("- **children**: {}\n", group.children.join(", ")));
        }
        if !group.hosts.is_empty() {
            md.push_str(&format!("- **hosts**: {}\n", group.hosts.join(", ")));
        }
        md.push('\n');
    }

    if let Some(hostvars) = &listing.hostvars {
        md.push_str("## Host variables\n\n");
        for (host, vars) in hostvars {
            md.push_str(&format!("### {}\n", host));
            for (key, value) in vars {
                md.push_str(&format!("- `{}`: {}\n", key, display_value(value)));
            }
            md.push('\n');
        }
    }

    md
}

/// Format a host lookup as markdown.
pub fn format_host_markdown(view: &HostView) -> String {
    let mut md = String::new();

    md.push_str(&format!("## Host: {}\n", view.name));
    md.push_str(&format!("- **groups**: {}\n", view.groups.join(", ")));
    if !view.direct_groups.is_empty() {
        md.push_str(&format!("- **direct groups**: {}\n", view.direct_groups.join(", ")));
    }

    if !view.vars.is_empty() {
        md.push_str("\n### Variables\n");
        for (key, value) in &view.vars {
            let origin = view
                .provenance
                .as_ref()
                .and_then(|p| p.get(key))
                .map(|o| format!(" _({})_", o))
                .unwrap_or_default();
            md.push_str(&format!("- `{}`: {}{}\n", key, display_value(value), origin));
        }
    }

    md
}

/// Format a graph diff as markdown.
pub fn format_diff_markdown(diff: &GraphDiff) -> String {
    if diff.is_empty() {
        return "No differences found.\n".to_string();
    }
    let mut md = String::from("# Inventory diff\n\n");

    let mut section = |title: &str, names: &[String]| {
        if !names.is_empty() {
            md.push_str(&format!("## {}\n", title));
            for name in names {
                md.push_str(&format!("- {}\n", name));
            }
            md.push('\n');
        }
    };
    section("Hosts only in left", &diff.only_left);
    section("Hosts only in right", &diff.only_right);
    section("Groups only in left", &diff.groups_only_left);
    section("Groups only in right", &diff.groups_only_right);

    if !diff.membership.is_empty() {
        md.push_str("## Membership changes\n");
        for (host, change) in &diff.membership {
            let mut parts: Vec<String> = change.added.iter().map(|g| format!("+{}", g)).collect();
            parts.extend(change.removed.iter().map(|g| format!("-{}", g)));
            md.push_str(&format!("- {}: {}\n", host, parts.join(" ")));
        }
    }

    md
}

/// Plain-text diff for the CLI.
pub fn format_diff_text(diff: &GraphDiff) -> String {
    if diff.is_empty() {
        return "No differences found.\n".to_string();
    }
    let mut out = String::new();
    for host in &diff.only_left {
        out.push_str(&format!("< {}\n", host));
    }
    for host in &diff.only_right {
        out.push_str(&format!("> {}\n", host));
    }
    for group in &diff.groups_only_left {
        out.push_str(&format!("< @{}\n", group));
    }
    for group in &diff.groups_only_right {
        out.push_str(&format!("> @{}\n", group));
    }
    for (host, change) in &diff.membership {
        for group in &change.added {
            out.push_str(&format!("~ {} +@{}\n", host, group));
        }
        for group in &change.removed {
            out.push_str(&format!("~ {} -@{}\n", host, group));
        }
    }
    out
}
