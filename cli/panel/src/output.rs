//! Output formatting for panel commands.

use colored::Colorize;
use pyrsia_reconcile::{DisplayNode, Icon, IntegrationsView, StatusTag};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Nested levels rendered below a root. Deeper nodes are not shown.
const MAX_DEPTH: usize = 8;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tree and tables.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// A display node with its resolved children.
#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    #[serde(flatten)]
    pub node: DisplayNode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

/// Resolve the whole tree of `view`, starting from its roots.
pub fn collect_tree(view: &IntegrationsView) -> Vec<TreeEntry> {
    collect_level(view, None, 0)
}

fn collect_level(view: &IntegrationsView, parent: Option<&str>, depth: usize) -> Vec<TreeEntry> {
    if depth > MAX_DEPTH {
        return Vec::new();
    }
    view.get_children(parent)
        .into_iter()
        .filter_map(|id| view.get_node(&id))
        .map(|node| TreeEntry {
            children: collect_level(view, Some(&node.id), depth + 1),
            node,
        })
        .collect()
}

fn glyph(icon: Icon) -> &'static str {
    match icon {
        Icon::Docker => "◆",
        Icon::Warning => "⚠",
        Icon::Gear => "⚙",
        Icon::FolderLibrary => "▤",
        Icon::GoToFile => "↗",
        Icon::Archive => "□",
        Icon::Pyrsia => "●",
        Icon::Sync => "↻",
    }
}

fn status_text(status: StatusTag) -> String {
    match status {
        StatusTag::Managed => status.as_str().green().to_string(),
        StatusTag::Unmanaged => status.as_str().dimmed().to_string(),
        StatusTag::Updating => status.as_str().yellow().to_string(),
    }
}

/// Render the tree as indented text.
pub fn render_tree(entries: &[TreeEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        render_entry(entry, "", true, true, &mut out);
    }
    out
}

fn render_entry(entry: &TreeEntry, prefix: &str, last: bool, root: bool, out: &mut String) {
    let node = &entry.node;
    let branch = match (root, last) {
        (true, _) => "",
        (false, true) => "└── ",
        (false, false) => "├── ",
    };

    let label = if node.icon == Icon::Warning {
        node.label.red().to_string()
    } else {
        node.label.clone()
    };
    out.push_str(&format!("{prefix}{branch}{} {label}", glyph(node.icon)));
    if let Some(status) = node.status {
        out.push_str(&format!(" [{}]", status_text(status)));
    }
    if let Some(tooltip) = &node.tooltip {
        out.push_str(&format!(" {}", tooltip.dimmed()));
    }
    out.push('\n');

    let child_prefix = match (root, last) {
        (true, _) => prefix.to_string(),
        (false, true) => format!("{prefix}    "),
        (false, false) => format!("{prefix}│   "),
    };
    for (i, child) in entry.children.iter().enumerate() {
        render_entry(child, &child_prefix, i + 1 == entry.children.len(), false, out);
    }
}

/// Print the tree in the specified format.
pub fn print_tree(entries: &[TreeEntry], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("{}", "No integrations.".dimmed());
            } else {
                print!("{}", render_tree(entries));
            }
        }
        OutputFormat::Json => print_single(&entries, format),
    }
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => print_single(&data, format),
    }
}

/// Print a single item as pretty JSON.
pub fn print_single<T: Serialize + ?Sized>(data: &T, _format: OutputFormat) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    println!("{json}");
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}
