//! Display nodes.
//!
//! A [`DisplayNode`] is an abstract tree entry: a common header (id, parent,
//! label, icon, command, status) plus a [`NodeBody`] carrying only the
//! fields relevant to its kind. Kind-specific changes go through
//! [`NodeUpdaters`], a table from [`NodeKind`] to a pure update function.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

/// Kind of a display node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Integration root (e.g. "Docker").
    Root,
    /// Fixed grouping under a root ("Configuration", "Images").
    Category,
    /// A configuration file found on disk.
    ConfigFile,
    /// A local container image.
    Image,
}

/// Status tag of an image node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusTag {
    /// The node knows the image (non-empty transparency log).
    Managed,
    /// The node does not know the image, or the lookup failed.
    Unmanaged,
    /// A replacement of the image is in flight.
    Updating,
}

impl StatusTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Unmanaged => "unmanaged",
            Self::Updating => "updating",
        }
    }
}

impl fmt::Display for StatusTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Icon reference. Renderers map these to glyphs or theme icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Icon {
    Docker,
    Warning,
    Gear,
    FolderLibrary,
    GoToFile,
    Archive,
    Pyrsia,
    Sync,
}

impl Icon {
    /// Theme icon name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Warning => "warning",
            Self::Gear => "gear",
            Self::FolderLibrary => "folder-library",
            Self::GoToFile => "go-to-file",
            Self::Archive => "archive",
            Self::Pyrsia => "pyrsia",
            Self::Sync => "sync",
        }
    }
}

/// Command bound to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeCommand {
    /// Command id (e.g. `pyrsia.docker.update-config`).
    pub command: String,
    /// Human readable title.
    pub title: String,
    /// Argument passed to the command handler, usually the node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument: Option<String>,
}

impl NodeCommand {
    pub fn new(command: &str, title: &str, argument: Option<String>) -> Self {
        Self {
            command: command.to_string(),
            title: title.to_string(),
            argument,
        }
    }
}

/// Kind-specific node data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeBody {
    Root {
        /// False while the integration is down (warning node).
        available: bool,
    },
    Category {
        /// Children are the nodes whose id starts with `{child_prefix}.`.
        child_prefix: String,
    },
    ConfigFile {
        path: PathBuf,
    },
    Image {
        /// Image identity (`repository:tag`).
        image: String,
    },
}

impl NodeBody {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Root { .. } => NodeKind::Root,
            Self::Category { .. } => NodeKind::Category,
            Self::ConfigFile { .. } => NodeKind::ConfigFile,
            Self::Image { .. } => NodeKind::Image,
        }
    }
}

/// A tree entry tracked by a reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayNode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub label: String,
    pub icon: Icon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<NodeCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusTag>,
    #[serde(flatten)]
    pub body: NodeBody,
}

impl DisplayNode {
    pub fn kind(&self) -> NodeKind {
        self.body.kind()
    }

    /// Image identity for image nodes.
    pub fn image(&self) -> Option<&str> {
        match &self.body {
            NodeBody::Image { image } => Some(image),
            _ => None,
        }
    }

    /// File path for config-file nodes.
    pub fn config_path(&self) -> Option<&PathBuf> {
        match &self.body {
            NodeBody::ConfigFile { path } => Some(path),
            _ => None,
        }
    }

    /// Whether `id` belongs under this node according to the id-prefix convention.
    pub fn is_parent_of(&self, child: &DisplayNode) -> bool {
        match &self.body {
            NodeBody::Root { .. } => child.parent.as_deref() == Some(self.id.as_str()),
            NodeBody::Category { child_prefix } => child
                .id
                .strip_prefix(child_prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
            NodeBody::ConfigFile { .. } | NodeBody::Image { .. } => false,
        }
    }
}

/// Change applied to a node through the update table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeUpdate {
    /// Root: the integration became reachable or unreachable.
    Availability { available: bool },
    /// Image: result of the provenance lookup.
    Provenance { managed: bool },
    /// Image: a replacement is in flight; `detail` is the latest progress line.
    Progress { detail: Option<String> },
}

/// Pure per-kind update function.
pub type UpdateFn = fn(&mut DisplayNode, &NodeUpdate);

/// Update functions indexed by node kind. Built once per reconciler.
pub struct NodeUpdaters {
    table: HashMap<NodeKind, UpdateFn>,
}

impl NodeUpdaters {
    /// Build the update table for the Docker integration.
    pub fn docker() -> Self {
        let mut table: HashMap<NodeKind, UpdateFn> = HashMap::new();
        table.insert(NodeKind::Root, update_root);
        table.insert(NodeKind::Category, update_static);
        table.insert(NodeKind::ConfigFile, update_static);
        table.insert(NodeKind::Image, update_image);
        Self { table }
    }

    /// Apply `update` to `node` using the function registered for its kind.
    pub fn apply(&self, node: &mut DisplayNode, update: &NodeUpdate) {
        match self.table.get(&node.kind()) {
            Some(update_fn) => update_fn(node, update),
            None => debug!(id = %node.id, kind = ?node.kind(), "No updater registered"),
        }
    }
}

/// Label of the Docker root node.
pub const DOCKER_LABEL: &str = "Docker";

/// Label suffix of the Docker root node while the integration is down.
pub const UNAVAILABLE_SUFFIX: &str = "(Pyrsia node or Docker is unavailable)";

const UNAVAILABLE_TOOLTIP: &str =
    "Please make sure that Docker service and Pyrsia node is up and configured";

fn update_root(node: &mut DisplayNode, update: &NodeUpdate) {
    let NodeUpdate::Availability { available } = update else {
        return;
    };
    let base = match &node.body {
        NodeBody::Root { .. } => node
            .label
            .strip_suffix(UNAVAILABLE_SUFFIX)
            .map(str::trim_end)
            .unwrap_or(&node.label)
            .to_string(),
        _ => return,
    };

    node.body = NodeBody::Root {
        available: *available,
    };
    if *available {
        node.label = base;
        node.icon = Icon::Docker;
        node.tooltip = None;
    } else {
        node.label = format!("{base} {UNAVAILABLE_SUFFIX}");
        node.icon = Icon::Warning;
        node.tooltip = Some(UNAVAILABLE_TOOLTIP.to_string());
        node.command = None;
    }
}

fn update_static(_node: &mut DisplayNode, _update: &NodeUpdate) {}

fn update_image(node: &mut DisplayNode, update: &NodeUpdate) {
    let Some(image) = node.image().map(str::to_string) else {
        return;
    };
    match update {
        NodeUpdate::Provenance { managed } => {
            node.label = image;
            node.tooltip = None;
            if *managed {
                node.status = Some(StatusTag::Managed);
                node.icon = Icon::Pyrsia;
                node.command = Some(NodeCommand::new(
                    crate::docker::commands::OPEN_TRANS_LOG,
                    "Open transparency log",
                    Some(node.id.clone()),
                ));
            } else {
                node.status = Some(StatusTag::Unmanaged);
                node.icon = Icon::Archive;
                node.command = Some(NodeCommand::new(
                    crate::docker::commands::REQUEST_BUILD,
                    "Add to Pyrsia",
                    Some(node.id.clone()),
                ));
            }
        }
        NodeUpdate::Progress { detail } => {
            node.label = format!("Pulling '{image}'");
            node.icon = Icon::Sync;
            node.status = Some(StatusTag::Updating);
            node.command = None;
            if detail.is_some() {
                node.tooltip.clone_from(detail);
            }
        }
        NodeUpdate::Availability { .. } => {}
    }
}
