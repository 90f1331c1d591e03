//! Integration interface consumed by the view aggregator.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::node::DisplayNode;
use crate::ReconcileError;

/// Events delivered to integrations by the view aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationEvent {
    /// Poll external state and refresh the model.
    ModelUpdate,
    /// The node address changed.
    NodeConfigurationUpdate,
}

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileDelta {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ReconcileDelta {
    /// Diff two node collections. Ids come out sorted.
    pub fn between(
        old: &BTreeMap<String, DisplayNode>,
        new: &BTreeMap<String, DisplayNode>,
    ) -> Self {
        let mut delta = Self::default();
        for (id, node) in new {
            match old.get(id) {
                None => delta.created.push(id.clone()),
                Some(previous) if previous != node => delta.updated.push(id.clone()),
                Some(_) => {}
            }
        }
        delta.removed = old
            .keys()
            .filter(|id| !new.contains_key(*id))
            .cloned()
            .collect();
        delta
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// A pluggable subsystem contributing nodes to the integrations tree.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Id of the integration's root node.
    fn id(&self) -> &str;

    /// Ordered child ids. `None` asks for root-level ids. Unknown parents yield nothing.
    fn get_children(&self, parent_id: Option<&str>) -> Vec<String>;

    /// Node lookup. Never polls.
    fn get_node(&self, id: &str) -> Option<DisplayNode>;

    /// Run one full reconciliation pass.
    async fn reconcile(&self) -> Result<ReconcileDelta, ReconcileError>;

    /// React to an event.
    async fn handle_event(&self, event: IntegrationEvent) -> Result<ReconcileDelta, ReconcileError>;

    /// Configuration files currently tracked by the integration.
    fn config_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}
