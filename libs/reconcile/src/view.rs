//! Integrations view aggregator.
//!
//! Presents the union of every registered integration as one tree. Queries
//! dispatch to the integration that owns the node; events fan out to all of
//! them. The aggregator itself holds no node state.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::integration::{Integration, IntegrationEvent, ReconcileDelta};
use crate::node::DisplayNode;
use crate::signal::ViewSignal;
use crate::ReconcileError;

/// Aggregated view over all integrations.
#[derive(Clone)]
pub struct IntegrationsView {
    integrations: Vec<Arc<dyn Integration>>,
    signal: ViewSignal,
}

impl IntegrationsView {
    /// `signal` must be the signal the integrations were built with.
    pub fn new(signal: ViewSignal) -> Self {
        Self {
            integrations: Vec::new(),
            signal,
        }
    }

    pub fn register(&mut self, integration: Arc<dyn Integration>) {
        debug!(integration = integration.id(), "Registered integration");
        self.integrations.push(integration);
    }

    pub fn with_integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.register(integration);
        self
    }

    /// Sorted, de-duplicated union of every integration's children.
    pub fn get_children(&self, parent_id: Option<&str>) -> Vec<String> {
        self.integrations
            .iter()
            .flat_map(|integration| integration.get_children(parent_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Node lookup across integrations. The first integration knowing the id wins.
    pub fn get_node(&self, id: &str) -> Option<DisplayNode> {
        self.integrations
            .iter()
            .find_map(|integration| integration.get_node(id))
    }

    /// Deliver an event to every integration and wait for all of them.
    ///
    /// Every integration handles the event even if another one fails; the
    /// first failure is returned.
    pub async fn dispatch(
        &self,
        event: IntegrationEvent,
    ) -> Result<Vec<ReconcileDelta>, ReconcileError> {
        let results = join_all(
            self.integrations
                .iter()
                .map(|integration| integration.handle_event(event)),
        )
        .await;

        let mut deltas = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (integration, result) in self.integrations.iter().zip(results) {
            match result {
                Ok(delta) => deltas.push(delta),
                Err(e) => {
                    error!(integration = integration.id(), error = %e, ?event, "Event handling failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(deltas),
        }
    }

    /// Start a pass on every integration without waiting. Errors are logged.
    pub fn trigger_reconciliation(&self) {
        for integration in &self.integrations {
            let integration = Arc::clone(integration);
            tokio::spawn(async move {
                if let Err(e) = integration.reconcile().await {
                    error!(integration = integration.id(), error = %e, "Reconciliation failed");
                }
            });
        }
    }

    /// Configuration files tracked by all integrations.
    pub fn config_files(&self) -> Vec<PathBuf> {
        self.integrations
            .iter()
            .flat_map(|integration| integration.config_files())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fires after every pass (and every busy-state change) of any integration.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.signal.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use super::*;
    use crate::node::{Icon, NodeBody};

    struct StaticIntegration {
        id: &'static str,
        nodes: BTreeMap<String, DisplayNode>,
        fail: bool,
    }

    impl StaticIntegration {
        fn new(id: &'static str, children: &[&str]) -> Self {
            let mut nodes = BTreeMap::new();
            nodes.insert(id.to_string(), leaf(id, None));
            for child in children {
                nodes.insert(child.to_string(), leaf(child, Some(id)));
            }
            Self {
                id,
                nodes,
                fail: false,
            }
        }
    }

    fn leaf(id: &str, parent: Option<&str>) -> DisplayNode {
        DisplayNode {
            id: id.to_string(),
            parent: parent.map(str::to_string),
            label: id.to_string(),
            icon: Icon::Archive,
            tooltip: None,
            command: None,
            status: None,
            body: match parent {
                None => NodeBody::Root { available: true },
                Some(_) => NodeBody::Image {
                    image: id.to_string(),
                },
            },
        }
    }

    #[async_trait]
    impl Integration for StaticIntegration {
        fn id(&self) -> &str {
            self.id
        }

        fn get_children(&self, parent_id: Option<&str>) -> Vec<String> {
            self.nodes
                .values()
                .filter(|n| n.parent.as_deref() == parent_id)
                .filter(|n| parent_id.is_some() || n.id == self.id)
                .map(|n| n.id.clone())
                .collect()
        }

        fn get_node(&self, id: &str) -> Option<DisplayNode> {
            self.nodes.get(id).cloned()
        }

        async fn reconcile(&self) -> Result<ReconcileDelta, ReconcileError> {
            if self.fail {
                return Err(ReconcileError::Internal("boom".to_string()));
            }
            Ok(ReconcileDelta::default())
        }

        async fn handle_event(
            &self,
            _event: IntegrationEvent,
        ) -> Result<ReconcileDelta, ReconcileError> {
            self.reconcile().await
        }
    }

    #[test]
    fn test_children_union_sorted_dedup() {
        let view = IntegrationsView::new(ViewSignal::new())
            .with_integration(Arc::new(StaticIntegration::new("b.root", &["b.root.x"])))
            .with_integration(Arc::new(StaticIntegration::new("a.root", &["a.root.y"])))
            .with_integration(Arc::new(StaticIntegration::new("a.root", &["a.root.y"])));

        assert_eq!(view.get_children(None), vec!["a.root", "b.root"]);
        assert_eq!(view.get_children(Some("a.root")), vec!["a.root.y"]);
        assert!(view.get_children(Some("missing")).is_empty());
        assert_eq!(view.get_node("b.root.x").map(|n| n.label), Some("b.root.x".to_string()));
        assert!(view.get_node("missing").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_reports_failure_after_all_handled() {
        let mut failing = StaticIntegration::new("a.root", &[]);
        failing.fail = true;
        let view = IntegrationsView::new(ViewSignal::new())
            .with_integration(Arc::new(failing))
            .with_integration(Arc::new(StaticIntegration::new("b.root", &[])));

        let err = view.dispatch(IntegrationEvent::ModelUpdate).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Internal(_)));
    }

    #[tokio::test]
    async fn test_empty_view() {
        let view = IntegrationsView::new(ViewSignal::new());
        assert!(view.get_children(None).is_empty());
        assert!(view.dispatch(IntegrationEvent::ModelUpdate).await.unwrap().is_empty());
        assert!(view.config_files().is_empty());
    }
}
