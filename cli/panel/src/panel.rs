//! Wiring of the store, probes, integrations and view.

use std::sync::Arc;

use pyrsia_node_config::NodeConfigStore;
use pyrsia_reconcile::{
    ConfigFileFinder, ConfigSearchPath, DockerIntegration, DockerProbe, IntegrationContext,
    IntegrationsView, NodeProbe, ViewSignal,
};

use crate::client::NodeClient;
use crate::config::PanelConfig;
use crate::docker::DockerCli;

/// Everything a command or the refresh loop operates on.
#[derive(Clone)]
pub struct Panel {
    pub store: Arc<NodeConfigStore>,
    pub node: Arc<dyn NodeProbe>,
    pub docker: Arc<DockerIntegration>,
    pub view: IntegrationsView,
}

impl Panel {
    /// Build a panel from explicit probes.
    pub fn new(
        store: Arc<NodeConfigStore>,
        node: Arc<dyn NodeProbe>,
        docker: Arc<dyn DockerProbe>,
        files: Arc<dyn ConfigFileFinder>,
        search_paths: Vec<ConfigSearchPath>,
    ) -> Self {
        let signal = ViewSignal::new();
        let ctx = IntegrationContext::new(Arc::clone(&node), docker, files, signal.clone());
        let docker = Arc::new(DockerIntegration::new(ctx, search_paths));
        let view = IntegrationsView::new(signal).with_integration(docker.clone());

        Self {
            store,
            node,
            docker,
            view,
        }
    }

    /// Build a panel talking to the real node and docker CLI.
    pub fn connect(store: Arc<NodeConfigStore>, config: &PanelConfig) -> Self {
        let node = Arc::new(NodeClient::new(Arc::clone(&store), config.request_timeout));
        let docker = Arc::new(DockerCli::new(&config.docker_bin));
        Self::new(
            store,
            node,
            docker,
            Arc::new(pyrsia_reconcile::FsConfigFinder),
            ConfigSearchPath::docker_defaults(),
        )
    }
}
