//! Connection status line.

use colored::Colorize;
use pyrsia_node_config::NodeConfigStore;
use pyrsia_reconcile::NodeProbe;
use serde::Serialize;
use tracing::debug;

const LABEL: &str = "● Pyrsia";

/// Snapshot of the connection to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Connected peers, when the node reported them.
    pub peers: Option<u64>,
    pub address: String,
}

impl ConnectionStatus {
    /// Probe the node at the store's current address.
    pub async fn refresh(store: &NodeConfigStore, node: &dyn NodeProbe) -> Self {
        let address = store.address_with_scheme();
        let connected = node.probe_health().await;
        let peers = if connected {
            match node.peer_count().await {
                Ok(peers) => Some(peers),
                Err(e) => {
                    debug!(error = %e, "Failed to fetch peer count");
                    None
                }
            }
        } else {
            None
        };

        Self {
            connected,
            peers,
            address,
        }
    }

    /// Detail message shown next to the status text.
    pub fn message(&self) -> String {
        if self.connected {
            format!("Connected, Pyrsia node: '{}'", self.address)
        } else {
            format!("Not connected, Pyrsia node: '{}'", self.address)
        }
    }

    /// Colored one-line rendering.
    pub fn render(&self) -> String {
        let label = if self.connected {
            LABEL.green().bold()
        } else {
            LABEL.red().bold()
        };
        let mut line = format!("{label}  {}", self.message());
        if let Some(peers) = self.peers {
            line.push_str(&format!(" ({peers} peers)").dimmed().to_string());
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pyrsia_node_config::MemoryState;
    use pyrsia_testing::FakeNode;

    use super::*;

    fn store() -> NodeConfigStore {
        NodeConfigStore::new(Arc::new(MemoryState::new()))
    }

    #[tokio::test]
    async fn test_connected() {
        let node = FakeNode::new();
        node.set_peers(4);

        let status = ConnectionStatus::refresh(&store(), &node).await;
        assert_eq!(
            status,
            ConnectionStatus {
                connected: true,
                peers: Some(4),
                address: "http://localhost:7888".to_string(),
            }
        );
        assert_eq!(status.message(), "Connected, Pyrsia node: 'http://localhost:7888'");
        assert!(status.render().contains("Pyrsia"));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let node = FakeNode::new();
        node.set_healthy(false);

        let status = ConnectionStatus::refresh(&store(), &node).await;
        assert!(!status.connected);
        assert_eq!(status.peers, None);
        assert_eq!(
            status.message(),
            "Not connected, Pyrsia node: 'http://localhost:7888'"
        );
    }
}
