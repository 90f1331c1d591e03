//! Refresh loop.
//!
//! Drives the panel while `watch` runs:
//! - every refresh interval: refresh the status line, reconcile all integrations
//! - on node address change: notify integrations, re-check mirrors, refresh the status line
//! - on view change: ask the caller to re-render

use std::path::PathBuf;
use std::time::Duration;

use pyrsia_node_config::NodeAddress;
use pyrsia_reconcile::IntegrationEvent;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::mirror;
use crate::panel::Panel;
use crate::status_bar::ConnectionStatus;

/// Something the renderer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// The connection status was refreshed.
    Status(ConnectionStatus),
    /// The integrations tree changed.
    ViewChanged,
    /// Docker configuration files that do not list the current node as a mirror.
    MirrorMissing(Vec<PathBuf>),
}

/// Refresh loop over a [`Panel`].
pub struct Refresher {
    panel: Panel,
    interval: Duration,
}

impl Refresher {
    pub fn new(panel: Panel, interval: Duration) -> Self {
        Self { panel, interval }
    }

    /// Run until shutdown, reporting to `on_event`.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        mut on_event: impl FnMut(RefreshEvent) + Send,
    ) {
        info!(
            refresh_interval_secs = self.interval.as_secs(),
            "Starting refresh loop"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut address_rx = self.panel.store.subscribe();
        let mut view_rx = self.panel.view.subscribe();
        let mut connected = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let status = self.refresh_status(&mut connected).await;
                    on_event(RefreshEvent::Status(status));
                    self.panel.view.trigger_reconciliation();
                }
                changed = address_rx.changed() => {
                    if changed.is_err() {
                        debug!("Node configuration store dropped");
                        break;
                    }
                    let address = address_rx.borrow_and_update().clone();
                    info!(address = %address, "Node address changed");

                    if let Err(e) = self
                        .panel
                        .view
                        .dispatch(IntegrationEvent::NodeConfigurationUpdate)
                        .await
                    {
                        error!(error = %e, "Failed to apply node address change");
                    }

                    let missing = self.files_missing_mirror(&address);
                    if !missing.is_empty() {
                        on_event(RefreshEvent::MirrorMissing(missing));
                    }

                    let status = self.refresh_status(&mut connected).await;
                    on_event(RefreshEvent::Status(status));
                }
                changed = view_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    view_rx.borrow_and_update();
                    on_event(RefreshEvent::ViewChanged);
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Refresh loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn refresh_status(&self, connected: &mut Option<bool>) -> ConnectionStatus {
        let status = ConnectionStatus::refresh(&self.panel.store, self.panel.node.as_ref()).await;
        match *connected {
            Some(previous) if previous == status.connected => {}
            Some(_) if status.connected => info!(address = %status.address, "Node connection restored"),
            Some(_) => warn!(address = %status.address, "Node connection lost"),
            None => debug!(connected = status.connected, "Initial node status"),
        }
        *connected = Some(status.connected);
        status
    }

    fn files_missing_mirror(&self, address: &NodeAddress) -> Vec<PathBuf> {
        self.panel
            .view
            .config_files()
            .into_iter()
            .filter(|path| match mirror::check_mirror(path, address) {
                Ok(present) => !present,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot check registry mirrors");
                    false
                }
            })
            .collect()
    }
}
