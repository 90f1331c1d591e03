//! Integration reconciliation.
//!
//! This library keeps an abstract tree of display nodes consistent with
//! external state polled from a Pyrsia node and the local Docker engine.
//! Key concepts:
//!
//! - **Integration**: A pluggable subsystem owning a subtree (see [`Integration`]).
//! - **Pass**: One poll of external state followed by one atomic model swap.
//! - **Busy image**: An image being replaced; passes never evict its node.
//! - **View signal**: Fired once per pass so renderers know to re-query.
//!
//! # Invariants
//!
//! - Node ids are unique within an integration and deterministic
//! - Repeating a pass against unchanged external state changes nothing
//! - Queries never poll and never observe a half-applied pass
//! - Probe failures become state (a warning node), never errors

pub mod docker;
pub mod fs;
pub mod integration;
pub mod node;
pub mod probe;
pub mod signal;
pub mod view;

use std::time::Duration;

use thiserror::Error;

pub use docker::{
    BuildOutcome, ConfigSearchPath, DockerIntegration, IntegrationState, ReplaceOutcome,
    ReplaceReport,
};
pub use fs::FsConfigFinder;
pub use integration::{Integration, IntegrationEvent, ReconcileDelta};
pub use node::{DisplayNode, Icon, NodeBody, NodeCommand, NodeKind, NodeUpdate, StatusTag};
pub use probe::{
    ConfigFileFinder, ContainerFilter, ContainerInfo, DockerProbe, IntegrationContext, LocalImage,
    NodeProbe, ProbeError, ProgressStream, PullEvent,
};
pub use signal::ViewSignal;
pub use view::IntegrationsView;

/// Default interval between periodic reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The integration was configured inconsistently.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// No node with the given id.
    #[error("node not found: {0}")]
    NotFound(String),

    /// A probe call failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    /// Whether the error is caused by an unreachable service rather than bad input.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Probe(ProbeError::Unavailable { .. }))
    }
}
