//! External probe capabilities.
//!
//! The reconciler never talks to the node or to Docker directly. It consumes
//! these traits; the binary provides HTTP and docker-CLI implementations and
//! tests provide in-memory fakes.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::signal::ViewSignal;

/// Errors from probe calls.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The service could not be reached.
    #[error("{service} is unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The service answered with an error.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A local container image as reported by Docker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    /// Engine image id.
    pub id: String,
    /// `repository:tag`. Empty or `<none>...` for untagged images.
    pub identity: String,
    /// Raw label as reported by the engine.
    pub raw_label: String,
}

impl LocalImage {
    pub fn new(id: impl Into<String>, identity: impl Into<String>) -> Self {
        let identity = identity.into();
        Self {
            id: id.into(),
            raw_label: identity.clone(),
            identity,
        }
    }

    /// Identity usable for display, `None` for untagged images.
    pub fn display_identity(&self) -> Option<&str> {
        let identity = self.identity.trim();
        if identity.is_empty() || identity.starts_with("<none>") {
            None
        } else {
            Some(identity)
        }
    }
}

/// Filter for container listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    /// Include stopped containers.
    pub all: bool,
}

/// A container as reported by Docker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    /// Image the container was created from (`repository:tag` or image id).
    pub image_identity: String,
}

/// Progress of a long-running image operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullEvent {
    /// Intermediate progress line.
    Progress(String),
    /// Terminal event: success, or the failure message.
    Finished(Result<(), String>),
}

/// Stream of progress events. Ends after a `Finished` event.
pub type ProgressStream = Pin<Box<dyn Stream<Item = PullEvent> + Send>>;

/// Node-side capabilities.
#[async_trait]
pub trait NodeProbe: Send + Sync {
    /// Whether the node answers its health endpoint. Never fails.
    async fn probe_health(&self) -> bool;

    /// Number of connected peers.
    async fn peer_count(&self) -> Result<u64, ProbeError>;

    /// Transparency log entries for an image.
    async fn transparency_log(&self, identity: &str) -> Result<Vec<Value>, ProbeError>;

    /// Ask the node to build (ingest) an image. Returns the build id if accepted.
    async fn request_build(&self, identity: &str) -> Result<Option<String>, ProbeError>;

    /// Whether the node manages the image. Lookup failures count as "no".
    async fn is_managed_by_node(&self, identity: &str) -> bool {
        match self.transparency_log(identity).await {
            Ok(log) => !log.is_empty(),
            Err(e) => {
                warn!(identity = %identity, error = %e, "Provenance lookup failed");
                false
            }
        }
    }
}

/// Docker-side capabilities.
#[async_trait]
pub trait DockerProbe: Send + Sync {
    /// Check the daemon is reachable.
    async fn ping(&self) -> Result<(), ProbeError>;

    async fn list_local_images(&self) -> Result<Vec<LocalImage>, ProbeError>;

    async fn list_containers(&self, filter: ContainerFilter)
        -> Result<Vec<ContainerInfo>, ProbeError>;

    /// Force-remove an image.
    async fn remove_image(&self, image: &LocalImage) -> Result<(), ProbeError>;

    /// Start pulling an image, returning its progress.
    async fn pull_image(&self, identity: &str) -> Result<ProgressStream, ProbeError>;

    /// Remove the local copy and pull the image again.
    async fn replace_image(&self, image: &LocalImage) -> Result<ProgressStream, ProbeError> {
        self.remove_image(image).await?;
        self.pull_image(&image.identity).await
    }
}

/// Configuration file lookup.
#[async_trait]
pub trait ConfigFileFinder: Send + Sync {
    /// Path of `file_name` directly inside `dir`, if present.
    async fn find_config_file(&self, dir: &Path, file_name: &str) -> Option<PathBuf>;
}

/// Everything an integration needs from the outside world.
///
/// Constructed once by the caller and handed to each integration.
#[derive(Clone)]
pub struct IntegrationContext {
    pub node: Arc<dyn NodeProbe>,
    pub docker: Arc<dyn DockerProbe>,
    pub files: Arc<dyn ConfigFileFinder>,
    pub signal: ViewSignal,
}

impl IntegrationContext {
    pub fn new(
        node: Arc<dyn NodeProbe>,
        docker: Arc<dyn DockerProbe>,
        files: Arc<dyn ConfigFileFinder>,
        signal: ViewSignal,
    ) -> Self {
        Self {
            node,
            docker,
            files,
            signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("alpine:3.19", Some("alpine:3.19"))]
    #[case("  alpine:latest ", Some("alpine:latest"))]
    #[case("<none>:<none>", None)]
    #[case("", None)]
    fn test_display_identity(#[case] identity: &str, #[case] expected: Option<&str>) {
        assert_eq!(LocalImage::new("sha256:1", identity).display_identity(), expected);
    }
}
