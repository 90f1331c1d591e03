//! Test fakes for the reconciler probes.
//!
//! Every fake is scriptable at runtime through interior mutability, so a
//! test can flip Docker off, add an image, or mark an image as managed
//! between two passes while the integration holds an `Arc` to the fake.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pyrsia_reconcile::{
    ConfigFileFinder, ConfigSearchPath, ContainerFilter, ContainerInfo, DockerIntegration,
    DockerProbe, IntegrationContext, LocalImage, NodeProbe, ProbeError, ProgressStream, PullEvent,
    ViewSignal,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Fake Pyrsia node.
pub struct FakeNode {
    healthy: AtomicBool,
    peers: AtomicU64,
    logs: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    accept_builds: AtomicBool,
    builds: Mutex<Vec<String>>,
    log_calls: AtomicUsize,
}

impl FakeNode {
    /// A healthy node that manages nothing.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            peers: AtomicU64::new(0),
            logs: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            accept_builds: AtomicBool::new(true),
            builds: Mutex::new(Vec::new()),
            log_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_peers(&self, peers: u64) {
        self.peers.store(peers, Ordering::SeqCst);
    }

    /// Give `identity` a one-entry transparency log.
    pub fn manage(&self, identity: &str) {
        let entry = json!({
            "id": format!("log-{identity}"),
            "package_type": "Docker",
            "package_specific_id": identity,
            "operation": "AddArtifact",
        });
        self.logs
            .lock()
            .unwrap()
            .insert(identity.to_string(), vec![entry]);
    }

    pub fn unmanage(&self, identity: &str) {
        self.logs.lock().unwrap().remove(identity);
    }

    /// Make transparency-log lookups for `identity` fail.
    pub fn fail_lookup(&self, identity: &str) {
        self.failing.lock().unwrap().insert(identity.to_string());
    }

    pub fn set_accept_builds(&self, accept: bool) {
        self.accept_builds.store(accept, Ordering::SeqCst);
    }

    /// Identities of every build requested so far.
    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().unwrap().clone()
    }

    /// Number of transparency-log lookups so far.
    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    fn unavailable() -> ProbeError {
        ProbeError::Unavailable {
            service: "pyrsia node",
            message: "fake node is down".to_string(),
        }
    }
}

impl Default for FakeNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeProbe for FakeNode {
    async fn probe_health(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    async fn peer_count(&self) -> Result<u64, ProbeError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.peers.load(Ordering::SeqCst))
    }

    async fn transparency_log(&self, identity: &str) -> Result<Vec<Value>, ProbeError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        if self.failing.lock().unwrap().contains(identity) {
            return Err(ProbeError::Request(format!("lookup of {identity} failed")));
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn request_build(&self, identity: &str) -> Result<Option<String>, ProbeError> {
        if !self.healthy.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let mut builds = self.builds.lock().unwrap();
        builds.push(identity.to_string());
        if self.accept_builds.load(Ordering::SeqCst) {
            Ok(Some(format!("build-{}", builds.len())))
        } else {
            Ok(None)
        }
    }
}

/// Fake Docker engine.
///
/// Removing an image drops it from the listing; a successful scripted pull
/// puts it back.
pub struct FakeDocker {
    up: AtomicBool,
    fail_listing: AtomicBool,
    images: Mutex<Vec<LocalImage>>,
    containers: Mutex<Vec<ContainerInfo>>,
    pull_script: Mutex<Vec<PullEvent>>,
    gated_pull: Mutex<Option<mpsc::Receiver<PullEvent>>>,
    removed: Mutex<Vec<String>>,
    pulled: Mutex<Vec<String>>,
    image_counter: AtomicU64,
}

impl FakeDocker {
    /// A reachable engine with no images.
    pub fn new() -> Self {
        Self {
            up: AtomicBool::new(true),
            fail_listing: AtomicBool::new(false),
            images: Mutex::new(Vec::new()),
            containers: Mutex::new(Vec::new()),
            pull_script: Mutex::new(vec![
                PullEvent::Progress("Pulling fs layer".to_string()),
                PullEvent::Progress("Download complete".to_string()),
                PullEvent::Finished(Ok(())),
            ]),
            gated_pull: Mutex::new(None),
            removed: Mutex::new(Vec::new()),
            pulled: Mutex::new(Vec::new()),
            image_counter: AtomicU64::new(0),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    /// Make image listing fail while ping still succeeds.
    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Add a tagged image (or an untagged one with `<none>:<none>`).
    pub fn add_image(&self, identity: &str) {
        let n = self.image_counter.fetch_add(1, Ordering::SeqCst);
        self.images
            .lock()
            .unwrap()
            .push(LocalImage::new(format!("sha256:{n:064x}"), identity));
    }

    pub fn remove(&self, identity: &str) {
        self.images
            .lock()
            .unwrap()
            .retain(|image| image.identity != identity);
    }

    /// Attach a container to an image.
    pub fn add_container(&self, image_identity: &str) {
        let mut containers = self.containers.lock().unwrap();
        let id = format!("container-{}", containers.len());
        containers.push(ContainerInfo {
            id,
            image_identity: image_identity.to_string(),
        });
    }

    /// Events yielded by every subsequent pull.
    pub fn script_pull(&self, events: Vec<PullEvent>) {
        *self.pull_script.lock().unwrap() = events;
    }

    /// Hand the next pull's events to the caller. The pull stays open until
    /// the returned sender sends `Finished` or is dropped.
    pub fn gate_next_pull(&self) -> mpsc::Sender<PullEvent> {
        let (tx, rx) = mpsc::channel(16);
        *self.gated_pull.lock().unwrap() = Some(rx);
        tx
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }

    fn check_up(&self) -> Result<(), ProbeError> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Unavailable {
                service: "docker",
                message: "fake engine is down".to_string(),
            })
        }
    }
}

impl Default for FakeDocker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DockerProbe for FakeDocker {
    async fn ping(&self) -> Result<(), ProbeError> {
        self.check_up()
    }

    async fn list_local_images(&self) -> Result<Vec<LocalImage>, ProbeError> {
        self.check_up()?;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ProbeError::Request("image listing failed".to_string()));
        }
        Ok(self.images.lock().unwrap().clone())
    }

    async fn list_containers(
        &self,
        filter: ContainerFilter,
    ) -> Result<Vec<ContainerInfo>, ProbeError> {
        self.check_up()?;
        debug!(all = filter.all, "[FAKE] Listing containers");
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn remove_image(&self, image: &LocalImage) -> Result<(), ProbeError> {
        self.check_up()?;
        self.remove(&image.identity);
        self.removed.lock().unwrap().push(image.identity.clone());
        Ok(())
    }

    async fn pull_image(&self, identity: &str) -> Result<ProgressStream, ProbeError> {
        self.check_up()?;
        self.pulled.lock().unwrap().push(identity.to_string());

        if let Some(rx) = self.gated_pull.lock().unwrap().take() {
            return Ok(Box::pin(ReceiverStream::new(rx)));
        }

        let events = self.pull_script.lock().unwrap().clone();
        if events
            .iter()
            .any(|event| matches!(event, PullEvent::Finished(Ok(()))))
        {
            self.add_image(identity);
        }
        Ok(Box::pin(tokio_stream::iter(events)))
    }
}

/// Fake filesystem holding a fixed set of existing files.
#[derive(Default)]
pub struct FakeFiles {
    files: Mutex<HashSet<PathBuf>>,
}

impl FakeFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, path: impl Into<PathBuf>) {
        self.files.lock().unwrap().insert(path.into());
    }

    pub fn delete(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }
}

#[async_trait]
impl ConfigFileFinder for FakeFiles {
    async fn find_config_file(&self, dir: &Path, file_name: &str) -> Option<PathBuf> {
        let path = dir.join(file_name);
        self.files.lock().unwrap().contains(&path).then_some(path)
    }
}

/// Fakes wired into an [`IntegrationContext`].
pub struct Harness {
    pub node: Arc<FakeNode>,
    pub docker: Arc<FakeDocker>,
    pub files: Arc<FakeFiles>,
    pub signal: ViewSignal,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            node: Arc::new(FakeNode::new()),
            docker: Arc::new(FakeDocker::new()),
            files: Arc::new(FakeFiles::new()),
            signal: ViewSignal::new(),
        }
    }

    pub fn context(&self) -> IntegrationContext {
        IntegrationContext::new(
            self.node.clone(),
            self.docker.clone(),
            self.files.clone(),
            self.signal.clone(),
        )
    }

    /// Docker integration searching `/home/test/.docker/daemon.json`.
    pub fn docker_integration(&self) -> Arc<DockerIntegration> {
        self.docker_integration_with(vec![ConfigSearchPath::new(
            "/home/test/.docker",
            "daemon.json",
        )])
    }

    pub fn docker_integration_with(
        &self,
        search_paths: Vec<ConfigSearchPath>,
    ) -> Arc<DockerIntegration> {
        Arc::new(DockerIntegration::new(self.context(), search_paths))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
