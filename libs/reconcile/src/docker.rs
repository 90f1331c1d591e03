//! Docker integration reconciler.
//!
//! Owns the display nodes of the Docker integration and keeps them consistent
//! with polled state:
//!
//! ```text
//! pyrsia.docker                         Docker
//! ├── pyrsia.docker.configs             Configuration
//! │   └── pyrsia.docker.config-file.<path>
//! └── pyrsia.docker.images              Images
//!     └── pyrsia.docker.docker-image.<repository:tag>
//! ```
//!
//! While Docker or the node is unreachable the whole subtree collapses to a
//! single warning root node.
//!
//! Passes are serialized. Each pass polls first, then builds the next
//! collection from the current one and swaps it in under a single write
//! lock, so queries never observe a half-applied pass. Images being replaced
//! are "busy": a pass never evicts their nodes even if the image is briefly
//! missing from the engine's list.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::integration::{Integration, IntegrationEvent, ReconcileDelta};
use crate::node::{
    DisplayNode, Icon, NodeBody, NodeCommand, NodeKind, NodeUpdate, NodeUpdaters, DOCKER_LABEL,
};
use crate::probe::{ContainerFilter, IntegrationContext, LocalImage, PullEvent};
use crate::ReconcileError;

/// Node ids of the Docker integration.
pub mod ids {
    use std::path::Path;

    pub const INTEGRATION: &str = "pyrsia.docker";
    pub const CONFIGS: &str = "pyrsia.docker.configs";
    pub const IMAGES: &str = "pyrsia.docker.images";
    pub const CONFIG_FILE_PREFIX: &str = "pyrsia.docker.config-file";
    pub const IMAGE_PREFIX: &str = "pyrsia.docker.docker-image";

    pub fn config_file(path: &Path) -> String {
        format!("{CONFIG_FILE_PREFIX}.{}", path.display())
    }

    pub fn image(identity: &str) -> String {
        format!("{IMAGE_PREFIX}.{identity}")
    }
}

/// Command ids bound to Docker nodes.
pub mod commands {
    pub const UPDATE_CONFIG: &str = "pyrsia.docker.update-config";
    pub const REPLACE_IMAGES: &str = "pyrsia.docker.replace-images";
    pub const OPEN_TRANS_LOG: &str = "pyrsia.docker.open-trans-log";
    pub const REQUEST_BUILD: &str = "pyrsia.docker.request-build";
}

/// A location where a Docker configuration file may live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSearchPath {
    pub dir: PathBuf,
    pub file_name: String,
}

impl ConfigSearchPath {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    /// Standard `daemon.json` locations for this platform.
    pub fn docker_defaults() -> Vec<Self> {
        let mut paths = Vec::new();
        if let Some(dirs) = directories::BaseDirs::new() {
            paths.push(Self::new(dirs.home_dir().join(".docker"), "daemon.json"));
        }
        if cfg!(target_os = "linux") {
            paths.push(Self::new("/etc/docker", "daemon.json"));
        }
        paths
    }
}

/// Integration-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationState {
    /// No pass has completed yet.
    Unknown,
    /// Docker or the node is unreachable.
    Down,
    /// Both reachable, full node set populated.
    Up,
}

/// Outcome of replacing one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Removed and pulled again.
    Replaced,
    /// The node does not manage the image; left untouched.
    NotManaged,
    /// Containers still use the image; left untouched.
    HasContainers(usize),
    /// Removal or pull failed.
    Failed(String),
}

/// Per-image result of [`DockerIntegration::replace_images_with_node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceReport {
    pub identity: String,
    pub outcome: ReplaceOutcome,
}

/// Outcome of a build request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Accepted { build_id: String },
    Rejected,
}

/// Everything one pass observed.
struct Observation {
    config_files: Vec<PathBuf>,
    images: Vec<(String, bool)>,
}

struct Model {
    state: IntegrationState,
    nodes: BTreeMap<String, DisplayNode>,
}

/// Reconciler for the Docker integration.
pub struct DockerIntegration {
    ctx: IntegrationContext,
    search_paths: Vec<ConfigSearchPath>,
    updaters: NodeUpdaters,
    model: RwLock<Model>,
    /// Identities of images with a replacement in flight.
    busy: Mutex<HashSet<String>>,
    pass_lock: tokio::sync::Mutex<()>,
}

impl DockerIntegration {
    /// Create the integration with its structural nodes in place.
    pub fn new(ctx: IntegrationContext, search_paths: Vec<ConfigSearchPath>) -> Self {
        let updaters = NodeUpdaters::docker();
        let mut nodes = BTreeMap::new();
        insert_structural(&mut nodes);

        Self {
            ctx,
            search_paths,
            updaters,
            model: RwLock::new(Model {
                state: IntegrationState::Unknown,
                nodes,
            }),
            busy: Mutex::new(HashSet::new()),
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current integration state.
    pub fn state(&self) -> IntegrationState {
        self.read_model().state
    }

    /// Identities of images currently being replaced, sorted.
    pub fn busy_images(&self) -> Vec<String> {
        let busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        let mut images: Vec<String> = busy.iter().cloned().collect();
        images.sort();
        images
    }

    /// Run a pass in the background. Errors are logged.
    pub fn trigger_reconciliation(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.reconcile_pass().await {
                error!(integration = ids::INTEGRATION, error = %e, "Reconciliation failed");
            }
        });
    }

    /// Run one full reconciliation pass.
    ///
    /// Probe failures are turned into state. The only error is an integrity
    /// violation in the configured search paths.
    pub async fn reconcile_pass(&self) -> Result<ReconcileDelta, ReconcileError> {
        let _pass = self.pass_lock.lock().await;

        for search in &self.search_paths {
            if search.file_name.trim().is_empty() {
                return Err(ReconcileError::Integrity(format!(
                    "configuration file name missing for {:?}",
                    search.dir
                )));
            }
        }

        let docker_up = match self.ctx.docker.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Docker ping failed");
                false
            }
        };
        let node_up = self.ctx.node.probe_health().await;

        let observation = if docker_up && node_up {
            self.observe().await
        } else {
            None
        };

        let delta = {
            let mut model = self.write_model();
            let previous = model.state;
            let (state, next) = match observation {
                Some(observation) => (IntegrationState::Up, self.build_up(&model.nodes, observation)),
                None => (IntegrationState::Down, self.build_down()),
            };

            let delta = ReconcileDelta::between(&model.nodes, &next);
            model.nodes = next;
            model.state = state;

            if previous != state {
                info!(
                    from = ?previous,
                    to = ?state,
                    docker_up,
                    node_up,
                    "Docker integration state changed"
                );
            }
            delta
        };

        debug!(
            created = delta.created.len(),
            updated = delta.updated.len(),
            removed = delta.removed.len(),
            "Reconciliation pass complete"
        );
        self.ctx.signal.notify();
        Ok(delta)
    }

    /// Poll config files and images. `None` means the engine became unusable mid-pass.
    async fn observe(&self) -> Option<Observation> {
        let mut config_files = Vec::new();
        for search in &self.search_paths {
            match self
                .ctx
                .files
                .find_config_file(&search.dir, &search.file_name)
                .await
            {
                Some(path) => config_files.push(path),
                None => debug!(
                    path = ?search.dir.join(&search.file_name),
                    "No Docker configuration file"
                ),
            }
        }

        let images = match self.ctx.docker.list_local_images().await {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "Failed to list Docker images");
                return None;
            }
        };

        let identities: BTreeSet<String> = images
            .iter()
            .filter_map(LocalImage::display_identity)
            .map(str::to_string)
            .collect();

        let node = &self.ctx.node;
        let lookups = identities.into_iter().map(|identity| async move {
            let managed = node.is_managed_by_node(&identity).await;
            (identity, managed)
        });
        let images = join_all(lookups).await;

        Some(Observation {
            config_files,
            images,
        })
    }

    fn build_up(
        &self,
        current: &BTreeMap<String, DisplayNode>,
        observation: Observation,
    ) -> BTreeMap<String, DisplayNode> {
        let busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let mut next = current.clone();

        insert_structural(&mut next);

        let mut seen_configs = HashSet::new();
        for path in observation.config_files {
            let node = config_file_node(&path);
            seen_configs.insert(node.id.clone());
            next.insert(node.id.clone(), node);
        }

        let mut observed = HashSet::new();
        for (identity, managed) in observation.images {
            let id = ids::image(&identity);
            observed.insert(id.clone());

            if busy.contains(&identity) {
                next.entry(id).or_insert_with(|| {
                    let mut node = image_node(&identity);
                    self.updaters
                        .apply(&mut node, &NodeUpdate::Progress { detail: None });
                    node
                });
                continue;
            }

            let mut node = image_node(&identity);
            self.updaters
                .apply(&mut node, &NodeUpdate::Provenance { managed });
            next.insert(id, node);
        }

        next.retain(|id, node| match node.kind() {
            NodeKind::ConfigFile => seen_configs.contains(id),
            NodeKind::Image => {
                observed.contains(id) || node.image().is_some_and(|image| busy.contains(image))
            }
            NodeKind::Root | NodeKind::Category => true,
        });

        next
    }

    fn build_down(&self) -> BTreeMap<String, DisplayNode> {
        let mut root = root_node();
        self.updaters
            .apply(&mut root, &NodeUpdate::Availability { available: false });

        let mut next = BTreeMap::new();
        next.insert(root.id.clone(), root);
        next
    }

    /// Mark an image busy and show it as being pulled.
    pub fn begin_busy(&self, identity: &str) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.to_string());

        self.apply_to_image(identity, &NodeUpdate::Progress { detail: None }, true);
        info!(identity = %identity, "Image replacement started");
        self.ctx.signal.notify();
    }

    /// Record a progress line for a busy image.
    pub fn report_progress(&self, identity: &str, detail: &str) {
        self.apply_to_image(
            identity,
            &NodeUpdate::Progress {
                detail: Some(detail.to_string()),
            },
            false,
        );
        self.ctx.signal.notify();
    }

    /// Leave the busy state. The image node is dropped so the next pass recreates it.
    pub fn end_busy(&self, identity: &str) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity);

        self.write_model().nodes.remove(&ids::image(identity));
        info!(identity = %identity, "Image replacement finished");
        self.ctx.signal.notify();
    }

    fn apply_to_image(&self, identity: &str, update: &NodeUpdate, create: bool) {
        let id = ids::image(identity);
        let mut model = self.write_model();
        if model.state == IntegrationState::Down {
            return;
        }
        match model.nodes.get_mut(&id) {
            Some(node) => self.updaters.apply(node, update),
            None if create => {
                let mut node = image_node(identity);
                self.updaters.apply(&mut node, update);
                model.nodes.insert(id, node);
            }
            None => {}
        }
    }

    /// Replace every local image the node manages with a fresh pull.
    ///
    /// Images with containers attached are skipped. Runs a pass at the end so
    /// replaced images reappear with their current status.
    pub async fn replace_images_with_node(&self) -> Result<Vec<ReplaceReport>, ReconcileError> {
        let images = self.ctx.docker.list_local_images().await?;
        let containers = self
            .ctx
            .docker
            .list_containers(ContainerFilter { all: true })
            .await?;

        let mut reports = Vec::new();
        for image in &images {
            let Some(identity) = image.display_identity() else {
                continue;
            };

            let outcome = if !self.ctx.node.is_managed_by_node(identity).await {
                ReplaceOutcome::NotManaged
            } else {
                let attached = containers
                    .iter()
                    .filter(|c| c.image_identity == identity || c.image_identity == image.id)
                    .count();
                if attached > 0 {
                    warn!(
                        identity = %identity,
                        containers = attached,
                        "Not replacing image with containers attached"
                    );
                    ReplaceOutcome::HasContainers(attached)
                } else {
                    self.replace_one(image, identity).await
                }
            };

            reports.push(ReplaceReport {
                identity: identity.to_string(),
                outcome,
            });
        }

        if reports
            .iter()
            .any(|r| !matches!(r.outcome, ReplaceOutcome::NotManaged))
        {
            self.reconcile_pass().await?;
        }

        Ok(reports)
    }

    async fn replace_one(&self, image: &LocalImage, identity: &str) -> ReplaceOutcome {
        self.begin_busy(identity);

        let outcome = match self.ctx.docker.replace_image(image).await {
            Ok(mut progress) => {
                let mut outcome =
                    ReplaceOutcome::Failed("progress stream ended without a result".to_string());
                while let Some(event) = progress.next().await {
                    match event {
                        PullEvent::Progress(line) => self.report_progress(identity, &line),
                        PullEvent::Finished(Ok(())) => {
                            outcome = ReplaceOutcome::Replaced;
                            break;
                        }
                        PullEvent::Finished(Err(message)) => {
                            outcome = ReplaceOutcome::Failed(message);
                            break;
                        }
                    }
                }
                outcome
            }
            Err(e) => ReplaceOutcome::Failed(e.to_string()),
        };

        if let ReplaceOutcome::Failed(message) = &outcome {
            warn!(identity = %identity, error = %message, "Image replacement failed");
        }

        self.end_busy(identity);
        outcome
    }

    /// Ask the node to build the image behind an image node.
    pub async fn request_build(&self, node_id: &str) -> Result<BuildOutcome, ReconcileError> {
        let identity = self.image_identity(node_id)?;
        info!(identity = %identity, "Requesting Pyrsia build");

        match self.ctx.node.request_build(&identity).await? {
            Some(build_id) => Ok(BuildOutcome::Accepted { build_id }),
            None => Ok(BuildOutcome::Rejected),
        }
    }

    /// Transparency log of the image behind an image node, as `{ "<image>": [...] }`.
    pub async fn transparency_log(&self, node_id: &str) -> Result<Value, ReconcileError> {
        let identity = self.image_identity(node_id)?;
        let entries = self.ctx.node.transparency_log(&identity).await?;

        let mut document = serde_json::Map::new();
        document.insert(identity, Value::Array(entries));
        Ok(Value::Object(document))
    }

    fn image_identity(&self, node_id: &str) -> Result<String, ReconcileError> {
        self.read_model()
            .nodes
            .get(node_id)
            .and_then(|node| node.image().map(str::to_string))
            .ok_or_else(|| ReconcileError::NotFound(node_id.to_string()))
    }

    fn read_model(&self) -> std::sync::RwLockReadGuard<'_, Model> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_model(&self) -> std::sync::RwLockWriteGuard<'_, Model> {
        self.model.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Integration for DockerIntegration {
    fn id(&self) -> &str {
        ids::INTEGRATION
    }

    fn get_children(&self, parent_id: Option<&str>) -> Vec<String> {
        let model = self.read_model();

        let mut children: Vec<String> = match parent_id {
            None => model
                .nodes
                .values()
                .filter(|node| node.kind() == NodeKind::Root)
                .map(|node| node.id.clone())
                .collect(),
            Some(parent_id) => match model.nodes.get(parent_id) {
                Some(parent) => model
                    .nodes
                    .values()
                    .filter(|node| parent.is_parent_of(node))
                    .map(|node| node.id.clone())
                    .collect(),
                None => Vec::new(),
            },
        };

        children.sort();
        children
    }

    fn get_node(&self, id: &str) -> Option<DisplayNode> {
        self.read_model().nodes.get(id).cloned()
    }

    async fn reconcile(&self) -> Result<ReconcileDelta, ReconcileError> {
        self.reconcile_pass().await
    }

    async fn handle_event(&self, event: IntegrationEvent) -> Result<ReconcileDelta, ReconcileError> {
        debug!(?event, "Docker integration event");
        self.reconcile_pass().await
    }

    fn config_files(&self) -> Vec<PathBuf> {
        self.read_model()
            .nodes
            .values()
            .filter_map(|node| node.config_path().cloned())
            .collect()
    }
}

fn root_node() -> DisplayNode {
    DisplayNode {
        id: ids::INTEGRATION.to_string(),
        parent: None,
        label: DOCKER_LABEL.to_string(),
        icon: Icon::Docker,
        tooltip: None,
        command: None,
        status: None,
        body: NodeBody::Root { available: true },
    }
}

fn category_node(id: &str, label: &str, icon: Icon, child_prefix: &str) -> DisplayNode {
    DisplayNode {
        id: id.to_string(),
        parent: Some(ids::INTEGRATION.to_string()),
        label: label.to_string(),
        icon,
        tooltip: None,
        command: None,
        status: None,
        body: NodeBody::Category {
            child_prefix: child_prefix.to_string(),
        },
    }
}

fn insert_structural(nodes: &mut BTreeMap<String, DisplayNode>) {
    let root = root_node();
    nodes.insert(root.id.clone(), root);

    let configs = category_node(
        ids::CONFIGS,
        "Configuration",
        Icon::Gear,
        ids::CONFIG_FILE_PREFIX,
    );
    nodes.insert(configs.id.clone(), configs);

    let mut images = category_node(
        ids::IMAGES,
        "Images",
        Icon::FolderLibrary,
        ids::IMAGE_PREFIX,
    );
    images.command = Some(NodeCommand::new(
        commands::REPLACE_IMAGES,
        "Replace local images with Pyrsia images",
        None,
    ));
    nodes.insert(images.id.clone(), images);
}

fn config_file_node(path: &Path) -> DisplayNode {
    let id = ids::config_file(path);
    DisplayNode {
        command: Some(NodeCommand::new(
            commands::UPDATE_CONFIG,
            "Open Docker configuration file",
            Some(id.clone()),
        )),
        id,
        parent: Some(ids::CONFIGS.to_string()),
        label: path.display().to_string(),
        icon: Icon::GoToFile,
        tooltip: None,
        status: None,
        body: NodeBody::ConfigFile {
            path: path.to_path_buf(),
        },
    }
}

fn image_node(identity: &str) -> DisplayNode {
    DisplayNode {
        id: ids::image(identity),
        parent: Some(ids::IMAGES.to_string()),
        label: identity.to_string(),
        icon: Icon::Archive,
        tooltip: None,
        command: None,
        status: None,
        body: NodeBody::Image {
            image: identity.to_string(),
        },
    }
}
