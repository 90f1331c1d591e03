//! Panel commands.

mod docker;
mod node;
mod tree;
mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pyrsia_node_config::{
    JsonFileState, MemoryState, NodeAddress, NodeConfigStore, StateBackend, NODE_URL_KEY,
    STATE_FILE,
};
use serde_json::Value;

use crate::config::PanelConfig;
use crate::output::OutputFormat;
use crate::panel::Panel;

/// Pyrsia panel - browse and manage a Pyrsia node and its Docker integration.
#[derive(Debug, Parser)]
#[command(name = "pyrsia-panel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Node address for this invocation only (not persisted).
    #[arg(long, global = true, env = "PYRSIA_NODE")]
    node: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Keep the integrations tree up to date and re-render it on change.
    Watch(watch::WatchCommand),

    /// Reconcile once and print the integrations tree.
    Tree,

    /// Show or change the node connection.
    Node(node::NodeCommand),

    /// Docker integration commands.
    Docker(docker::DockerCommand),

    /// Show panel version.
    Version,
}

impl Cli {
    /// Run the command.
    pub async fn run(self, config: PanelConfig) -> Result<()> {
        let ctx = CommandContext {
            format: OutputFormat::parse(&self.format),
            node_override: self.node.or_else(|| config.node_address.clone()),
            config,
        };

        match self.command {
            Commands::Watch(cmd) => cmd.run(ctx).await,
            Commands::Tree => tree::run(ctx).await,
            Commands::Node(cmd) => cmd.run(ctx).await,
            Commands::Docker(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("pyrsia-panel {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: PanelConfig,
    pub format: OutputFormat,
    /// Address given on the command line or in the environment.
    pub node_override: Option<String>,
}

impl CommandContext {
    /// Open the persisted state file.
    pub fn state(&self) -> Result<JsonFileState> {
        let state = match &self.config.state_dir {
            Some(dir) => JsonFileState::open(dir.join(STATE_FILE)),
            None => JsonFileState::open_default(),
        };
        state.context("Failed to open panel state")
    }

    /// Store backed by the state file, ignoring any address override.
    pub fn persistent_store(&self) -> Result<Arc<NodeConfigStore>> {
        Ok(Arc::new(NodeConfigStore::new(Arc::new(self.state()?))))
    }

    /// Store for read-mostly commands. An address override lives in memory only.
    pub fn store(&self) -> Result<Arc<NodeConfigStore>> {
        match &self.node_override {
            Some(address) => {
                let address = NodeAddress::parse(address)
                    .with_context(|| format!("Invalid node address '{address}'"))?;
                let backend: Arc<dyn StateBackend> = Arc::new(
                    MemoryState::new().with(NODE_URL_KEY, Value::String(address.with_scheme())),
                );
                Ok(Arc::new(NodeConfigStore::new(backend)))
            }
            None => self.persistent_store(),
        }
    }

    /// Panel wired to the real node and docker CLI.
    pub fn panel(&self) -> Result<Panel> {
        Ok(Panel::connect(self.store()?, &self.config))
    }
}
