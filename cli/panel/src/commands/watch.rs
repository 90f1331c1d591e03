//! Watch the integrations tree.

use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use clap::Args;
use colored::Colorize;
use pyrsia_node_config::{StateBackend, NODE_URL_KEY};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::output::{collect_tree, print_tree, print_warning, OutputFormat};
use crate::panel::Panel;
use crate::refresher::{RefreshEvent, Refresher};

use super::CommandContext;

/// How often the state file is re-read for address edits made by other invocations.
const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Watch arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Refresh interval in seconds (defaults to the configured interval).
    #[arg(long)]
    interval: Option<u64>,
}

impl WatchCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let interval = self
            .interval
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(ctx.config.refresh_interval);

        let panel = ctx.panel()?;
        let format = ctx.format;
        let refresher = Refresher::new(panel.clone(), interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if ctx.node_override.is_none() {
            tokio::spawn(follow_state_file(ctx, panel.clone(), shutdown_rx.clone()));
        }

        let handle = tokio::spawn(async move {
            refresher
                .run(shutdown_rx, move |event| render(&panel, event, format))
                .await;
        });

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);

        if let Err(e) = handle.await {
            error!(error = %e, "Refresh task panicked");
        }
        Ok(())
    }
}

/// Apply node address changes persisted by other invocations (`node set-address`).
async fn follow_state_file(ctx: CommandContext, panel: Panel, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(ADDRESS_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stored = match ctx.state() {
                    Ok(state) => state.get(NODE_URL_KEY),
                    Err(e) => {
                        debug!(error = %e, "Cannot re-read panel state");
                        continue;
                    }
                };
                let Some(Value::String(stored)) = stored else {
                    continue;
                };
                if stored == panel.store.address_with_scheme() {
                    continue;
                }
                if let Err(e) = panel.store.set_address(stored.as_str()) {
                    warn!(error = %e, "Ignoring invalid stored node address");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn render(panel: &Panel, event: RefreshEvent, format: OutputFormat) {
    match event {
        RefreshEvent::Status(status) => match format {
            OutputFormat::Json => crate::output::print_single(&status, format),
            OutputFormat::Table => println!("{}", status.render()),
        },
        RefreshEvent::ViewChanged => {
            if format == OutputFormat::Table {
                println!(
                    "{}",
                    format!("-- {} --", Local::now().format("%H:%M:%S")).dimmed()
                );
            }
            print_tree(&collect_tree(&panel.view), format);
        }
        RefreshEvent::MirrorMissing(paths) => {
            for path in paths {
                print_warning(&format!(
                    "'{}' does not list {} as a registry mirror; run `pyrsia-panel docker add-mirror --path {}`",
                    path.display(),
                    panel.store.address_with_scheme(),
                    path.display()
                ));
            }
        }
    }
}
