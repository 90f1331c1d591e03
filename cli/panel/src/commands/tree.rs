//! Print the integrations tree once.

use anyhow::{Context, Result};
use pyrsia_reconcile::IntegrationEvent;

use crate::output::{collect_tree, print_tree};

use super::CommandContext;

pub async fn run(ctx: CommandContext) -> Result<()> {
    let panel = ctx.panel()?;
    panel
        .view
        .dispatch(IntegrationEvent::ModelUpdate)
        .await
        .context("Failed to reconcile integrations")?;

    print_tree(&collect_tree(&panel.view), ctx.format);
    Ok(())
}
