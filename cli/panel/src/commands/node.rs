//! Node connection commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use pyrsia_node_config::AddressUpdate;
use serde::Serialize;

use crate::output::{print_info, print_single, print_success, OutputFormat};
use crate::status_bar::ConnectionStatus;

use super::CommandContext;

/// Node commands.
#[derive(Debug, Args)]
pub struct NodeCommand {
    #[command(subcommand)]
    command: NodeSubcommand,
}

#[derive(Debug, Subcommand)]
enum NodeSubcommand {
    /// Show the configured node address.
    Show,

    /// Change the node address (e.g. `localhost:7888`).
    SetAddress(SetAddressArgs),

    /// Check the connection to the node.
    Status,
}

#[derive(Debug, Args)]
struct SetAddressArgs {
    /// New address. The scheme defaults to http.
    address: Option<String>,
}

impl NodeCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            NodeSubcommand::Show => show(ctx),
            NodeSubcommand::SetAddress(args) => set_address(ctx, args),
            NodeSubcommand::Status => status(ctx).await,
        }
    }
}

#[derive(Debug, Serialize)]
struct NodeConfigView {
    address: String,
    configured: bool,
    overridden: bool,
}

fn show(ctx: CommandContext) -> Result<()> {
    let store = ctx.store()?;
    let view = NodeConfigView {
        address: store.address_with_scheme(),
        configured: store.is_configured(),
        overridden: ctx.node_override.is_some(),
    };

    match ctx.format {
        OutputFormat::Json => print_single(&view, ctx.format),
        OutputFormat::Table => {
            println!("Pyrsia node: {}", view.address);
            if view.overridden {
                print_info("Address overridden for this invocation");
            } else if !view.configured {
                print_info("Using the default address; run `pyrsia-panel node set-address`");
            }
        }
    }
    Ok(())
}

fn set_address(ctx: CommandContext, args: SetAddressArgs) -> Result<()> {
    let store = ctx.persistent_store()?;

    match store.set_address(args.address.as_deref())? {
        AddressUpdate::Updated(address) => {
            print_success(&format!("Pyrsia node address set to '{}'", address.with_scheme()));
        }
        AddressUpdate::Unchanged => {
            print_info(&format!(
                "No address given, keeping '{}'",
                store.address_with_scheme()
            ));
        }
    }
    Ok(())
}

async fn status(ctx: CommandContext) -> Result<()> {
    let panel = ctx.panel()?;
    let status = ConnectionStatus::refresh(&panel.store, panel.node.as_ref()).await;

    match ctx.format {
        OutputFormat::Json => print_single(&status, ctx.format),
        OutputFormat::Table => println!("{}", status.render()),
    }
    Ok(())
}
