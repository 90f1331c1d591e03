//! Docker integration commands.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use pyrsia_reconcile::docker::ids;
use pyrsia_reconcile::{
    BuildOutcome, Integration, IntegrationEvent, ReconcileError, ReplaceOutcome, ReplaceReport,
};
use serde::Serialize;
use tabled::Tabled;

use crate::error::PanelError;
use crate::mirror::{ensure_mirror, MirrorUpdate};
use crate::output::{
    print_info, print_output, print_single, print_success, print_warning, OutputFormat,
};
use crate::panel::Panel;

use super::CommandContext;

/// Docker commands.
#[derive(Debug, Args)]
pub struct DockerCommand {
    #[command(subcommand)]
    command: DockerSubcommand,
}

#[derive(Debug, Subcommand)]
enum DockerSubcommand {
    /// Add the Pyrsia node as a registry mirror in the Docker configuration.
    AddMirror(AddMirrorArgs),

    /// Replace local images with images from the Pyrsia node.
    ReplaceImages(ReplaceImagesArgs),

    /// Ask the Pyrsia node to build (add) an image.
    RequestBuild(ImageArgs),

    /// Show the transparency log of an image.
    TransLog(ImageArgs),
}

#[derive(Debug, Args)]
struct AddMirrorArgs {
    /// Docker daemon configuration file. Defaults to the first one found.
    #[arg(long)]
    path: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ReplaceImagesArgs {
    /// Do not ask for confirmation.
    #[arg(long, short)]
    yes: bool,
}

#[derive(Debug, Args)]
struct ImageArgs {
    /// Image as `repository:tag`.
    image: String,
}

impl DockerCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            DockerSubcommand::AddMirror(args) => add_mirror(ctx, args).await,
            DockerSubcommand::ReplaceImages(args) => replace_images(ctx, args).await,
            DockerSubcommand::RequestBuild(args) => request_build(ctx, args).await,
            DockerSubcommand::TransLog(args) => trans_log(ctx, args).await,
        }
    }
}

async fn reconciled_panel(ctx: &CommandContext) -> Result<Panel> {
    let panel = ctx.panel()?;
    panel
        .view
        .dispatch(IntegrationEvent::ModelUpdate)
        .await
        .context("Failed to reconcile integrations")?;
    Ok(panel)
}

#[derive(Debug, Serialize)]
struct MirrorResult {
    path: PathBuf,
    mirror: String,
    update: MirrorUpdate,
}

async fn add_mirror(ctx: CommandContext, args: AddMirrorArgs) -> Result<()> {
    let (path, address) = match args.path {
        Some(path) => (path, ctx.store()?.address()),
        None => {
            let panel = reconciled_panel(&ctx).await?;
            let path = panel
                .docker
                .config_files()
                .into_iter()
                .next()
                .ok_or(PanelError::NoConfigFile)?;
            (path, panel.store.address())
        }
    };

    let update = ensure_mirror(&path, &address)?;
    let result = MirrorResult {
        path,
        mirror: address.with_scheme(),
        update,
    };

    match ctx.format {
        OutputFormat::Json => print_single(&result, ctx.format),
        OutputFormat::Table => match result.update {
            MirrorUpdate::AlreadyPresent => print_info(&format!(
                "'{}' already lists {}",
                result.path.display(),
                result.mirror
            )),
            MirrorUpdate::Added => {
                print_success(&format!(
                    "Added {} to '{}'",
                    result.mirror,
                    result.path.display()
                ));
                print_warning("Please restart Docker to apply the configuration changes.");
            }
        },
    }
    Ok(())
}

#[derive(Debug, Serialize, Tabled)]
struct ReplaceRow {
    #[tabled(rename = "Image")]
    image: String,

    #[tabled(rename = "Result")]
    result: String,
}

impl From<&ReplaceReport> for ReplaceRow {
    fn from(report: &ReplaceReport) -> Self {
        let result = match &report.outcome {
            ReplaceOutcome::Replaced => "replaced".to_string(),
            ReplaceOutcome::NotManaged => "not in Pyrsia".to_string(),
            ReplaceOutcome::HasContainers(n) => format!("skipped, used by {n} container(s)"),
            ReplaceOutcome::Failed(message) => format!("failed: {message}"),
        };
        Self {
            image: report.identity.clone(),
            result,
        }
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} {} ", question, "[y/N]".dimmed());
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}

async fn replace_images(ctx: CommandContext, args: ReplaceImagesArgs) -> Result<()> {
    if !args.yes
        && !confirm("Are you sure you'd like to replace all local docker images with the Pyrsia images?")?
    {
        return Err(PanelError::Cancelled.into());
    }

    let panel = ctx.panel()?;
    let reports = panel
        .docker
        .replace_images_with_node()
        .await
        .context("Failed to replace images")?;

    let rows: Vec<ReplaceRow> = reports.iter().map(ReplaceRow::from).collect();
    print_output(&rows, ctx.format);
    Ok(())
}

/// Map an unknown node id to a friendlier error naming the image.
fn image_error(image: &str, e: ReconcileError) -> anyhow::Error {
    match e {
        ReconcileError::NotFound(_) => PanelError::UnknownImage(image.to_string()).into(),
        other => anyhow::Error::new(other),
    }
}

#[derive(Debug, Serialize)]
struct BuildResult {
    image: String,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    build_id: Option<String>,
}

async fn request_build(ctx: CommandContext, args: ImageArgs) -> Result<()> {
    let panel = reconciled_panel(&ctx).await?;
    let outcome = panel
        .docker
        .request_build(&ids::image(&args.image))
        .await
        .map_err(|e| image_error(&args.image, e))?;

    let result = match outcome {
        BuildOutcome::Accepted { build_id } => BuildResult {
            image: args.image,
            accepted: true,
            build_id: Some(build_id),
        },
        BuildOutcome::Rejected => BuildResult {
            image: args.image,
            accepted: false,
            build_id: None,
        },
    };

    match ctx.format {
        OutputFormat::Json => print_single(&result, ctx.format),
        OutputFormat::Table => match &result.build_id {
            Some(build_id) => print_success(&format!(
                "Build of '{}' requested, build id: {build_id}",
                result.image
            )),
            None => print_warning(&format!(
                "The Pyrsia node did not accept the build of '{}'",
                result.image
            )),
        },
    }
    Ok(())
}

async fn trans_log(ctx: CommandContext, args: ImageArgs) -> Result<()> {
    let panel = reconciled_panel(&ctx).await?;
    let document = panel
        .docker
        .transparency_log(&ids::image(&args.image))
        .await
        .map_err(|e| image_error(&args.image, e))?;

    print_single(&document, ctx.format);
    Ok(())
}
