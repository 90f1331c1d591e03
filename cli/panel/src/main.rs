//! pyrsia-panel - terminal side panel for a Pyrsia node.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pyrsia_panel::commands::Cli;
use pyrsia_panel::config::{LogFormat, PanelConfig};
use pyrsia_panel::error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match PanelConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error::print_error(&e);
            std::process::exit(2);
        }
    };

    // Logs go to stderr; stdout is for rendered output.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    if let Err(e) = cli.run(config).await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
