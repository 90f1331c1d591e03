//! Error handling and display for the panel.

use colored::Colorize;
use pyrsia_node_config::ConfigError;
use pyrsia_reconcile::{ProbeError, ReconcileError};
use thiserror::Error;

/// Panel-specific errors.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("Image '{0}' is not in the Docker integration tree")]
    UnknownImage(String),

    #[error("No Docker configuration file found")]
    NoConfigFile,

    #[error("Operation cancelled")]
    Cancelled,
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            if e.is_validation() {
                return Some("Use an address like `localhost:7888` or `https://node.example.com`.");
            }
        }
        if let Some(e) = cause.downcast_ref::<ReconcileError>() {
            match e {
                ReconcileError::Integrity(_) => {
                    return Some("Check the Docker configuration search paths.")
                }
                e if e.is_unavailable() => {
                    return Some(
                        "Make sure Docker is running and the Pyrsia node is up. Run `pyrsia-panel node status`.",
                    )
                }
                _ => {}
            }
        }
        if let Some(ProbeError::Unavailable { .. }) = cause.downcast_ref::<ProbeError>() {
            return Some(
                "Make sure Docker is running and the Pyrsia node is up. Run `pyrsia-panel node status`.",
            );
        }
        if let Some(PanelError::UnknownImage(_)) = cause.downcast_ref::<PanelError>() {
            return Some("Run `pyrsia-panel tree` to list local images.");
        }
        if let Some(PanelError::NoConfigFile) = cause.downcast_ref::<PanelError>() {
            return Some("Pass the file explicitly with `--path`.");
        }
    }
    None
}
