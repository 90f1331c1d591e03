//! Pyrsia panel
//!
//! A terminal side panel for a Pyrsia node. It shows the integrations tree
//! (currently Docker: configuration files and local images with their
//! Pyrsia status) and hosts the commands acting on it.
//!
//! ## Architecture
//!
//! - **Node client**: HTTP probe of the Pyrsia node, addressed through the node configuration store
//! - **Docker adapter**: docker CLI probe of the local engine
//! - **Panel**: wires probes, the Docker integration and the integrations view together
//! - **Refresher**: periodic refresh, address changes, re-rendering

pub mod client;
pub mod commands;
pub mod config;
pub mod docker;
pub mod error;
pub mod mirror;
pub mod output;
pub mod panel;
pub mod refresher;
pub mod status_bar;
