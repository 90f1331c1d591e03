//! Docker daemon registry-mirror configuration.
//!
//! Docker pulls through the Pyrsia node once the node's address is listed
//! under `registry-mirrors` in `daemon.json`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use pyrsia_node_config::NodeAddress;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

/// Key holding the mirror list in `daemon.json`.
pub const REGISTRY_MIRRORS: &str = "registry-mirrors";

/// Result of [`ensure_mirror`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorUpdate {
    /// The node was already listed.
    AlreadyPresent,
    /// The node was appended; Docker must be restarted.
    Added,
}

/// Whether `config` lists `address` as a registry mirror.
///
/// A mirror entry matches when it names the node's exact `host[:port]`,
/// regardless of scheme. Entries that are not valid addresses never match.
pub fn has_mirror(config: &Value, address: &NodeAddress) -> bool {
    config
        .get(REGISTRY_MIRRORS)
        .and_then(Value::as_array)
        .is_some_and(|mirrors| {
            mirrors
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|mirror| NodeAddress::parse(mirror).ok())
                .any(|mirror| mirror.same_authority(address))
        })
}

/// Append `address` to the mirror list, creating the list when missing.
pub fn add_mirror(config: &mut Map<String, Value>, address: &NodeAddress) -> Result<()> {
    let mirrors = config
        .entry(REGISTRY_MIRRORS)
        .or_insert_with(|| Value::Array(Vec::new()));
    match mirrors {
        Value::Array(list) => {
            list.push(Value::String(address.with_scheme()));
            Ok(())
        }
        other => bail!("'{REGISTRY_MIRRORS}' is not a list: {other}"),
    }
}

fn read_config(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    match serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("{} does not contain a JSON object", path.display()),
    }
}

/// Whether the config file at `path` lists `address`.
pub fn check_mirror(path: &Path, address: &NodeAddress) -> Result<bool> {
    let config = read_config(path)?;
    Ok(has_mirror(&Value::Object(config), address))
}

/// Make sure the config file at `path` lists `address`, rewriting it if needed.
pub fn ensure_mirror(path: &Path, address: &NodeAddress) -> Result<MirrorUpdate> {
    let mut config = read_config(path)?;
    if has_mirror(&Value::Object(config.clone()), address) {
        return Ok(MirrorUpdate::AlreadyPresent);
    }

    add_mirror(&mut config, address)?;
    let content = serde_json::to_string_pretty(&Value::Object(config))?;
    std::fs::write(path, content + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), mirror = %address, "Added Pyrsia registry mirror");
    Ok(MirrorUpdate::Added)
}
