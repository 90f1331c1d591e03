//! Filesystem lookup of integration configuration files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::probe::ConfigFileFinder;

/// Finds configuration files by scanning a directory (non-recursive).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsConfigFinder;

#[async_trait]
impl ConfigFileFinder for FsConfigFinder {
    async fn find_config_file(&self, dir: &Path, file_name: &str) -> Option<PathBuf> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = ?dir, error = %e, "Cannot read config directory");
                return None;
            }
        };

        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    if entry.file_name() != file_name {
                        continue;
                    }
                    let is_file = entry
                        .file_type()
                        .await
                        .map(|t| t.is_file() || t.is_symlink())
                        .unwrap_or(false);
                    if is_file {
                        return Some(entry.path());
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    debug!(dir = ?dir, error = %e, "Failed to scan config directory");
                    return None;
                }
            }
        }
    }
}
