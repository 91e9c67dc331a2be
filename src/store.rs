//! On-disk store of deployed configuration files
//!
//! The live directory is the single source of truth for what has been
//! promoted; this module only reads, enumerates, and removes artifacts.
//! Writing happens exclusively through the deployment pipeline so nothing
//! unvalidated can appear here.

use crate::error::{Error, Result};
use crate::vhost;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;

/// Extension every deployed artifact carries; files without it are
/// ignored when listing.
pub const CONFIG_EXT: &str = "conf";

/// Accessor for the live configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

/// One deployed artifact. `name` is the on-disk file name including the
/// extension; `content` is populated only for verbose listings.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Absolute path of the live artifact for `name`, refusing any name
    /// that could resolve outside the directory.
    pub fn live_path(&self, name: &str) -> Result<PathBuf> {
        if !vhost::is_safe_name(name) {
            return Err(Error::InvalidInput(format!(
                "config name '{name}' must be a path-safe segment"
            )));
        }
        Ok(self.dir.join(format!("{name}.{CONFIG_EXT}")))
    }

    /// Enumerate deployed artifacts sorted by file name. `verbose` also
    /// loads each file's contents.
    pub async fn list(&self, verbose: bool) -> Result<Vec<ConfigEntry>> {
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(CONFIG_EXT) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let content = if verbose {
                Some(fs::read_to_string(&path).await?)
            } else {
                None
            };
            entries.push(ConfigEntry { name, content });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Read one deployed artifact.
    pub async fn get(&self, name: &str) -> Result<String> {
        let path = self.live_path(name)?;
        fs::read_to_string(&path)
            .await
            .map_err(|err| not_found_or_io(name, err))
    }

    /// Remove one deployed artifact. The running engine keeps serving the
    /// old table until the next reload.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.live_path(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|err| not_found_or_io(name, err))
    }
}

pub(crate) fn not_found_or_io(name: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(name.to_string())
    } else {
        Error::Io(err)
    }
}
