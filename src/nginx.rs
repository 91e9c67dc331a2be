//! Invocation of the external nginx binary
//!
//! Everything nginx-shaped goes through `NginxControl`: candidate checks,
//! whole-configuration checks, and reload signals. The binary is never
//! assumed to be on PATH; the configured program name is used as-is so
//! containers can point at wrapper scripts.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// Handle on the external nginx binary.
#[derive(Debug, Clone)]
pub struct NginxControl {
    binary: String,
}

impl NginxControl {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check one candidate file without touching the running engine.
    ///
    /// Returns the engine's diagnostic text on success; a non-zero exit
    /// becomes `ValidationRejected` carrying the same text.
    pub async fn validate_file(&self, path: &Path) -> Result<String> {
        let config_arg = path.to_string_lossy().into_owned();
        let output = self.output(&["-t", "-c", &config_arg]).await?;
        let diagnostic = diagnostic(&output);
        if output.status.success() {
            Ok(diagnostic)
        } else {
            Err(Error::ValidationRejected { diagnostic })
        }
    }

    /// Check the engine's entire active configuration.
    pub async fn validate_global(&self) -> Result<String> {
        let output = self.output(&["-t"]).await?;
        let diagnostic = diagnostic(&output);
        if output.status.success() {
            Ok(diagnostic)
        } else {
            Err(Error::ValidationRejected { diagnostic })
        }
    }

    /// Ask the running engine to re-read its configuration.
    pub async fn reload(&self) -> Result<String> {
        let output = self.output(&["-s", "reload"]).await?;
        let diagnostic = diagnostic(&output);
        if output.status.success() {
            Ok(diagnostic)
        } else {
            Err(Error::ReloadFailed { diagnostic })
        }
    }

    async fn output(&self, args: &[&str]) -> Result<Output> {
        debug!(binary = %self.binary, ?args, "invoking nginx");
        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| Error::Process {
                program: self.binary.clone(),
                source,
            })
    }
}

/// nginx reports check results on stderr even when they pass, so prefer
/// stderr and fall back to stdout.
fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr.to_string()
    }
}
