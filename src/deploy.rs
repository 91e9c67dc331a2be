//! Validated deployment pipeline
//!
//! Candidate text never lands in the live directory directly. It is
//! written to a uniquely named scratch file, checked by the external
//! binary, and only then renamed into place. The rename is the commit
//! point; everything before it leaves the live directory untouched, and
//! every failure path removes the scratch file.

use crate::error::{Error, Result};
use crate::nginx::NginxControl;
use crate::store::{self, ConfigStore, CONFIG_EXT};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// Receipt for one promoted configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub name: String,
    pub path: PathBuf,
}

/// Runs the write-validate-promote sequence for candidate configs.
///
/// `scratch_dir` must sit on the same filesystem as the live directory
/// so the final rename stays atomic.
#[derive(Debug, Clone)]
pub struct Deployer {
    store: ConfigStore,
    scratch_dir: PathBuf,
    nginx: NginxControl,
}

impl Deployer {
    pub fn new(store: ConfigStore, scratch_dir: impl Into<PathBuf>, nginx: NginxControl) -> Self {
        Self {
            store,
            scratch_dir: scratch_dir.into(),
            nginx,
        }
    }

    /// Validate `content` and promote it as the live config for `name`.
    ///
    /// On any failure the scratch file is discarded and the previously
    /// deployed artifact, if one exists, stays in place untouched.
    pub async fn deploy(&self, name: &str, content: &str) -> Result<Deployment> {
        let live = self.store.live_path(name)?;
        let scratch = self.scratch_path("nginx-test", name);

        if let Err(source) = fs::write(&scratch, content).await {
            self.discard(&scratch).await;
            return Err(Error::ScratchWrite {
                path: scratch,
                source,
            });
        }

        if let Err(err) = self.nginx.validate_file(&scratch).await {
            self.discard(&scratch).await;
            return Err(err);
        }

        if let Err(source) = fs::rename(&scratch, &live).await {
            self.discard(&scratch).await;
            return Err(Error::Commit { path: live, source });
        }

        info!(name = %name, path = %live.display(), "configuration validated and deployed");
        Ok(Deployment {
            name: name.to_string(),
            path: live,
        })
    }

    /// Re-check an already deployed config against the current binary.
    ///
    /// The live artifact is copied to scratch and checked there, so the
    /// live file is never handed to the engine directly. The scratch copy
    /// is discarded on both outcomes.
    pub async fn check_existing(&self, name: &str) -> Result<String> {
        let live = self.store.live_path(name)?;
        let scratch = self.scratch_path("nginx-check", name);

        if let Err(err) = fs::copy(&live, &scratch).await {
            self.discard(&scratch).await;
            return Err(store::not_found_or_io(name, err));
        }

        let result = self.nginx.validate_file(&scratch).await;
        self.discard(&scratch).await;
        result
    }

    /// Unique scratch file name: prefix, host name, wall-clock millis,
    /// and a random token so concurrent submissions never collide.
    fn scratch_path(&self, prefix: &str, name: &str) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let token = Uuid::new_v4().simple().to_string();
        self.scratch_dir.join(format!(
            "{prefix}-{name}-{millis}-{}.{CONFIG_EXT}",
            &token[..8]
        ))
    }

    /// Best-effort scratch removal; a leftover file is a hygiene problem,
    /// not a pipeline failure.
    async fn discard(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "failed to remove scratch file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployer(live: &Path, scratch: &Path, binary: &str) -> Deployer {
        Deployer::new(
            ConfigStore::new(live),
            scratch,
            NginxControl::new(binary),
        )
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_scratch_names_are_unique_and_prefixed() {
        let live = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let deployer = deployer(live.path(), scratch.path(), "true");

        let first = deployer.scratch_path("nginx-test", "api");
        let second = deployer.scratch_path("nginx-test", "api");
        assert_ne!(first, second);

        let file = first.file_name().unwrap().to_string_lossy().into_owned();
        assert!(file.starts_with("nginx-test-api-"));
        assert!(file.ends_with(".conf"));
    }

    #[test]
    fn test_deployment_receipt_serialization() {
        let receipt = Deployment {
            name: "api".to_string(),
            path: PathBuf::from("/etc/nginx/conf.d/api.conf"),
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "api", "path": "/etc/nginx/conf.d/api.conf" })
        );
    }

    #[tokio::test]
    async fn test_deploy_promotes_when_validation_passes() {
        let live = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let deployer = deployer(live.path(), scratch.path(), "true");

        let receipt = deployer.deploy("api", "upstream api { }").await.unwrap();
        assert_eq!(receipt.name, "api");
        assert_eq!(receipt.path, live.path().join("api.conf"));
        assert_eq!(
            std::fs::read_to_string(&receipt.path).unwrap(),
            "upstream api { }"
        );
        assert!(file_names(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_deploy_discards_candidate_on_rejection() {
        let live = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let deployer = deployer(live.path(), scratch.path(), "false");

        let err = deployer.deploy("api", "garbage").await.unwrap_err();
        assert!(matches!(err, Error::ValidationRejected { .. }));
        assert!(file_names(live.path()).is_empty());
        assert!(file_names(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_deploy_keeps_previous_artifact() {
        let live = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let good = deployer(live.path(), scratch.path(), "true");
        good.deploy("api", "old contents").await.unwrap();

        let bad = deployer(live.path(), scratch.path(), "false");
        bad.deploy("api", "new contents").await.unwrap_err();

        assert_eq!(
            std::fs::read_to_string(live.path().join("api.conf")).unwrap(),
            "old contents"
        );
        assert!(file_names(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_check_existing_missing_config_is_not_found() {
        let live = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let deployer = deployer(live.path(), scratch.path(), "true");

        let err = deployer.check_existing("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(file_names(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_check_existing_cleans_scratch_on_both_outcomes() {
        let live = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        std::fs::write(live.path().join("api.conf"), "server { }").unwrap();

        let passing = deployer(live.path(), scratch.path(), "true");
        passing.check_existing("api").await.unwrap();
        assert!(file_names(scratch.path()).is_empty());

        let failing = deployer(live.path(), scratch.path(), "false");
        let err = failing.check_existing("api").await.unwrap_err();
        assert!(matches!(err, Error::ValidationRejected { .. }));
        assert!(file_names(scratch.path()).is_empty());

        // the live artifact is untouched either way
        assert_eq!(
            std::fs::read_to_string(live.path().join("api.conf")).unwrap(),
            "server { }"
        );
    }

    #[tokio::test]
    async fn test_deploy_rejects_unsafe_names_before_touching_disk() {
        let live = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let deployer = deployer(live.path(), scratch.path(), "true");

        let err = deployer.deploy("../escape", "server { }").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(file_names(scratch.path()).is_empty());
    }
}
