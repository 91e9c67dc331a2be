//! Integration tests for the compile-validate-promote pipeline
//!
//! A stand-in nginx binary records every invocation and accepts or
//! rejects candidates on command, so the full deployment sequence runs
//! without a real nginx install.

use confgate::deploy::Deployer;
use confgate::error::Error;
use confgate::nginx::NginxControl;
use confgate::store::ConfigStore;
use confgate::template;
use confgate::vhost::VhostSpec;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

/// Write a stand-in nginx binary that appends its arguments to `log`,
/// prints `message` to stderr the way nginx reports check results, and
/// exits with `exit_code`.
fn write_stub_nginx(dir: &Path, exit_code: i32, message: &str, log: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("nginx-stub");
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> {}\necho \"{}\" >&2\nexit {}\n",
        log.display(),
        message,
        exit_code
    );
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

struct Harness {
    live: TempDir,
    scratch: TempDir,
    stub_dir: TempDir,
    log: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let stub_dir = TempDir::new().unwrap();
        let log = stub_dir.path().join("invocations.log");
        Self {
            live: TempDir::new().unwrap(),
            scratch: TempDir::new().unwrap(),
            stub_dir,
            log,
        }
    }

    fn deployer(&self, exit_code: i32, message: &str) -> Deployer {
        let stub = write_stub_nginx(self.stub_dir.path(), exit_code, message, &self.log);
        Deployer::new(
            ConfigStore::new(self.live.path()),
            self.scratch.path(),
            NginxControl::new(stub.to_string_lossy().into_owned()),
        )
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::new(self.live.path())
    }

    fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    fn live_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.live.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn scratch_files(&self) -> Vec<String> {
        std::fs::read_dir(self.scratch.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }
}

fn sample_spec(name: &str) -> VhostSpec {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "fqdn": format!("{}.example.com", name),
        "backends": ["10.0.0.1:8080", "10.0.0.2:8080"],
        "websocket": true,
        "clientMaxBodySize": "25m",
        "ipAllow": ["10.0.0.0/8"]
    }))
    .unwrap()
}

/// A config large enough that a non-atomic promotion would be caught
/// mid-write by a concurrent reader.
fn versioned_payload(tag: &str) -> String {
    format!("# build {tag}\n{}", format!("# padding {tag}\n").repeat(12_000))
}

// ============================================================================
// Deployment Tests
// ============================================================================

#[tokio::test]
async fn test_compiled_config_is_validated_then_promoted() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "nginx: configuration file test is successful");

    let spec = sample_spec("api");
    let content = template::render(&spec);
    let receipt = deployer.deploy(&spec.name, &content).await.unwrap();

    assert_eq!(receipt.name, "api");
    assert_eq!(receipt.path, harness.live.path().join("api.conf"));
    assert_eq!(std::fs::read_to_string(&receipt.path).unwrap(), content);
    assert!(harness.scratch_files().is_empty());

    // the candidate was checked as a file in the scratch directory
    let invocations = harness.invocations();
    assert_eq!(invocations.len(), 1);
    let args = &invocations[0];
    assert!(args.starts_with("-t -c "), "unexpected args: {args}");
    assert!(args.contains(&harness.scratch.path().to_string_lossy().into_owned()));
    assert!(args.contains("nginx-test-api-"));
    assert!(args.trim_end().ends_with(".conf"));
}

#[tokio::test]
async fn test_rejected_candidate_reports_engine_diagnostic() {
    let harness = Harness::new();
    let deployer = harness.deployer(1, "nginx: [emerg] unknown directive \\\"bogus\\\"");

    let err = deployer.deploy("api", "bogus;").await.unwrap_err();
    match err {
        Error::ValidationRejected { diagnostic } => {
            assert!(diagnostic.contains("unknown directive"), "{diagnostic}");
        }
        other => panic!("expected ValidationRejected, got {other:?}"),
    }

    assert!(harness.live_files().is_empty());
    assert!(harness.scratch_files().is_empty());
}

#[tokio::test]
async fn test_redeploy_replaces_live_config() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "ok");

    deployer.deploy("api", "version one").await.unwrap();
    deployer.deploy("api", "version two").await.unwrap();

    assert_eq!(harness.live_files(), ["api.conf"]);
    assert_eq!(
        std::fs::read_to_string(harness.live.path().join("api.conf")).unwrap(),
        "version two"
    );
}

#[tokio::test]
async fn test_failed_redeploy_leaves_previous_version_serving() {
    let harness = Harness::new();

    let passing = harness.deployer(0, "ok");
    passing.deploy("api", "known good").await.unwrap();

    let failing = harness.deployer(1, "nginx: [emerg] broken");
    failing.deploy("api", "broken update").await.unwrap_err();

    assert_eq!(
        std::fs::read_to_string(harness.live.path().join("api.conf")).unwrap(),
        "known good"
    );
    assert!(harness.scratch_files().is_empty());
}

#[tokio::test]
async fn test_failed_promotion_is_a_commit_error_with_clean_scratch() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "ok");

    // a directory squatting on the live path makes the final rename fail
    std::fs::create_dir(harness.live.path().join("api.conf")).unwrap();

    let err = deployer.deploy("api", "server { }").await.unwrap_err();
    match err {
        Error::Commit { path, .. } => assert!(path.ends_with("api.conf")),
        other => panic!("expected Commit, got {other:?}"),
    }
    assert!(harness.scratch_files().is_empty());
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_see_only_complete_configs() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "ok");
    let store = harness.store();

    let blue = versioned_payload("blue");
    let green = versioned_payload("green");
    deployer.deploy("api", &blue).await.unwrap();

    let writer = {
        let deployer = deployer.clone();
        let (blue, green) = (blue.clone(), green.clone());
        tokio::spawn(async move {
            for round in 0..20 {
                let next = if round % 2 == 0 { &green } else { &blue };
                deployer.deploy("api", next).await.unwrap();
            }
        })
    };

    let reader = {
        let (blue, green) = (blue.clone(), green.clone());
        tokio::spawn(async move {
            for _ in 0..200 {
                let content = store.get("api").await.unwrap();
                assert!(
                    content == blue || content == green,
                    "read returned a partial config ({} bytes)",
                    content.len()
                );
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert!(harness.scratch_files().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_deploys_settle_on_one_complete_version() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "ok");

    let payloads: Vec<String> = (0..8)
        .map(|i| versioned_payload(&format!("v{i}")))
        .collect();
    let mut handles = Vec::new();
    for payload in &payloads {
        let deployer = deployer.clone();
        let payload = payload.clone();
        handles.push(tokio::spawn(async move {
            deployer.deploy("api", &payload).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let live = std::fs::read_to_string(harness.live.path().join("api.conf")).unwrap();
    assert!(payloads.iter().any(|p| p == &live));
    assert_eq!(harness.live_files(), ["api.conf"]);
    assert!(harness.scratch_files().is_empty());
}

// ============================================================================
// Re-check Tests
// ============================================================================

#[tokio::test]
async fn test_check_existing_copies_to_scratch_and_cleans_up() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "syntax is ok");

    deployer.deploy("api", "server { }").await.unwrap();

    let diagnostic = deployer.check_existing("api").await.unwrap();
    assert!(diagnostic.contains("syntax is ok"));
    assert!(harness.scratch_files().is_empty());

    // the check ran against a scratch copy, not the live file
    let invocations = harness.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[1].contains("nginx-check-api-"));
    assert!(!invocations[1].contains(&harness.live.path().to_string_lossy().into_owned()));
}

#[tokio::test]
async fn test_check_existing_failure_keeps_live_file() {
    let harness = Harness::new();

    let passing = harness.deployer(0, "ok");
    passing.deploy("api", "server { }").await.unwrap();

    let failing = harness.deployer(1, "nginx: [emerg] rot detected");
    let err = failing.check_existing("api").await.unwrap_err();
    assert!(matches!(err, Error::ValidationRejected { .. }));

    assert_eq!(harness.live_files(), ["api.conf"]);
    assert!(harness.scratch_files().is_empty());
}

#[tokio::test]
async fn test_check_existing_copy_failure_leaves_scratch_clean() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "ok");

    // a directory at the live path makes the scratch copy fail outright
    std::fs::create_dir(harness.live.path().join("api.conf")).unwrap();

    let err = deployer.check_existing("api").await.unwrap_err();
    assert!(matches!(err, Error::Io(_)), "{err:?}");
    assert!(harness.scratch_files().is_empty());
}

// ============================================================================
// Store Round-trip Tests
// ============================================================================

#[tokio::test]
async fn test_deployed_configs_are_visible_through_the_store() {
    let harness = Harness::new();
    let deployer = harness.deployer(0, "ok");

    let api = template::render(&sample_spec("api"));
    let web = template::render(&sample_spec("web"));
    deployer.deploy("api", &api).await.unwrap();
    deployer.deploy("web", &web).await.unwrap();

    let store = harness.store();
    let names: Vec<String> = store
        .list(false)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["api.conf", "web.conf"]);

    let fetched = store.get("api").await.unwrap();
    assert_eq!(fetched, api);
    assert!(fetched.contains("upstream api_example_com {"));

    store.delete("api").await.unwrap();
    assert!(matches!(
        store.get("api").await.unwrap_err(),
        Error::NotFound(_)
    ));
    assert_eq!(harness.live_files(), ["web.conf"]);
}
