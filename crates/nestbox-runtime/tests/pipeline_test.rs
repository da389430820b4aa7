//! Pipeline tests for the Nestbox engine.
//!
//! A `wiremock` registry serves the token, manifest, and blob endpoints and
//! a recording launcher stands in for the isolated process, so these run
//! without privileges. They verify:
//! 1. Layers are applied in manifest order, later ones overwriting earlier
//! 2. The command binary is in place before launch
//! 3. The first failing stage stops the pipeline
//! 4. The container root is gone afterwards, on success and on failure
//! 5. An interrupt mid-run leaves nothing behind

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use nestbox_common::config::{NestboxConfig, RegistryConfig};
use nestbox_common::error::{NestboxError, Result};
use nestbox_runtime::engine::{Engine, RunRequest};
use nestbox_runtime::exit::{self, FAILURE_EXIT_CODE};
use nestbox_runtime::interrupt::{InterruptAction, InterruptGuard};
use nestbox_runtime::process::{IsolatedProcessLauncher, LaunchOutcome, LaunchSpec};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Fixtures ─────────────────────────────────────────────────────────

/// What the launcher saw inside the root at launch time.
#[derive(Debug, Clone)]
struct LaunchRecord {
    executable: PathBuf,
    arguments: Vec<String>,
    binary_present: bool,
    motd: Option<String>,
}

struct RecordingLauncher {
    records: Arc<Mutex<Vec<LaunchRecord>>>,
    outcome: std::result::Result<LaunchOutcome, String>,
}

impl IsolatedProcessLauncher for RecordingLauncher {
    fn launch(&self, spec: &LaunchSpec<'_>) -> Result<LaunchOutcome> {
        let record = LaunchRecord {
            executable: spec.executable.clone(),
            arguments: spec.arguments.clone(),
            binary_present: spec
                .root
                .resolve(&spec.executable)
                .is_ok_and(|p| p.is_file()),
            motd: fs::read_to_string(spec.root.path().join("etc/motd")).ok(),
        };
        self.records.lock().expect("lock poisoned").push(record);
        self.outcome.clone().map_err(NestboxError::launch)
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Interrupts the run from inside the launch stage, before any child exists.
struct InterruptingLauncher {
    interrupts: Arc<InterruptGuard>,
    action: Arc<Mutex<Option<InterruptAction>>>,
}

impl IsolatedProcessLauncher for InterruptingLauncher {
    fn launch(&self, _spec: &LaunchSpec<'_>) -> Result<LaunchOutcome> {
        let action = self.interrupts.interrupt();
        *self.action.lock().expect("lock poisoned") = Some(action);
        Ok(LaunchOutcome::ExitedNormally(0))
    }

    fn is_available(&self) -> bool {
        true
    }
}

struct Run {
    result: Result<LaunchOutcome>,
    records: Vec<LaunchRecord>,
}

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}

fn gzip_layer(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *data)
            .expect("failed to append data");
    }
    let tar = builder.into_inner().expect("failed to finish tar");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).expect("failed to compress");
    encoder.finish().expect("failed to finish gzip")
}

async fn serve_token(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t0k3n",
            "expires_in": 300
        })))
        .mount(server)
        .await;
}

async fn serve_manifest(server: &MockServer, digests: &[&str]) {
    let layers: Vec<_> = digests.iter().map(|d| json!({ "blobSum": d })).collect();
    Mock::given(path("/v2/library/alpine/manifests/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "library/alpine",
            "tag": "latest",
            "fsLayers": layers
        })))
        .mount(server)
        .await;
}

async fn serve_blob(
    server: &MockServer,
    digest: &str,
    status: u16,
    body: Vec<u8>,
    hits: u64,
) {
    Mock::given(path(format!("/v2/library/alpine/blobs/{digest}")))
        .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
        .expect(hits)
        .mount(server)
        .await;
}

/// Lays out `work/` for roots and scratch files and `host/tool` as the
/// command binary.
fn workspace() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let work = dir.path().join("work");
    fs::create_dir(&work).expect("mkdir failed");
    let host = dir.path().join("host");
    fs::create_dir(&host).expect("mkdir failed");
    let tool = host.join("tool");
    fs::write(&tool, b"#!/bin/sh\nexit 0\n").expect("write failed");
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).expect("chmod failed");
    (dir, work, tool)
}

async fn run_engine(
    server: &MockServer,
    work: &Path,
    command: &Path,
    outcome: std::result::Result<LaunchOutcome, String>,
) -> Run {
    let config = NestboxConfig {
        registry: RegistryConfig::single_host(&server.uri()),
        work_dir: work.to_path_buf(),
    };
    let request = RunRequest {
        image: "alpine".into(),
        command: command.display().to_string(),
        args: vec!["-c".into(), "exit 17".into()],
    };
    blocking(move || {
        let records = Arc::new(Mutex::new(Vec::new()));
        let launcher = RecordingLauncher {
            records: Arc::clone(&records),
            outcome,
        };
        let engine = Engine::with_launcher(config, Box::new(launcher));
        let result = engine.run(&request);
        let records = records.lock().expect("lock poisoned").clone();
        Run { result, records }
    })
    .await
}

fn assert_no_leftovers(work: &Path) {
    let leftovers: Vec<_> = fs::read_dir(work)
        .expect("read_dir failed")
        .map(|e| e.expect("bad entry").file_name())
        .collect();
    assert!(leftovers.is_empty(), "work dir not cleaned: {leftovers:?}");
}

// ── Success ──────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn run_applies_layers_in_order_and_propagates_exit_status() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    serve_manifest(&server, &["sha256:one", "sha256:two"]).await;
    serve_blob(&server, "sha256:one", 200, gzip_layer(&[("etc/motd", b"one")]), 1).await;
    serve_blob(&server, "sha256:two", 200, gzip_layer(&[("etc/motd", b"two")]), 1).await;

    let (_dir, work, tool) = workspace();
    let run = run_engine(&server, &work, &tool, Ok(LaunchOutcome::ExitedNormally(17))).await;

    let outcome = run.result.expect("run failed");
    assert_eq!(exit::exit_code(outcome), 17);

    assert_eq!(run.records.len(), 1);
    let record = &run.records[0];
    assert_eq!(record.executable, tool);
    assert_eq!(record.arguments, ["-c", "exit 17"]);
    assert!(record.binary_present, "binary must be installed before launch");
    assert_eq!(record.motd.as_deref(), Some("two"));

    assert_no_leftovers(&work);
}

#[tokio::test(flavor = "multi_thread")]
async fn image_without_layers_still_runs_the_command() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    serve_manifest(&server, &[]).await;

    let (_dir, work, tool) = workspace();
    let run = run_engine(&server, &work, &tool, Ok(LaunchOutcome::ExitedNormally(0))).await;

    assert!(run.result.expect("run failed").success());
    assert!(run.records[0].binary_present);
    assert_no_leftovers(&work);
}

// ── Failures ─────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn failed_layer_download_stops_before_launch() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    serve_manifest(&server, &["sha256:one", "sha256:two", "sha256:three"]).await;
    serve_blob(&server, "sha256:one", 200, gzip_layer(&[("a", b"a")]), 1).await;
    serve_blob(&server, "sha256:two", 500, Vec::new(), 1).await;
    serve_blob(&server, "sha256:three", 200, gzip_layer(&[("c", b"c")]), 0).await;

    let (_dir, work, tool) = workspace();
    let run = run_engine(&server, &work, &tool, Ok(LaunchOutcome::ExitedNormally(0))).await;

    assert!(matches!(run.result, Err(NestboxError::LayerFetch { .. })));
    assert_eq!(exit::resolve(&run.result), FAILURE_EXIT_CODE);
    assert!(run.records.is_empty());
    assert_no_leftovers(&work);
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_layer_stops_before_launch() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    serve_manifest(&server, &["sha256:bad", "sha256:next"]).await;
    serve_blob(&server, "sha256:bad", 200, b"not an archive".to_vec(), 1).await;
    serve_blob(&server, "sha256:next", 200, gzip_layer(&[("n", b"n")]), 0).await;

    let (_dir, work, tool) = workspace();
    let run = run_engine(&server, &work, &tool, Ok(LaunchOutcome::ExitedNormally(0))).await;

    assert!(matches!(run.result, Err(NestboxError::LayerExtract { .. })));
    assert!(run.records.is_empty());
    assert_no_leftovers(&work);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_tag_is_manifest_error_and_fetches_no_blobs() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    Mock::given(path("/v2/library/alpine/manifests/latest"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    serve_blob(&server, "sha256:one", 200, gzip_layer(&[("a", b"a")]), 0).await;

    let (_dir, work, tool) = workspace();
    let run = run_engine(&server, &work, &tool, Ok(LaunchOutcome::ExitedNormally(0))).await;

    assert!(matches!(run.result, Err(NestboxError::Manifest { .. })));
    assert!(run.records.is_empty());
    assert_no_leftovers(&work);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let (_dir, work, tool) = workspace();
    let run = run_engine(&server, &work, &tool, Ok(LaunchOutcome::ExitedNormally(0))).await;

    assert!(matches!(run.result, Err(NestboxError::Auth { .. })));
    assert!(run.records.is_empty());
    assert_no_leftovers(&work);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_host_binary_is_setup_error() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    serve_manifest(&server, &["sha256:one"]).await;
    serve_blob(&server, "sha256:one", 200, gzip_layer(&[("a", b"a")]), 1).await;

    let (dir, work, _tool) = workspace();
    let missing = dir.path().join("host/absent");
    let outcome = Ok(LaunchOutcome::ExitedNormally(0));
    let run = run_engine(&server, &work, &missing, outcome).await;

    assert!(matches!(run.result, Err(NestboxError::Setup { .. })));
    assert!(run.records.is_empty());
    assert_no_leftovers(&work);
}

#[tokio::test(flavor = "multi_thread")]
async fn launch_failure_still_removes_root() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    serve_manifest(&server, &["sha256:one"]).await;
    serve_blob(&server, "sha256:one", 200, gzip_layer(&[("etc/motd", b"one")]), 1).await;

    let (_dir, work, tool) = workspace();
    let run = run_engine(&server, &work, &tool, Err("operation not permitted".into())).await;

    assert!(matches!(run.result, Err(NestboxError::Launch { .. })));
    assert_eq!(exit::resolve(&run.result), FAILURE_EXIT_CODE);
    assert_eq!(run.records.len(), 1);
    assert_no_leftovers(&work);
}

// ── Interrupts ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn interrupt_between_stages_removes_root_and_downloads() {
    let server = MockServer::start().await;
    serve_token(&server).await;
    serve_manifest(&server, &["sha256:one"]).await;
    serve_blob(&server, "sha256:one", 200, gzip_layer(&[("etc/motd", b"one")]), 1).await;

    let (_dir, work, tool) = workspace();
    let config = NestboxConfig {
        registry: RegistryConfig::single_host(&server.uri()),
        work_dir: work.clone(),
    };
    let request = RunRequest {
        image: "alpine".into(),
        command: tool.display().to_string(),
        args: Vec::new(),
    };
    let (result, action) = blocking(move || {
        let interrupts = Arc::new(InterruptGuard::new());
        let action = Arc::new(Mutex::new(None));
        let launcher = InterruptingLauncher {
            interrupts: Arc::clone(&interrupts),
            action: Arc::clone(&action),
        };
        let engine =
            Engine::with_launcher(config, Box::new(launcher)).with_interrupts(interrupts);
        let result = engine.run(&request);
        let action = *action.lock().expect("lock poisoned");
        (result, action)
    })
    .await;

    assert_eq!(action, Some(InterruptAction::Exit));
    assert!(result.is_ok(), "release after an interrupt must not fail");
    assert_no_leftovers(&work);
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_guard_refuses_to_start_a_run() {
    let server = MockServer::start().await;
    serve_token(&server).await;

    let (_dir, work, tool) = workspace();
    let config = NestboxConfig {
        registry: RegistryConfig::single_host(&server.uri()),
        work_dir: work.clone(),
    };
    let request = RunRequest {
        image: "alpine".into(),
        command: tool.display().to_string(),
        args: Vec::new(),
    };
    let run = blocking(move || {
        let interrupts = Arc::new(InterruptGuard::new());
        let _ = interrupts.interrupt();
        let records = Arc::new(Mutex::new(Vec::new()));
        let launcher = RecordingLauncher {
            records: Arc::clone(&records),
            outcome: Ok(LaunchOutcome::ExitedNormally(0)),
        };
        let engine =
            Engine::with_launcher(config, Box::new(launcher)).with_interrupts(interrupts);
        let result = engine.run(&request);
        let records = records.lock().expect("lock poisoned").clone();
        Run { result, records }
    })
    .await;

    assert!(matches!(run.result, Err(NestboxError::Setup { .. })));
    assert!(run.records.is_empty());
    assert_no_leftovers(&work);
}
