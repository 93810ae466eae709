//! Drives a real daemon over its Unix socket, backed by a scripted client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gittig_core::{Phase, ProjectId};
use gittig_daemon::paths::socket_path;
use gittig_daemon::{request_status, request_stop, request_sync, DaemonError};
use gittig_sync::testing::{write_test_key, Reply, Script, ScriptedVcs};
use tempfile::TempDir;

fn write_config(dir: &Path) -> PathBuf {
    let key = write_test_key(dir);
    let path = dir.join("config.yaml");
    let body = format!(
        "default_url: 'git@mirror.example.com:'\n\
         data_path: {}\n\
         ssh_key: {}\n\
         parallel: true\n\
         github_projects:\n  - acme/widgets\n  - acme/gadgets\n",
        dir.join("data").display(),
        key.display()
    );
    std::fs::write(&path, body).expect("write config");
    path
}

fn wait_for_socket(home: &Path) {
    let socket = socket_path(home);
    for _ in 0..100 {
        if socket.exists() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("daemon socket never appeared at {}", socket.display());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_sync_and_stop_over_socket() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let config_path = write_config(work.path());
    let gadgets_workspace = work.path().join("data").join("acme/gadgets");
    let vcs = Arc::new(
        ScriptedVcs::new().with_script(gadgets_workspace.clone(), Script::up_to_date()),
    );

    let daemon = tokio::spawn(gittig_daemon::run_with(
        home.path().to_path_buf(),
        config_path,
        vcs.clone(),
    ));

    let home_path = home.path().to_path_buf();
    let (record, status, unknown) = tokio::task::spawn_blocking(move || {
        wait_for_socket(&home_path);
        let record = request_sync(&home_path, Some("acme/gadgets".to_string())).expect("sync");
        let status = request_status(&home_path).expect("status");
        let unknown = request_sync(&home_path, Some("nope/nope".to_string())).unwrap_err();
        request_stop(&home_path).expect("stop");
        (record, status, unknown)
    })
    .await
    .expect("client thread");

    assert_eq!(record.source, "socket");
    assert_eq!(record.target, "acme/gadgets");
    assert_eq!(record.summary.projects.len(), 1);
    assert_eq!(
        record.summary.phase_of(&ProjectId::from("acme/gadgets")),
        Some(Phase::DoneNothing)
    );

    assert!(status.running);
    assert!(status.last_run.is_some());
    assert!(!status.projects.is_empty());

    assert!(
        matches!(&unknown, DaemonError::Protocol(msg) if msg.contains("nope/nope")),
        "{unknown}"
    );

    tokio::time::timeout(Duration::from_secs(10), daemon)
        .await
        .expect("daemon exits after stop")
        .expect("join")
        .expect("daemon result");
    assert!(!socket_path(home.path()).exists());
    assert!(!vcs.ops_for(&gadgets_workspace).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_project_is_reported_not_fatal() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let config_path = write_config(work.path());
    let widgets_workspace = work.path().join("data").join("acme/widgets");
    let vcs = Arc::new(
        ScriptedVcs::new().with_script(widgets_workspace, Script::success().on_push(Reply::AuthFail)),
    );

    let daemon = tokio::spawn(gittig_daemon::run_with(
        home.path().to_path_buf(),
        config_path,
        vcs,
    ));

    let home_path = home.path().to_path_buf();
    let record = tokio::task::spawn_blocking(move || {
        wait_for_socket(&home_path);
        let record = request_sync(&home_path, None).expect("sync");
        request_stop(&home_path).expect("stop");
        record
    })
    .await
    .expect("client thread");

    assert!(!record.summary.is_success());
    assert_eq!(
        record.summary.phase_of(&ProjectId::from("acme/widgets")),
        Some(Phase::Error)
    );
    assert_eq!(
        record.summary.phase_of(&ProjectId::from("acme/gadgets")),
        Some(Phase::Done)
    );

    tokio::time::timeout(Duration::from_secs(10), daemon)
        .await
        .expect("daemon exits after stop")
        .expect("join")
        .expect("daemon result");
}

#[test]
fn missing_config_fails_before_binding() {
    let home = TempDir::new().expect("home");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let err = runtime
        .block_on(gittig_daemon::run(
            home.path().to_path_buf(),
            home.path().join("missing.yaml"),
        ))
        .unwrap_err();
    assert!(matches!(err, DaemonError::Config(_)), "{err}");
    assert!(!socket_path(home.path()).exists());
}
