//! End-to-end mirror runs against local repositories with the real `git`.
//!
//! Skipped when no `git` executable is on `PATH`.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use gittig_core::{Config, Phase, ProjectConfig, ProjectId};
use gittig_sync::pipeline::{self, RunOptions};
use gittig_sync::state::StatusTable;
use gittig_sync::testing::write_test_key;
use gittig_sync::StopSignal;
use tempfile::TempDir;

fn git_available() -> bool {
    let _ = env_logger::builder().is_test(true).try_init();
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=gittig",
            "-c",
            "user.email=gittig@example.com",
            "-c",
            "init.defaultBranch=main",
        ])
        .arg("-C")
        .arg(dir)
        .args(args)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {args:?} failed in {}", dir.display());
}

fn commit(origin: &Path, file: &str) {
    std::fs::write(origin.join(file), file).unwrap();
    git(origin, &["add", file]);
    git(origin, &["commit", "--quiet", "-m", file]);
}

struct Fixture {
    _dir: TempDir,
    origin: std::path::PathBuf,
    target: std::path::PathBuf,
    config: Config,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let origin = dir.path().join("origin");
    let mirrors = dir.path().join("mirrors");
    let target = mirrors.join("svc");
    std::fs::create_dir_all(&origin).unwrap();
    std::fs::create_dir_all(&target).unwrap();

    git(&origin, &["init", "--quiet"]);
    commit(&origin, "README");
    git(&target, &["init", "--quiet", "--bare"]);

    let mut projects = BTreeMap::new();
    projects.insert(
        "svc".to_string(),
        ProjectConfig {
            local_name: "svc".to_string(),
            origin_url: origin.display().to_string(),
        },
    );
    let config = Config {
        default_url: format!("{}/", mirrors.display()),
        data_path: dir.path().join("data"),
        ssh_key: write_test_key(dir.path()),
        parallel: false,
        github_projects: Vec::new(),
        projects,
        sync_interval_secs: None,
    };
    Fixture {
        _dir: dir,
        origin,
        target,
        config,
    }
}

fn run(config: &Config) -> (Phase, Vec<String>) {
    let table = Arc::new(StatusTable::new());
    let summary = pipeline::run(config, &RunOptions::default(), table.clone(), StopSignal::new())
        .expect("run");
    let id = ProjectId::from("svc");
    let log = table
        .get(&id)
        .map(|s| s.log.into_iter().map(|l| l.text).collect())
        .unwrap_or_default();
    (summary.phase_of(&id).expect("svc in summary"), log)
}

fn head_of(repo: &Path) -> String {
    let out = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(["rev-parse", "refs/heads/main"])
        .output()
        .expect("rev-parse");
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

#[test]
fn first_run_mirrors_then_second_run_is_noop() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let fx = fixture();

    let (phase, log) = run(&fx.config);
    assert_eq!(phase, Phase::Done, "{log:?}");
    assert_eq!(log.len(), 4, "{log:?}");
    assert_eq!(head_of(&fx.target), head_of(&fx.origin));
    assert!(fx.config.data_path.join("svc").join("HEAD").is_file());

    let (phase, log) = run(&fx.config);
    assert_eq!(phase, Phase::DoneNothing, "{log:?}");
    assert_eq!(log[0], "repository already exists, opening it");
    assert_eq!(log[1], "already up to date with origin");
}

#[test]
fn new_origin_commit_is_pushed_on_next_run() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let fx = fixture();
    run(&fx.config);

    commit(&fx.origin, "CHANGELOG");
    let (phase, log) = run(&fx.config);
    assert_eq!(phase, Phase::Done, "{log:?}");
    assert_eq!(log[1], "fetched updates from origin");
    assert_eq!(head_of(&fx.target), head_of(&fx.origin));
}

#[test]
fn unreachable_origin_ends_in_error_naming_clone() {
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let mut fx = fixture();
    if let Some(project) = fx.config.projects.get_mut("svc") {
        project.origin_url = fx.origin.join("missing").display().to_string();
    }

    let (phase, log) = run(&fx.config);
    assert_eq!(phase, Phase::Error);
    assert!(log.last().unwrap().starts_with("clone failed:"), "{log:?}");
}
