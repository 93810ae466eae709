use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use gittig_core::{config, registry, Config, ProjectId};
use gittig_sync::pipeline::{self, RunOptions, SyncScope};
use gittig_sync::{Fanout, GitCli, LogSink, StatusTable, StopSignal, VersionControl};

use crate::error::{io_err, DaemonError};
use crate::paths::{gittig_root, socket_path, DEBOUNCE_WINDOW, LOG_JSON_ENV};
use crate::protocol::{DaemonRequest, DaemonResponse, RunRecord, StatusReport};

/// Log lines kept per project in `status` replies.
pub const STATUS_LOG_TAIL: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SyncTarget {
    All,
    Project(String),
}

impl SyncTarget {
    fn scope(&self) -> SyncScope {
        match self {
            SyncTarget::All => SyncScope::All,
            SyncTarget::Project(id) => SyncScope::Project(ProjectId::from(id.as_str())),
        }
    }

    fn label(&self) -> String {
        match self {
            SyncTarget::All => "all".to_string(),
            SyncTarget::Project(id) => id.clone(),
        }
    }
}

struct SyncJob {
    target: SyncTarget,
    source: &'static str,
    respond_to: oneshot::Sender<Result<RunRecord, String>>,
}

/// State shared by every daemon task.
struct Shared {
    home: PathBuf,
    config_path: PathBuf,
    started_at: DateTime<Utc>,
    sync_interval: Duration,
    config: RwLock<Config>,
    table: Arc<StatusTable>,
    last_run: RwLock<Option<RunRecord>>,
    /// Raised once on shutdown and handed to every run, so a run that starts
    /// after shutdown skips all of its projects.
    stop: StopSignal,
    run_in_progress: RwLock<bool>,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, config_path: &Path) -> Result<(), DaemonError> {
    init_tracing("info");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config_path.to_path_buf()))
}

/// Run the daemon with the system `git`.
pub async fn run(home: PathBuf, config_path: PathBuf) -> Result<(), DaemonError> {
    run_with(home, config_path, Arc::new(GitCli::new())).await
}

/// Run the daemon against any [`VersionControl`] backend.
pub async fn run_with<V>(home: PathBuf, config_path: PathBuf, vcs: Arc<V>) -> Result<(), DaemonError>
where
    V: VersionControl + 'static,
{
    let root = gittig_root(&home);
    fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

    let config = config::load(&config_path)?;
    tracing::info!(
        config = %config_path.display(),
        interval_secs = config.sync_interval().as_secs(),
        "gittig daemon starting",
    );

    let shared = Arc::new(Shared {
        home: home.clone(),
        config_path: config_path.clone(),
        started_at: Utc::now(),
        sync_interval: config.sync_interval(),
        config: RwLock::new(config),
        table: Arc::new(StatusTable::new()),
        last_run: RwLock::new(None),
        stop: StopSignal::new(),
        run_in_progress: RwLock::new(false),
    });

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let schedule_handle = {
        let shutdown = shutdown_tx.clone();
        let sync_tx = sync_tx.clone();
        let period = shared.sync_interval;
        tokio::spawn(async move {
            let result = schedule_task(period, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(shared, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        tokio::spawn(async move {
            let result = run_processor_task(shared, vcs, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let stop_relay_handle = {
        let shared = shared.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let _ = shutdown_rx.recv().await;
            shared.stop.stop();
            if *shared.run_in_progress.read().await {
                tracing::info!("stopping in-flight run");
            }
            Ok::<(), DaemonError>(())
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let shared = shared.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(shared, sync_tx, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(sync_tx);

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (schedule_result, watcher_result, processor_result, relay_result, socket_result, signal_result) = tokio::join!(
        schedule_handle,
        watcher_handle,
        processor_handle,
        stop_relay_handle,
        socket_handle,
        signal_handle
    );

    handle_join("schedule", schedule_result)?;
    handle_join("config_watcher", watcher_result)?;
    handle_join("run_processor", processor_result)?;
    handle_join("stop_relay", relay_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("gittig daemon stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn schedule_task(
    period: Duration,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                match enqueue_sync(&sync_tx, SyncTarget::All, "schedule").await {
                    Ok(record) => log_record(&record),
                    Err(DaemonError::ChannelClosed(_)) => break,
                    Err(err) => tracing::error!(error = %err, "scheduled run failed"),
                }
            }
        }
    }
    Ok(())
}

/// Reload the configuration when its file changes, then run everything.
async fn watcher_task(
    shared: Arc<Shared>,
    sync_tx: mpsc::Sender<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let config_path = fs::canonicalize(&shared.config_path)
        .map_err(|e| io_err(&shared.config_path, e))?;
    let Some(config_dir) = config_path.parent().map(Path::to_path_buf) else {
        return Err(DaemonError::Protocol(format!(
            "config file has no parent directory: {}",
            config_path.display()
        )));
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    // Editors often replace the file, so watch its directory.
    watcher.watch(&config_dir, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %config_dir.display(), "watching config directory");

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                let touched = event.paths.iter().any(|path| is_config_file(path, &config_path));
                if !touched || !should_process_event(&mut debounce, &config_path, Instant::now()) {
                    continue;
                }

                if !reload_config(&shared).await {
                    continue;
                }
                match enqueue_sync(&sync_tx, SyncTarget::All, "watcher").await {
                    Ok(record) => log_record(&record),
                    Err(DaemonError::ChannelClosed(_)) => break,
                    Err(err) => tracing::error!(error = %err, "watcher-triggered run failed"),
                }
            }
        }
    }

    drop(watcher);
    Ok(())
}

/// Single consumer of the job queue; at most one run is in flight.
async fn run_processor_task<V>(
    shared: Arc<Shared>,
    vcs: Arc<V>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    V: VersionControl + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };

                let config = shared.config.read().await.clone();
                let options = RunOptions {
                    scope: job.target.scope(),
                    parallel: None,
                };
                let stop = shared.stop.clone();
                *shared.run_in_progress.write().await = true;

                let sink = Fanout::new()
                    .with(shared.table.clone())
                    .with(Arc::new(LogSink));
                let vcs = vcs.clone();
                let result = tokio::task::spawn_blocking(move || {
                    pipeline::run_with(&*vcs, &config, &options, sink, stop)
                })
                .await;
                *shared.run_in_progress.write().await = false;
                let result =
                    result.map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;

                let outcome = match result {
                    Ok(summary) => {
                        let record = RunRecord {
                            source: job.source.to_string(),
                            target: job.target.label(),
                            finished_at: Utc::now(),
                            summary,
                        };
                        *shared.last_run.write().await = Some(record.clone());
                        Ok(record)
                    }
                    Err(err) => Err(err.to_string()),
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    shared: Arc<Shared>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = socket_path(&shared.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let shared = shared.clone();
                let sync_tx = sync_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, shared, sync_tx, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    shared: Arc<Shared>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(json!(build_status_report(&shared).await)),
            "sync" => {
                let target = match request.project {
                    Some(id) => SyncTarget::Project(id),
                    None => SyncTarget::All,
                };
                match enqueue_sync(&sync_tx, target, "socket").await {
                    Ok(record) => DaemonResponse::ok(json!(record)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn build_status_report(shared: &Shared) -> StatusReport {
    let last_run = shared.last_run.read().await.clone();
    let run_in_progress = *shared.run_in_progress.read().await;
    let projects = shared
        .table
        .snapshot()
        .iter()
        .map(|state| state.tail(STATUS_LOG_TAIL))
        .collect();

    StatusReport {
        running: true,
        pid: std::process::id(),
        started_at: shared.started_at,
        config: shared.config_path.clone(),
        socket: socket_path(&shared.home),
        sync_interval_secs: shared.sync_interval.as_secs(),
        run_in_progress,
        last_run,
        projects,
    }
}

/// Returns whether the new configuration was installed.
async fn reload_config(shared: &Shared) -> bool {
    let path = shared.config_path.clone();
    let loaded = tokio::task::spawn_blocking(move || config::load(&path)).await;
    match loaded {
        Ok(Ok(config)) => {
            if let Ok(projects) = registry::build_registry(&config) {
                shared.table.retain(projects.iter().map(|p| &p.id));
            }
            *shared.config.write().await = config;
            tracing::info!(config = %shared.config_path.display(), "configuration reloaded");
            true
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "keeping previous configuration");
            false
        }
        Err(err) => {
            tracing::error!(error = %err, "config reload task failed");
            false
        }
    }
}

async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    target: SyncTarget,
    source: &'static str,
) -> Result<RunRecord, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob {
            target,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn log_record(record: &RunRecord) {
    let summary = &record.summary;
    tracing::info!(
        source = %record.source,
        target = %record.target,
        projects = summary.projects.len(),
        failed = summary.count(gittig_core::Phase::Error),
        duration_ms = summary.duration_ms,
        "mirror run completed",
    );
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_config_file(path: &Path, config_path: &Path) -> bool {
    path == config_path
        || (path.file_name() == config_path.file_name() && path.parent() == config_path.parent())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the global subscriber. `default_level` applies when `RUST_LOG`
/// is unset. Records sent through the `log` facade are captured too.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if std::env::var_os(LOG_JSON_ENV).is_some() {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
