//! Sync scheduler: runs one [`MirrorPipeline`] per project and waits for all
//! of them.
//!
//! Every launched worker reports its terminal phase exactly once over a
//! channel, through a [`CompletionGuard`] that also fires when the pipeline
//! panics. `start` returns after collecting one completion per launch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gittig_core::{Phase, ProjectDescriptor, ProjectId};

use crate::credential::Credential;
use crate::mirror::MirrorPipeline;
use crate::sink::StatusSink;
use crate::vcs::VersionControl;

/// Log line for projects never launched because the run was stopped.
pub const SKIPPED_LOG: &str = "skipped: run stopped before project started";

/// Cooperative stop flag shared between a run and whoever may cancel it.
///
/// Checked before each launch; steps already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal phase of one project in a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOutcome {
    pub id: ProjectId,
    pub phase: Phase,
}

/// Result of [`Scheduler::start`], in registry order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub parallel: bool,
    pub projects: Vec<ProjectOutcome>,
}

impl RunSummary {
    pub fn count(&self, phase: Phase) -> usize {
        self.projects.iter().filter(|p| p.phase == phase).count()
    }

    /// No project ended in `Error`.
    pub fn is_success(&self) -> bool {
        self.count(Phase::Error) == 0
    }

    pub fn phase_of(&self, id: &ProjectId) -> Option<Phase> {
        self.projects.iter().find(|p| &p.id == id).map(|p| p.phase)
    }
}

/// Owns the backend, sink and credential shared by every worker of a run.
pub struct Scheduler<V, S> {
    vcs: V,
    sink: S,
    credential: Credential,
    stop: StopSignal,
}

impl<V, S> Scheduler<V, S>
where
    V: VersionControl,
    S: StatusSink,
{
    pub fn new(vcs: V, sink: S, credential: Credential) -> Self {
        Self {
            vcs,
            sink,
            credential,
            stop: StopSignal::new(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Process every project and block until each is terminal.
    ///
    /// `parallel` launches one thread per project at once; otherwise each
    /// project finishes before the next one starts, in slice order.
    pub fn start(&self, projects: &[ProjectDescriptor], parallel: bool) -> RunSummary {
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            "starting {} mirror job(s), {}",
            projects.len(),
            if parallel { "parallel" } else { "sequential" }
        );
        self.sink.run_started(projects);

        let mut phases = vec![Phase::Unknown; projects.len()];
        let (tx, rx) = mpsc::channel::<(usize, Phase)>();
        let mut launched = 0usize;

        thread::scope(|scope| {
            let mut handles = Vec::new();
            for (index, project) in projects.iter().enumerate() {
                if self.stop.is_stopped() {
                    self.skip(project);
                    phases[index] = Phase::Error;
                    continue;
                }

                let tx = tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("mirror-{}", project.id))
                    .spawn_scoped(scope, move || {
                        let guard = CompletionGuard::new(index, &project.id, tx, &self.sink);
                        let phase =
                            MirrorPipeline::new(&self.vcs, &self.sink, &self.credential).run(project);
                        guard.complete(phase);
                    });
                let handle = match spawned {
                    Ok(handle) => handle,
                    Err(err) => {
                        tracing::error!("[{}] cannot spawn worker: {err}", project.id);
                        self.sink
                            .append_log(&project.id, &format!("cannot start worker: {err}"));
                        self.sink.record_event(&project.id, Phase::Error);
                        phases[index] = Phase::Error;
                        continue;
                    }
                };
                launched += 1;

                if parallel {
                    handles.push(handle);
                } else {
                    join_worker(handle);
                }
            }
            for handle in handles {
                join_worker(handle);
            }
        });
        drop(tx);

        for _ in 0..launched {
            match rx.recv() {
                Ok((index, phase)) => phases[index] = phase,
                Err(_) => break,
            }
        }

        let summary = RunSummary {
            started_at,
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            parallel,
            projects: projects
                .iter()
                .zip(phases)
                .map(|(p, phase)| ProjectOutcome {
                    id: p.id.clone(),
                    phase,
                })
                .collect(),
        };
        tracing::info!(
            "mirror run finished in {}ms: {} updated, {} up to date, {} failed",
            summary.duration_ms,
            summary.count(Phase::Done),
            summary.count(Phase::DoneNothing),
            summary.count(Phase::Error)
        );
        summary
    }

    fn skip(&self, project: &ProjectDescriptor) {
        tracing::info!("[{}] {SKIPPED_LOG}", project.id);
        self.sink.append_log(&project.id, SKIPPED_LOG);
        self.sink.record_event(&project.id, Phase::Error);
    }
}

/// A panicking worker was already reported by its guard; joining only
/// keeps the panic from escaping the scope.
fn join_worker(handle: thread::ScopedJoinHandle<'_, ()>) {
    if handle.join().is_err() {
        tracing::error!("mirror worker panicked");
    }
}

/// Sends the worker's completion exactly once, even on unwind.
struct CompletionGuard<'a, S: StatusSink> {
    index: usize,
    id: &'a ProjectId,
    tx: Sender<(usize, Phase)>,
    sink: &'a S,
    completed: bool,
}

impl<'a, S: StatusSink> CompletionGuard<'a, S> {
    fn new(index: usize, id: &'a ProjectId, tx: Sender<(usize, Phase)>, sink: &'a S) -> Self {
        Self {
            index,
            id,
            tx,
            sink,
            completed: false,
        }
    }

    fn complete(mut self, phase: Phase) {
        self.completed = true;
        let _ = self.tx.send((self.index, phase));
    }
}

impl<S: StatusSink> Drop for CompletionGuard<'_, S> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        self.sink.append_log(self.id, "pipeline aborted unexpectedly");
        self.sink.record_event(self.id, Phase::Error);
        let _ = self.tx.send((self.index, Phase::Error));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
