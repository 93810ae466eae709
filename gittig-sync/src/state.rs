//! Project lifecycle state machine and the in-memory status table.
//!
//! ```text
//! Unknown ─▶ Waiting ─▶ Downloading ─▶ Uploading ─▶ Done | DoneNothing
//!    └──────────┴────────────┴─────────────┴──────▶ Error
//! ```
//!
//! `Done`, `DoneNothing` and `Error` are terminal for the rest of the run.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gittig_core::{Phase, ProjectDescriptor, ProjectId};

use crate::sink::StatusSink;

/// Whether `from → to` is a legal lifecycle transition.
pub fn can_transition(from: Phase, to: Phase) -> bool {
    if from.is_terminal() {
        return false;
    }
    match to {
        Phase::Unknown => false,
        Phase::Done | Phase::DoneNothing => from == Phase::Uploading,
        Phase::Waiting | Phase::Downloading | Phase::Uploading | Phase::Error => true,
    }
}

/// One timestamped line of a project's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// Phase and log of one project during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub id: ProjectId,
    pub phase: Phase,
    #[serde(default)]
    pub log: Vec<LogLine>,
}

impl ProjectState {
    pub fn new(id: ProjectId) -> Self {
        Self {
            id,
            phase: Phase::Unknown,
            log: Vec::new(),
        }
    }

    /// Copy keeping only the last `n` log lines.
    pub fn tail(&self, n: usize) -> Self {
        let skip = self.log.len().saturating_sub(n);
        Self {
            id: self.id.clone(),
            phase: self.phase,
            log: self.log[skip..].to_vec(),
        }
    }
}

/// Thread-safe table of [`ProjectState`], keyed by project id.
///
/// A single coarse lock; writers append a short line or overwrite one field.
#[derive(Debug, Default)]
pub struct StatusTable {
    inner: Mutex<BTreeMap<ProjectId, ProjectState>>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset each listed project to a fresh `Unknown` entry. Projects outside
    /// the run keep their last state.
    pub fn begin_run<'a>(&self, projects: impl IntoIterator<Item = &'a ProjectId>) {
        let mut table = self.lock();
        for id in projects {
            table.insert(id.clone(), ProjectState::new(id.clone()));
        }
    }

    /// Drop every project not in `keep`.
    pub fn retain<'a>(&self, keep: impl IntoIterator<Item = &'a ProjectId>) {
        let keep: HashSet<&ProjectId> = keep.into_iter().collect();
        self.lock().retain(|id, _| keep.contains(id));
    }

    pub fn get(&self, id: &ProjectId) -> Option<ProjectState> {
        self.lock().get(id).cloned()
    }

    /// Current phase; `Unknown` for projects never seen.
    pub fn phase(&self, id: &ProjectId) -> Phase {
        self.lock().get(id).map(|s| s.phase).unwrap_or_default()
    }

    /// All states, sorted by id.
    pub fn snapshot(&self) -> Vec<ProjectState> {
        self.lock().values().cloned().collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.lock().values().all(|s| s.phase.is_terminal())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ProjectId, ProjectState>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSink for StatusTable {
    fn record_event(&self, project: &ProjectId, phase: Phase) {
        let mut table = self.lock();
        let state = table
            .entry(project.clone())
            .or_insert_with(|| ProjectState::new(project.clone()));
        if can_transition(state.phase, phase) {
            state.phase = phase;
        } else {
            tracing::warn!(
                "[{project}] ignoring illegal transition {} -> {phase}",
                state.phase
            );
        }
    }

    fn append_log(&self, project: &ProjectId, text: &str) {
        let mut table = self.lock();
        table
            .entry(project.clone())
            .or_insert_with(|| ProjectState::new(project.clone()))
            .log
            .push(LogLine {
                at: Utc::now(),
                text: text.to_string(),
            });
    }

    fn run_started(&self, projects: &[ProjectDescriptor]) {
        self.begin_run(projects.iter().map(|p| &p.id));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn happy_path_transitions_are_legal() {
        let path = [
            Phase::Unknown,
            Phase::Waiting,
            Phase::Downloading,
            Phase::Downloading,
            Phase::Uploading,
            Phase::Done,
        ];
        for pair in path.windows(2) {
            assert!(can_transition(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_phases_never_transition() {
        for from in [Phase::Done, Phase::DoneNothing, Phase::Error] {
            for to in [Phase::Waiting, Phase::Downloading, Phase::Error, Phase::Done] {
                assert!(!can_transition(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn done_requires_uploading() {
        assert!(!can_transition(Phase::Downloading, Phase::Done));
        assert!(!can_transition(Phase::Waiting, Phase::DoneNothing));
        assert!(can_transition(Phase::Downloading, Phase::Error));
        assert!(!can_transition(Phase::Waiting, Phase::Unknown));
    }

    #[test]
    fn table_ignores_transition_out_of_terminal() {
        let table = StatusTable::new();
        let id = ProjectId::from("svc");
        table.record_event(&id, Phase::Waiting);
        table.record_event(&id, Phase::Error);
        table.record_event(&id, Phase::Downloading);
        assert_eq!(table.phase(&id), Phase::Error);
    }

    #[test]
    fn begin_run_resets_previous_state() {
        let table = StatusTable::new();
        let id = ProjectId::from("svc");
        table.record_event(&id, Phase::Error);
        table.append_log(&id, "boom");

        table.begin_run([&id]);
        let state = table.get(&id).expect("state");
        assert_eq!(state.phase, Phase::Unknown);
        assert!(state.log.is_empty());
        assert!(!table.all_terminal());
    }

    #[test]
    fn single_project_run_keeps_other_projects() {
        let table = StatusTable::new();
        let svc = ProjectId::from("svc");
        let web = ProjectId::from("web");
        table.begin_run([&svc, &web]);
        for id in [&svc, &web] {
            table.record_event(id, Phase::Waiting);
            table.record_event(id, Phase::Error);
            table.append_log(id, "clone failed: boom");
        }

        table.begin_run([&svc]);
        assert_eq!(table.phase(&svc), Phase::Unknown);
        assert_eq!(table.phase(&web), Phase::Error);
        assert_eq!(table.get(&web).expect("web").log.len(), 1);
    }

    #[test]
    fn retain_drops_unlisted_projects() {
        let table = StatusTable::new();
        let svc = ProjectId::from("svc");
        let gone = ProjectId::from("gone");
        table.begin_run([&svc, &gone]);
        table.retain([&svc]);
        assert!(table.get(&gone).is_none());
        assert!(table.get(&svc).is_some());
    }

    #[test]
    fn tail_keeps_latest_lines() {
        let table = StatusTable::new();
        let id = ProjectId::from("svc");
        for n in 0..5 {
            table.append_log(&id, &format!("line {n}"));
        }
        let tail = table.get(&id).unwrap().tail(2);
        let texts: Vec<_> = tail.log.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["line 3", "line 4"]);
    }

    #[test]
    fn concurrent_appends_do_not_tear() {
        let table = Arc::new(StatusTable::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let table = table.clone();
                thread::spawn(move || {
                    let id = ProjectId::from(format!("p{worker}"));
                    for n in 0..100 {
                        table.append_log(&id, &format!("{worker}:{n}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker");
        }

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 8);
        for state in snapshot {
            assert_eq!(state.log.len(), 100);
            let ordered = state
                .log
                .iter()
                .enumerate()
                .all(|(i, line)| line.text.ends_with(&format!(":{i}")));
            assert!(ordered, "log of {} out of order", state.id);
        }
    }
}
