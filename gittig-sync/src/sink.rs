//! Status Sink: the one capability every observer of a run implements.

use std::sync::Arc;

use gittig_core::{Phase, ProjectDescriptor, ProjectId};

/// Receives lifecycle events and log lines from running pipelines.
///
/// Both methods are called concurrently from every worker thread of a run.
pub trait StatusSink: Send + Sync {
    fn record_event(&self, project: &ProjectId, phase: Phase);

    fn append_log(&self, project: &ProjectId, text: &str);

    /// Called once by the scheduler before any pipeline starts.
    fn run_started(&self, _projects: &[ProjectDescriptor]) {}
}

impl<S: StatusSink + ?Sized> StatusSink for Arc<S> {
    fn record_event(&self, project: &ProjectId, phase: Phase) {
        (**self).record_event(project, phase);
    }

    fn append_log(&self, project: &ProjectId, text: &str) {
        (**self).append_log(project, text);
    }

    fn run_started(&self, projects: &[ProjectDescriptor]) {
        (**self).run_started(projects);
    }
}

/// Forwards everything to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn record_event(&self, project: &ProjectId, phase: Phase) {
        match phase {
            Phase::Error => tracing::warn!("[{project}] {}", phase.label()),
            _ => tracing::info!("[{project}] {}", phase.label()),
        }
    }

    fn append_log(&self, project: &ProjectId, text: &str) {
        tracing::info!("[{project}] {text}");
    }

    fn run_started(&self, projects: &[ProjectDescriptor]) {
        tracing::info!("mirror run started for {} project(s)", projects.len());
    }
}

/// Broadcasts to several sinks, in insertion order.
#[derive(Clone, Default)]
pub struct Fanout {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl StatusSink for Fanout {
    fn record_event(&self, project: &ProjectId, phase: Phase) {
        for sink in &self.sinks {
            sink.record_event(project, phase);
        }
    }

    fn append_log(&self, project: &ProjectId, text: &str) {
        for sink in &self.sinks {
            sink.append_log(project, text);
        }
    }

    fn run_started(&self, projects: &[ProjectDescriptor]) {
        for sink in &self.sinks {
            sink.run_started(projects);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StatusTable;

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(StatusTable::new());
        let b = Arc::new(StatusTable::new());
        let fanout = Fanout::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(LogSink));
        let id = ProjectId::from("svc");

        fanout.record_event(&id, Phase::Waiting);
        fanout.append_log(&id, "hello");

        for table in [&a, &b] {
            assert_eq!(table.phase(&id), Phase::Waiting);
            assert_eq!(table.get(&id).expect("state").log.len(), 1);
        }
    }
}
