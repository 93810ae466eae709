//! # gittig-sync
//!
//! Mirror pipeline, scheduler and status reporting.
//!
//! Call [`pipeline::run`] to mirror every project of a [`gittig_core::Config`]
//! with the system `git`, or build a [`Scheduler`] around any
//! [`VersionControl`] backend and [`StatusSink`].

pub mod credential;
pub mod error;
pub mod git;
pub mod mirror;
pub mod pipeline;
pub mod scheduler;
pub mod sink;
pub mod state;
pub mod testing;
pub mod vcs;

pub use credential::Credential;
pub use error::{CredentialError, SyncError, VcsError};
pub use git::GitCli;
pub use mirror::MirrorPipeline;
pub use pipeline::{RunOptions, SyncScope};
pub use scheduler::{ProjectOutcome, RunSummary, Scheduler, StopSignal};
pub use sink::{Fanout, LogSink, StatusSink};
pub use state::{ProjectState, StatusTable};
pub use vcs::{Outcome, VersionControl};
