//! gittig daemon: periodic mirror runs, config watcher and control socket.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_status, request_stop, request_sync, send_request, DaemonRequest, DaemonResponse,
    RunRecord, StatusReport,
};
pub use runtime::{init_tracing, run, run_with, start_blocking, STATUS_LOG_TAIL};
