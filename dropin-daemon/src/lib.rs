//! Launcher runtime: wires the watcher, the deployers and the stability
//! engine, and serves the control socket.

mod error;
pub mod launcher;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use launcher::{Launcher, LauncherStatus};
pub use protocol::{
    request_stability, request_status, request_stop, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
