//! gitmirror daemon: notification listener, content listener and the
//! update pipeline that ties them to the synchronizer.
//!
//! - [`auth`]: signature / token validation of notifications
//! - [`content`]: static listener that can be rebound to a new root
//! - [`update`]: sync, flip, persist, rebind
//! - [`webhook`]: `/webhook` and `/health` routes
//! - [`log_rotation`]: size-rotating log file writer

pub mod auth;
pub mod content;
mod error;
pub mod log_rotation;
mod runtime;
mod state;
pub mod update;
pub mod webhook;

pub use content::{ContentServerManager, ServerInfo, DEFAULT_GRACE_PERIOD};
pub use error::DaemonError;
pub use runtime::{init_console_tracing, run, serve_webhook, start_blocking, ServeOptions};
pub use state::AppState;
pub use update::{run_update, UpdateReport};
pub use webhook::{health_report, router, HealthReport};
