//! HTTP API module.
//!
//! The HTTP server, its response types and the log channel every stage
//! writes to.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::{log_error, log_info, log_success, log_warning, LogEntry, LogLevel};
pub use server::{router, start_server};
pub use types::{error_response, TransformResponse};
