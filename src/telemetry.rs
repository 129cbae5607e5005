//! Logging configuration
//!
//! Plain tracing-based logging to stderr. The contract lines the binaries
//! print (status, mismatches) do not go through here.
//!
//! # Example
//!
//! ```no_run
//! use gfd_verify::telemetry::init_logging;
//!
//! init_logging();
//! // Logs will go to stderr with the configured level
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize logging with tracing-subscriber
///
/// Uses RUST_LOG env var for filtering (default: info).
/// Call once at the start of your test or application.
pub fn init_logging() {
    init_logging_with("info");
}

/// Initialize logging with a fallback directive for when RUST_LOG is unset
pub fn init_logging_with(default_directive: &str) {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
