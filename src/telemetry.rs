//! Tracing subscriber setup shared by both binaries.

use tracing_subscriber::EnvFilter;

/// Logs to stderr so stdout stays free for board echo and the final report.
///
/// `RUST_LOG` wins over `level`; an unparsable filter falls back to `info`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
