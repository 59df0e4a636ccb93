use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initializes tracing for batch invocations.
///
/// Respects `RUST_LOG`, defaulting to `info`. Output goes to stderr so the
/// generated artifact listing on stdout stays machine-readable. Safe to call
/// once per process; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
