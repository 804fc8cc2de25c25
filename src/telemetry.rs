use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global tracing subscriber, writing to stderr so stdout stays
/// free for command output. `RUST_LOG` overrides `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    // A subscriber may already be installed (e.g. by a test harness).
    let _ = if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
