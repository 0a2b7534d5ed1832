use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber. Logs go to stderr so stdout only carries results.
///
/// `RUST_LOG` wins when set; otherwise warnings only, or debug with `--verbose`.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}
