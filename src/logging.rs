//! Logging initialization.
//!
//! Logs always go to stderr; stdout is reserved for generated source.
//! `RUST_LOG` overrides the verbosity flag. `STRATFORGE_LOG_FORMAT=json`
//! switches to structured JSON lines.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn json_requested(format: Option<&str>) -> bool {
    matches!(format.map(str::to_lowercase).as_deref(), Some("json"))
}

/// Installs the global subscriber. Calling it twice is harmless; the second
/// installation is ignored.
pub fn init_logging(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let format = std::env::var("STRATFORGE_LOG_FORMAT").ok();

    let result = if json_requested(format.as_deref()) {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("warning: logging already initialised: {e}");
    }
}
