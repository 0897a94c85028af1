//! Console logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Maps a `--debug-level` value onto a tracing filter directive.
///
/// Accepts the classic level names (`DEBUG`, `INFO`, `WARNING`, `ERROR`,
/// `CRITICAL`) in any case. Unknown names fall back to `info`.
pub fn level_directive(debug_level: &str) -> &'static str {
    match debug_level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        _ => "info",
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `debug_level`.
pub fn init_logging(debug_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(debug_level)));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_thread_names(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}
