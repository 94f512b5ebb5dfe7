// studywithme/src/telemetry.rs

use tracing_subscriber::{fmt, EnvFilter};

/// HTTP and pool internals stay quiet unless RUST_LOG asks for them.
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn,r2d2=warn";

/// Install the global fmt subscriber. Later calls are ignored.
///
/// Logs are written to stderr; stdout belongs to the chat and quiz prompts.
pub fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter_directives(std::env::var("RUST_LOG").ok())))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn filter_directives(rust_log: Option<String>) -> String {
    rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}
