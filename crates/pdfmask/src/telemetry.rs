//! Logging initialisation for host applications.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber and routes `log` records into it.
///
/// `RUST_LOG` takes precedence over `default_filter`. Returns false when a
/// subscriber was already installed, which is not an error.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }

    // The HTTP client and channel pump log through the `log` facade.
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge already installed: {}", e);
    }
    true
}
