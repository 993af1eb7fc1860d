//! Tracing subscriber setup, initialized once at startup.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `level` seeds the default filter;
/// `RUST_LOG` always overrides it when set. `json` switches the output
/// format for log-aggregator consumption.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!("Initialized logger");
}
