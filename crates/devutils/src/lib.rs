//! Shared helpers for the ember binaries and tests.

mod mock;

use tracing::{event, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub use self::mock::MockSocket;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the given default filter.
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        event!(Level::WARN, "global logging subscriber was already set");
    }
}
