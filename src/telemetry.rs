// Tracing subscriber setup for host binaries and demos
// Library code only emits events; installing a subscriber is the host's call

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::components::{PushError, PushResult};
use crate::config::{LogConfig, LogFormat};

/// Install a global fmt subscriber. `RUST_LOG` wins over the configured level.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> PushResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| PushError::config("log_level", e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.map_err(|e| PushError::config("tracing", e.to_string()))
}
