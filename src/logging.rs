//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{ModbusError, Result};

/// Installs a formatting subscriber. `RUST_LOG` wins over `level` when set.
///
/// Fails if `level` is not a valid filter directive or a global subscriber
/// is already installed.
pub fn init_logging(level: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| ModbusError::Config(format!("Invalid log level {:?}: {}", level, e)))?,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| ModbusError::Config(format!("Logging already initialized: {}", e)))
}
