//! Runtime error types.

use qgate_core::{ApiError, GatewayError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while building or running a bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A gateway connection stopped with a fatal error.
    #[error("Gateway error on shard {shard}: {source}")]
    Gateway {
        shard: u32,
        #[source]
        source: GatewayError,
    },

    /// A REST call needed during startup failed.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The runtime was built outside a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoAsyncRuntime(String),
}

impl RuntimeError {
    /// Whether this error came from a fatal gateway condition.
    pub fn is_fatal_gateway(&self) -> bool {
        matches!(self, Self::Gateway { source, .. } if source.is_fatal())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
