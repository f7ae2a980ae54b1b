//! # qgate Runtime
//!
//! Configuration, logging and orchestration for qgate bots.
//!
//! - [`config`]: figment-based layered loading (`qgate.toml`, `QGATE_*`
//!   environment variables) and validation
//! - [`logging`]: [`LoggingBuilder`] over `tracing-subscriber`
//! - [`runtime`]: [`BotRuntime`], which starts one gateway connection per
//!   shard and stops them all on a signal or a fatal error
//!
//! ```ignore
//! use qgate_runtime::BotRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BotRuntime::builder().build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, QgateConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{BotRuntime, RuntimeBuilder};

// Re-export tracing for use by bot code
pub use tracing;
