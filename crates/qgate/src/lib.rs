//! # qgate
//!
//! Gateway and REST client runtime for QQ guild bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  frames  ┌───────────────────┐  events  ┌─────────────────┐
//! │   Gateway   │─────────▶│ GatewayConnection │─────────▶│ EventDispatcher │──▶ callbacks
//! │ (WebSocket) │◀─────────│ (one per shard)   │          │  (preprocess)   │
//! └─────────────┘ heartbeat└─────────┬─────────┘          └─────────────────┘
//!                                    │ identity
//!                                    ▼
//!                          ┌───────────────────┐
//!                          │    HttpClient     │──▶ REST API
//!                          │  + RequestQueue   │
//!                          └───────────────────┘
//! ```
//!
//! - **Runtime**: loads configuration, starts the shards, stops them on a
//!   signal or a fatal error
//! - **Gateway**: handshake, resume, heartbeat and reconnect
//! - **Dispatcher**: per-category callbacks with message treatment
//! - **HTTP**: bounded-concurrency REST calls with a retry-once policy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qgate::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BotRuntime::builder()
//!         .on(EventKind::Message, Callback::sync(|event: Event| {
//!             if let Some(msg) = event.treated() {
//!                 tracing::info!(command = ?msg.command, "Command received");
//!             }
//!             Ok(())
//!         }))
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use qgate_core as core;
pub use qgate_runtime as runtime;
pub use qgate_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use qgate::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use qgate_runtime::{BotRuntime, QgateConfig, RuntimeError};

    // Callbacks and events
    pub use qgate_core::prelude::*;

    // REST access from callbacks
    pub use qgate_transport::{ApiRequest, ApiResponse, HttpClient, RequestBody};
}
