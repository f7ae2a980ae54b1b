//! # qgate Transport
//!
//! Network I/O for the qgate bot runtime.
//!
//! ## Features
//!
//! - `http` (default): [`HttpClient`] and its retry policy
//! - `gateway` (default): [`GatewayConnection`] over a WebSocket
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      identity      ┌──────────────────────┐
//! │  GatewayConnection   │───────────────────▶│      HttpClient      │
//! │  (one per shard)     │                    │  (shared, cloneable) │
//! ├──────────────────────┤                    ├──────────────────────┤
//! │  HeartbeatScheduler  │                    │     RequestQueue     │
//! └──────────┬───────────┘                    └──────────────────────┘
//!            │ dispatch
//!            ▼
//!     EventDispatcher (qgate-core)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qgate_transport::{HttpClient, HttpConfig, RequestQueue};
//! use tokio::runtime::Handle;
//!
//! let queue = RequestQueue::new(Handle::current(), 10);
//! let http = HttpClient::new(HttpConfig::new(app_id, token), queue);
//! let response = http.get("/users/@me/guilds").await?;
//! ```

pub mod queue;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "gateway")]
pub mod gateway;

pub use queue::{RequestHandle, RequestQueue};

#[cfg(feature = "http")]
pub use http::{ApiRequest, ApiResponse, GatewayInfo, HttpClient, HttpConfig, RequestBody, RetryPolicy};

#[cfg(feature = "gateway")]
pub use gateway::{
    ConnectionState, GatewayConfig, GatewayConnection, HeartbeatScheduler, create_gateway,
};
