//! # qgate Core
//!
//! Protocol and domain types for the qgate bot runtime. Nothing in this
//! crate opens a socket; network I/O lives in `qgate-transport`.
//!
//! ## Contents
//!
//! - **Wire protocol**: op-codes, the [`Envelope`] frame type and the
//!   identify/resume/heartbeat builders ([`protocol`])
//! - **Session state**: [`GatewaySession`] and the resume/identify decision
//! - **Events**: [`Event`], [`EventKind`], [`BotIdentity`], [`Intents`]
//! - **Callbacks**: sync/async [`Callback`]s, the [`WorkerPool`], the
//!   explicit [`Scheduler`] context and [`safe_invoke`]
//! - **Dispatch**: [`EventDispatcher`] with per-category preprocessing
//!
//! ## Event Flow
//!
//! ```text
//! ┌──────────────┐  op=0   ┌─────────────────┐  schedule  ┌──────────────┐
//! │   Gateway    │────────▶│ EventDispatcher │───────────▶│  Callback    │
//! │ (transport)  │         │  (preprocess)   │            │ (sync/async) │
//! └──────────────┘         └─────────────────┘            └──────────────┘
//! ```

pub mod api;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod intents;
pub mod protocol;
pub mod session;
pub mod stop;
pub mod treat;

pub use api::IdentitySource;
pub use dispatcher::{DispatchOptions, Dispatched, EventDispatcher, EventDispatcherBuilder};
pub use error::{
    ApiError, ApiResult, CallbackError, GatewayError, GatewayResult, TransportError,
    TransportResult,
};
pub use event::{BotIdentity, Event, EventKind, TreatedMessage};
pub use handler::{Callback, Scheduler, WorkerPool, safe_invoke};
pub use intents::Intents;
pub use protocol::Envelope;
pub use session::{GatewaySession, MAX_RESUME_ATTEMPTS};
pub use stop::StopHandle;
pub use treat::{MessageTreater, WhitespaceTreater, strip_leading_mention};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BotIdentity, Callback, DispatchOptions, Event, EventDispatcher, EventKind, Intents,
        MessageTreater, StopHandle, TreatedMessage,
    };
}
