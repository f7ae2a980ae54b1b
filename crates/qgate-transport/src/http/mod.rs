//! REST client.
//!
//! - [`HttpClient`]: typed verbs over a lazily created connection pool,
//!   funnelled through a [`RequestQueue`](crate::queue::RequestQueue)
//! - [`RetryPolicy`]: the retry-once rule for known error codes
//! - [`RequestBody`] / [`ApiRequest`]: immutable request descriptions that
//!   can be sent more than once
//! - [`ApiResponse`]: a fully buffered response

mod body;
mod client;
mod response;
mod retry;

pub use body::{ApiRequest, RequestBody};
pub use client::{API_BASE, GatewayInfo, HttpClient, HttpConfig, SANDBOX_API_BASE};
pub use response::{ApiResponse, TRACE_ID_HEADER};
pub use retry::RetryPolicy;
