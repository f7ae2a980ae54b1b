//! Seams between the gateway and the REST layer.

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::event::BotIdentity;

/// Resolves the bot's own user record.
///
/// Implemented by the HTTP client; the gateway calls it once per connection
/// after the first READY.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Fetches the identity of the authenticated bot.
    async fn fetch_identity(&self) -> ApiResult<BotIdentity>;
}
