//! Outbound message sending.

use async_trait::async_trait;

use crate::error::OutboundResult;

/// Sends replies to the upstream API.
///
/// The rate-limited REST client implements this; the command pipeline only
/// depends on the trait.
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Posts a plain text message to a channel.
    async fn send_message(&self, channel_id: u64, content: &str) -> OutboundResult<()>;
}
