use async_trait::async_trait;

use crate::types::{OutgoingMessage, OwnerId};

/// Outbound side of a messaging transport (Telegram, test capture, ...).
///
/// The core never manages the connection; it only hands finished messages
/// to the channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique name for this channel (e.g., "telegram").
    fn name(&self) -> String;

    /// Send one message to an owner. Implementations split over-long text.
    async fn send(&self, owner: OwnerId, message: &OutgoingMessage) -> anyhow::Result<()>;
}
