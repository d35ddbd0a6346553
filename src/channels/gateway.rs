//! The gateway seam between the relay core and a chat platform.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::relay::types::{ChatId, InboundEvent, MessageHandle, OutboundMessage};

/// Stream of inbound events from a gateway.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A chat platform connection: produces inbound events and carries
/// outbound calls.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Gateway name, for logs and errors.
    fn name(&self) -> &str;

    /// Start receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    /// Deliver a message to a chat, returning the platform's handle for it.
    async fn deliver(
        &self,
        chat: ChatId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, ChannelError>;

    /// Acknowledge an inline-button press, optionally with a toast text.
    async fn answer_callback(&self, query_id: &str, text: Option<&str>)
    -> Result<(), ChannelError>;

    /// Remove the inline keyboard from a delivered message.
    async fn clear_markup(&self, chat: ChatId, message: MessageHandle)
    -> Result<(), ChannelError>;

    /// Check the platform is reachable with our credentials.
    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
