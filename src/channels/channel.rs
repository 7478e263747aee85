//! Channel trait and message types.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// A message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Name of the channel it arrived on.
    pub channel: String,
    /// Stable identity of the sender on that channel.
    pub user_id: String,
    /// Display name, if the channel provides one.
    pub user_name: Option<String>,
    pub content: String,
    /// Channel-specific routing data (e.g. Telegram `chat_id`).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            content: content.into(),
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

/// A response to send back on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Stream of incoming messages produced by [`Channel::start`].
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply to a previously received message.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
