use {async_trait::async_trait, std::path::PathBuf};

use crate::Result;

/// Send messages to a chat.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Send a text message and wait for the chat client to acknowledge it.
    ///
    /// Returns the id the platform assigned to the new message, which the
    /// caller feeds into loop suppression.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String>;
}

/// Retrieve media attached to an inbound message.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the media of `message_id` and return a local file path.
    async fn download_media(&self, message_id: &str) -> Result<PathBuf>;
}
