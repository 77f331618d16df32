//! Channel-neutral message relay.
//!
//! A chat channel turns its native events into [`InboundMessage`]s and hands
//! them to [`Relay::handle`] together with a [`ChatClient`] able to reply on
//! that channel. The relay gates the message, asks the analysis backend for a
//! verdict and answers with a quoted reply.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::backend::{AnalysisBackend, ImageUpload, Verdict};
use crate::card::{self, Failure, Markup};

/// Shorter text messages are dropped without calling the backend.
pub const MIN_TEXT_CHARS: usize = 10;

/// Media attached to an inbound message, as referenced by the chat network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub id: String,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Image(MediaRef),
}

/// One inbound chat message
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Network message id, used to quote the message in the reply
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    /// Sent by this bot's own account
    pub from_me: bool,
    pub payload: Payload,
}

/// Outbound side of a chat channel
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Short channel name for logs
    fn channel(&self) -> &'static str;

    /// Fetch (and decrypt, where the network requires it) the media bytes
    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>>;

    /// Send `text` as a reply quoting `original`
    async fn send_reply(&self, original: &InboundMessage, text: &str) -> Result<()>;

    /// Formatting replies are rendered with
    fn markup(&self) -> Markup {
        Markup::WhatsApp
    }

    /// Signal that the message is being looked at (read receipt, typing...)
    async fn acknowledge(&self, _original: &InboundMessage) -> Result<()> {
        Ok(())
    }
}

/// What happened to one inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    IgnoredOwnMessage,
    IgnoredTooShort,
    IgnoredNotNews,
    Replied,
    ReportedError,
}

#[derive(Clone)]
pub struct Relay {
    backend: Arc<dyn AnalysisBackend>,
}

/// Whether `text` is long enough to be worth analysing
pub fn passes_length_gate(text: &str) -> bool {
    text.trim().chars().count() >= MIN_TEXT_CHARS
}

impl Relay {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        Self { backend }
    }

    /// Handle one inbound message end to end. Never fails: errors are logged
    /// and, where the user is waiting for an answer, reported in chat.
    pub async fn handle(&self, chat: &dyn ChatClient, message: &InboundMessage) -> RelayOutcome {
        if message.from_me {
            debug!(channel = chat.channel(), id = %message.id, "ignoring own message");
            return RelayOutcome::IgnoredOwnMessage;
        }

        let outcome = match &message.payload {
            Payload::Text(text) => {
                if !passes_length_gate(text) {
                    debug!(channel = chat.channel(), id = %message.id, "message too short, ignoring");
                    return RelayOutcome::IgnoredTooShort;
                }
                self.relay_text(chat, message, text).await
            }
            Payload::Image(media) => self.relay_image(chat, message, media).await,
        };

        debug!(channel = chat.channel(), id = %message.id, ?outcome, "message handled");
        outcome
    }

    /// Analyse `text` on behalf of `message` without the length gate.
    pub async fn check_text(
        &self,
        chat: &dyn ChatClient,
        message: &InboundMessage,
        text: &str,
    ) -> RelayOutcome {
        if message.from_me {
            return RelayOutcome::IgnoredOwnMessage;
        }
        self.relay_text(chat, message, text).await
    }

    async fn relay_text(&self, chat: &dyn ChatClient, message: &InboundMessage, text: &str) -> RelayOutcome {
        info!(channel = chat.channel(), sender = %message.sender, "received message: {}", text);
        self.acknowledge(chat, message).await;

        match self.backend.analyze_text(text).await {
            Ok(verdict) => self.reply_with_verdict(chat, message, &verdict).await,
            Err(e) => {
                error!(channel = chat.channel(), error = %format!("{:#}", e), "error analyzing message");
                self.report(chat, message, Failure::Backend).await;
                RelayOutcome::ReportedError
            }
        }
    }

    async fn relay_image(&self, chat: &dyn ChatClient, message: &InboundMessage, media: &MediaRef) -> RelayOutcome {
        info!(channel = chat.channel(), sender = %message.sender, media = %media.id, "received image");
        self.acknowledge(chat, message).await;

        let data = match chat.download_media(media).await {
            Ok(data) => data,
            Err(e) => {
                error!(channel = chat.channel(), error = %format!("{:#}", e), "error downloading image");
                self.report(chat, message, Failure::ImageDownload).await;
                return RelayOutcome::ReportedError;
            }
        };

        let upload = ImageUpload {
            data,
            mime_type: media.mime_type.clone(),
        };
        match self.backend.analyze_image(upload).await {
            Ok(verdict) => self.reply_with_verdict(chat, message, &verdict).await,
            Err(e) => {
                error!(channel = chat.channel(), error = %format!("{:#}", e), "error analyzing image");
                self.report(chat, message, Failure::ImageAnalysis).await;
                RelayOutcome::ReportedError
            }
        }
    }

    async fn reply_with_verdict(
        &self,
        chat: &dyn ChatClient,
        message: &InboundMessage,
        verdict: &Verdict,
    ) -> RelayOutcome {
        if !verdict.is_news {
            info!(channel = chat.channel(), id = %message.id, "not news, ignoring");
            return RelayOutcome::IgnoredNotNews;
        }
        self.reply(chat, message, &card::format_verdict(verdict, chat.markup())).await;
        RelayOutcome::Replied
    }

    async fn acknowledge(&self, chat: &dyn ChatClient, message: &InboundMessage) {
        if let Err(e) = chat.acknowledge(message).await {
            warn!(channel = chat.channel(), id = %message.id, error = %e, "failed to acknowledge message");
        }
    }

    async fn report(&self, chat: &dyn ChatClient, message: &InboundMessage, failure: Failure) {
        self.reply(chat, message, &failure.render(chat.markup())).await;
    }

    async fn reply(&self, chat: &dyn ChatClient, message: &InboundMessage, text: &str) {
        if let Err(e) = chat.send_reply(message, text).await {
            error!(channel = chat.channel(), chat_id = %message.chat_id, error = %format!("{:#}", e), "error sending message");
        }
    }
}
