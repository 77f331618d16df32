use anyhow::{Context, Result};
use teloxide::{
    net::Download,
    payloads::SendMessageSetters,
    prelude::*,
    types::{ChatAction, MessageId, ParseMode, ReplyParameters},
    DownloadError, RequestError,
};
use tracing::{debug, warn};

use crate::card::Markup;
use crate::relay::{ChatClient, InboundMessage, MediaRef};

/// Outbound side of the Telegram channel
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// Send HTML quoting `original`. If Telegram rejects the markup the
    /// text is sent again without a parse mode.
    async fn send_html(&self, original: &InboundMessage, text: &str) -> Result<()> {
        let chat_id = parse_chat_id(&original.chat_id)?;
        let reply_to = ReplyParameters::new(parse_message_id(&original.id)?).allow_sending_without_reply();

        let sent = self
            .bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_parameters(reply_to.clone())
            .await;

        match sent {
            Ok(_) => Ok(()),
            Err(RequestError::Api(e)) => {
                warn!(chat_id = %original.chat_id, error = %e, "telegram HTML send failed, retrying as plain text");
                self.bot
                    .send_message(chat_id, text)
                    .reply_parameters(reply_to)
                    .await
                    .map_err(scrub)
                    .context("telegram sendMessage failed")?;
                Ok(())
            }
            Err(e) => Err(scrub(e)).context("telegram sendMessage failed"),
        }
    }
}

/// Network errors print the request URL, and Bot API URLs embed the token.
fn scrub(err: RequestError) -> anyhow::Error {
    match err {
        RequestError::Network(e) => anyhow::Error::new(e.without_url()),
        other => anyhow::Error::new(other),
    }
}

fn scrub_download(err: DownloadError) -> anyhow::Error {
    match err {
        DownloadError::Network(e) => anyhow::Error::new(e.without_url()),
        other => anyhow::Error::new(other),
    }
}

fn parse_chat_id(raw: &str) -> Result<ChatId> {
    raw.parse::<i64>()
        .map(ChatId)
        .with_context(|| format!("invalid telegram chat id: {}", raw))
}

fn parse_message_id(raw: &str) -> Result<MessageId> {
    raw.parse::<i32>()
        .map(MessageId)
        .with_context(|| format!("invalid telegram message id: {}", raw))
}

#[async_trait::async_trait]
impl ChatClient for TelegramClient {
    fn channel(&self) -> &'static str {
        "telegram"
    }

    fn markup(&self) -> Markup {
        Markup::Html
    }

    async fn download_media(&self, media: &MediaRef) -> Result<Vec<u8>> {
        let file = self
            .bot
            .get_file(media.id.as_str())
            .await
            .map_err(scrub)
            .context("telegram getFile failed")?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(scrub_download)
            .context("telegram file download failed")?;

        debug!(media = %media.id, bytes = data.len(), "downloaded telegram photo");
        Ok(data)
    }

    async fn send_reply(&self, original: &InboundMessage, text: &str) -> Result<()> {
        self.send_html(original, text).await
    }

    async fn acknowledge(&self, original: &InboundMessage) -> Result<()> {
        let chat_id = parse_chat_id(&original.chat_id)?;
        self.bot
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
            .map_err(scrub)
            .context("telegram sendChatAction failed")?;
        Ok(())
    }
}
