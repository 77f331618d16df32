//! Telegram Bot API channel (long polling).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, BotCommand, UpdateKind},
};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::relay::{ChatClient, InboundMessage, MediaRef, Payload, Relay};

pub mod client;
pub mod commands;

pub use client::TelegramClient;
use commands::Command;

/// Default long-polling timeout for getUpdates
pub const DEFAULT_POLL_TIMEOUT_SECS: u32 = 30;

/// Identity of the running bot, used to recognise its own messages
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: UserId,
    pub username: Option<String>,
}

/// Convert a Telegram message into a relay message. Returns `None` for
/// messages carrying neither text nor a photo.
pub fn to_inbound(msg: &Message, me: &BotIdentity) -> Option<InboundMessage> {
    let payload = if let Some(text) = msg.text() {
        Payload::Text(text.to_string())
    } else if let Some(sizes) = msg.photo() {
        // Sizes are ordered smallest first
        let largest = sizes.last()?;
        Payload::Image(MediaRef {
            id: largest.file.id.clone(),
            mime_type: Some("image/jpeg".to_string()),
        })
    } else {
        return None;
    };

    let sender = msg.from.as_ref();
    Some(InboundMessage {
        id: msg.id.0.to_string(),
        chat_id: msg.chat.id.0.to_string(),
        sender: sender.map(|u| u.id.0.to_string()).unwrap_or_default(),
        from_me: sender.is_some_and(|u| u.id == me.id),
        payload,
    })
}

/// Route one inbound message: commands are answered directly, everything
/// else goes through the relay.
pub async fn dispatch(relay: &Relay, chat: &dyn ChatClient, me: &BotIdentity, message: InboundMessage) {
    let command = match &message.payload {
        Payload::Text(text) => commands::parse(text, me.username.as_deref()),
        Payload::Image(_) => None,
    };

    let Some(command) = command else {
        relay.handle(chat, &message).await;
        return;
    };
    if message.from_me {
        return;
    }

    let reply = match command {
        Command::Start => commands::WELCOME,
        Command::Help => commands::HELP,
        Command::Check(Some(text)) => {
            relay.check_text(chat, &message, &text).await;
            return;
        }
        Command::Check(None) => commands::CHECK_USAGE,
        Command::Unknown(name) => {
            debug!(command = %name, "ignoring unknown command");
            return;
        }
    };

    if let Err(e) = chat.send_reply(&message, &chat.markup().text(reply)).await {
        error!(chat_id = %message.chat_id, error = %format!("{:#}", e), "error sending command reply");
    }
}

/// Connect the bot: verify the token, clear any webhook and register commands.
pub async fn connect(token: &str, poll_timeout_secs: u32) -> Result<(TelegramClient, BotIdentity)> {
    // The HTTP timeout must outlast the long poll or every poll would abort.
    let http = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(poll_timeout_secs) + 15))
        .build()?;
    let bot = Bot::with_client(token, http);

    let me = bot.get_me().await?;
    let identity = BotIdentity {
        id: me.id,
        username: me.username.clone(),
    };

    bot.delete_webhook().send().await?;

    let registered = commands::REGISTERED
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect::<Vec<_>>();
    if let Err(e) = bot.set_my_commands(registered).await {
        warn!(error = %e, "failed to register bot commands");
    }

    info!(username = ?identity.username, "telegram bot connected (webhook cleared)");
    Ok((TelegramClient::new(bot), identity))
}

/// Poll for updates until `shutdown` is notified. Each message is handled on its own task.
pub async fn run_polling(
    client: Arc<TelegramClient>,
    me: BotIdentity,
    relay: Relay,
    poll_timeout_secs: u32,
    shutdown: Arc<Notify>,
) -> Result<()> {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let request = client
            .bot()
            .get_updates()
            .offset(offset)
            .timeout(poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message])
            .send();

        let result = tokio::select! {
            _ = shutdown.notified() => {
                info!("telegram polling: shutdown requested");
                break;
            }
            result = request => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    let UpdateKind::Message(msg) = update.kind else {
                        continue;
                    };
                    let Some(message) = to_inbound(&msg, &me) else {
                        debug!(chat_id = msg.chat.id.0, "ignoring non-text telegram message");
                        continue;
                    };

                    let relay = relay.clone();
                    let client = Arc::clone(&client);
                    let me = me.clone();
                    tokio::spawn(async move {
                        dispatch(&relay, client.as_ref(), &me, message).await;
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    _ = shutdown.notified() => break,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
            }
        }
    }

    info!("telegram polling stopped");
    Ok(())
}
