//! Telegram Bot API: webhook updates in, `sendMessage` out.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::check_status;
use crate::conversation::{Incoming, Keyboard, Reply, ReplySink, TextFormat};
use crate::error::TransportError;
use crate::store::{BotUser, Platform};

/// Header carrying the secret set with `setWebhook`.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// An update the conversation can act on.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub user: BotUser,
    pub chat_id: i64,
    pub incoming: Incoming,
}

/// Extract the sender, chat and event. `None` for updates without a
/// message, sender, text or location (edits, stickers, channel posts).
pub fn parse_update(update: Update) -> Option<Inbound> {
    let message = update.message?;
    let from = message.from?;
    let incoming = match (message.location, message.text) {
        (Some(loc), _) => Incoming::Location {
            latitude: loc.latitude,
            longitude: loc.longitude,
        },
        (None, Some(text)) => Incoming::from_text(&text),
        (None, None) => {
            debug!(update_id = update.update_id, "ignoring update without text or location");
            return None;
        }
    };
    Some(Inbound {
        user: BotUser {
            user_id: from.id.to_string(),
            platform: Platform::Telegram,
            username: from.username,
            first_name: from.first_name,
            last_name: from.last_name,
        },
        chat_id: message.chat.id,
        incoming,
    })
}

fn reply_markup(keyboard: &Keyboard) -> Option<Value> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Commands(commands) => Some(json!({
            "keyboard": commands.iter().map(|c| vec![json!({ "text": c })]).collect::<Vec<_>>(),
            "resize_keyboard": true,
            "one_time_keyboard": true,
        })),
        Keyboard::ForceReply { placeholder } => Some(json!({
            "force_reply": true,
            "input_field_placeholder": placeholder,
        })),
        Keyboard::Remove => Some(json!({ "remove_keyboard": true })),
    }
}

/// `sendMessage` body for one reply.
pub fn send_message_body(chat_id: i64, reply: &Reply) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": reply.text,
    });
    if reply.format == TextFormat::Html {
        body["parse_mode"] = json!("HTML");
    }
    if let Some(markup) = reply_markup(&reply.keyboard) {
        body["reply_markup"] = markup;
    }
    body
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(bot_token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
        }
    }

    pub async fn send(&self, chat_id: i64, reply: &Reply) -> Result<(), TransportError> {
        let response = self
            .http
            .post(format!("{}/sendMessage", self.base_url))
            .json(&send_message_body(chat_id, reply))
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        check_status(response).await
    }

    pub fn sink(&self, chat_id: i64) -> TelegramSink {
        TelegramSink {
            client: self.clone(),
            chat_id,
        }
    }
}

/// Replies for one Telegram chat.
pub struct TelegramSink {
    client: TelegramClient,
    chat_id: i64,
}

#[async_trait]
impl ReplySink for TelegramSink {
    async fn send(&self, reply: Reply) -> Result<(), TransportError> {
        self.client.send(self.chat_id, &reply).await
    }
}
