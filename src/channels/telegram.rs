//! Telegram gateway. Long-polls the Bot API for updates.
//!
//! Native Telegram Bot API implementation over `reqwest`, adapted to the
//! relay's Gateway trait (EventStream, deliver, answer_callback).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{EventStream, Gateway};
use crate::error::ChannelError;
use crate::relay::types::{
    ChatId, EventPayload, InboundEvent, InlineKeyboard, MessageContent, MessageHandle,
    OutboundMessage, ParseMode, Sender, UserId,
};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram gateway. Connects to the Bot API via long-polling.
pub struct TelegramGateway {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramGateway {
    pub fn new(bot_token: SecretString) -> Result<Self, ChannelError> {
        // Must outlive the long poll.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;
        Ok(Self { bot_token, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method}: {}", e.without_url()),
            })?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| ChannelError::InvalidResponse {
            name: "telegram".into(),
            reason: format!("{method}: {}", e.without_url()),
        })?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed ({status}): {description}"),
            });
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Call a send method and read back the new message's id.
    async fn send(&self, method: &str, body: &Value) -> Result<MessageHandle, ChannelError> {
        let result = self.call(method, body).await?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .map(MessageHandle)
            .ok_or_else(|| ChannelError::InvalidResponse {
                name: "telegram".into(),
                reason: format!("{method}: no message_id in result"),
            })
    }

    /// Send text, splitting anything over the 4096 char limit. The first
    /// chunk carries the reply reference, the last carries the keyboard.
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        message: &OutboundMessage,
    ) -> Result<MessageHandle, ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len() - 1;
        let mut handle = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({ "chat_id": chat.0, "text": chunk });
            if i == 0 {
                apply_reply_to(&mut body, message);
            }
            if i == last {
                apply_markup(&mut body, message);
            }
            apply_parse_mode(&mut body, message);
            handle = Some(self.send("sendMessage", &body).await?);
        }

        handle.ok_or_else(|| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: "empty message".into(),
        })
    }

    /// Send an already-uploaded file by its Telegram `file_id`.
    async fn send_media(
        &self,
        method: &str,
        field: &str,
        chat: ChatId,
        file_id: &str,
        caption: Option<&str>,
        message: &OutboundMessage,
    ) -> Result<MessageHandle, ChannelError> {
        let mut body = json!({ "chat_id": chat.0, field: file_id });
        if let Some(caption) = caption.filter(|c| !c.is_empty()) {
            body["caption"] = Value::String(caption.to_string());
            apply_parse_mode(&mut body, message);
        }
        apply_reply_to(&mut body, message);
        apply_markup(&mut body, message);
        self.send(method, &body).await
    }
}

// ── Gateway trait implementation ────────────────────────────────────

#[async_trait]
impl Gateway for TelegramGateway {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram gateway listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e.without_url(), "Telegram poll error");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(error = %e.without_url(), "Telegram parse error");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                };

                for update in results {
                    // Advance offset past this update, even if we skip it
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(event) = parse_update(update) else {
                        tracing::debug!("Skipping unsupported Telegram update");
                        continue;
                    };

                    if tx.send(event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn deliver(
        &self,
        chat: ChatId,
        message: OutboundMessage,
    ) -> Result<MessageHandle, ChannelError> {
        match &message.content {
            MessageContent::Text { text } => self.send_text(chat, text, &message).await,
            MessageContent::Photo { file_id, caption } => {
                self.send_media("sendPhoto", "photo", chat, file_id, caption.as_deref(), &message)
                    .await
            }
            MessageContent::Document { file_id, caption } => {
                self.send_media(
                    "sendDocument",
                    "document",
                    chat,
                    file_id,
                    caption.as_deref(),
                    &message,
                )
                .await
            }
            MessageContent::Video { file_id, caption } => {
                self.send_media("sendVideo", "video", chat, file_id, caption.as_deref(), &message)
                    .await
            }
            MessageContent::Voice { file_id, caption } => {
                self.send_media("sendVoice", "voice", chat, file_id, caption.as_deref(), &message)
                    .await
            }
            MessageContent::Audio { file_id, caption } => {
                self.send_media("sendAudio", "audio", chat, file_id, caption.as_deref(), &message)
                    .await
            }
            MessageContent::Sticker { file_id } => {
                self.send_media("sendSticker", "sticker", chat, file_id, None, &message)
                    .await
            }
        }
    }

    async fn answer_callback(
        &self,
        query_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "callback_query_id": query_id });
        if let Some(text) = text {
            body["text"] = Value::String(text.to_string());
        }
        self.call("answerCallbackQuery", &body).await.map(|_| ())
    }

    async fn clear_markup(&self, chat: ChatId, message: MessageHandle) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat.0,
            "message_id": message.0,
            "reply_markup": { "inline_keyboard": [] }
        });
        self.call("editMessageReplyMarkup", &body).await.map(|_| ())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.call("getMe", &json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram gateway shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn apply_parse_mode(body: &mut Value, message: &OutboundMessage) {
    if let Some(ParseMode::Html) = message.parse_mode {
        body["parse_mode"] = Value::String("HTML".into());
    }
}

fn apply_reply_to(body: &mut Value, message: &OutboundMessage) {
    if let Some(handle) = message.reply_to {
        body["reply_parameters"] = json!({
            "message_id": handle.0,
            "allow_sending_without_reply": true
        });
    }
}

fn apply_markup(body: &mut Value, message: &OutboundMessage) {
    if let Some(markup) = &message.markup {
        body["reply_markup"] = keyboard_json(markup);
    }
}

fn keyboard_json(markup: &InlineKeyboard) -> Value {
    let rows: Vec<Value> = markup
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.text, "callback_data": b.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn parse_sender(from: &Value) -> Option<Sender> {
    let id = from.get("id").and_then(Value::as_i64)?;
    let text = |key: &str| from.get(key).and_then(Value::as_str).map(String::from);
    Some(Sender {
        id: UserId(id),
        first_name: text("first_name"),
        last_name: text("last_name"),
        username: text("username"),
    })
}

/// Translate one update into an event. Non-private chats and unsupported
/// content yield `None`.
fn parse_update(update: &Value) -> Option<InboundEvent> {
    if let Some(query) = update.get("callback_query") {
        return parse_callback(query);
    }

    let message = update.get("message")?;
    let chat = message.get("chat")?;
    if chat.get("type").and_then(Value::as_str) != Some("private") {
        return None;
    }
    let chat_id = ChatId(chat.get("id").and_then(Value::as_i64)?);
    let sender = parse_sender(message.get("from")?)?;
    let message_id = MessageHandle(message.get("message_id").and_then(Value::as_i64)?);

    let payload = match message.get("text").and_then(Value::as_str) {
        Some(text) if text.starts_with('/') => {
            let mut parts = text.split_whitespace();
            let head = parts.next()?.trim_start_matches('/');
            let name = head.split('@').next().unwrap_or(head).to_lowercase();
            if name.is_empty() {
                return None;
            }
            EventPayload::Command {
                name,
                args: parts.map(String::from).collect(),
                message_id,
            }
        }
        Some(text) => EventPayload::Message {
            content: MessageContent::text(text),
            message_id,
        },
        None => EventPayload::Message {
            content: parse_media(message)?,
            message_id,
        },
    };

    Some(InboundEvent {
        sender,
        chat_id,
        payload,
    })
}

fn parse_media(message: &Value) -> Option<MessageContent> {
    let caption = message
        .get("caption")
        .and_then(Value::as_str)
        .map(String::from);
    let file_id = |key: &str| {
        message
            .get(key)
            .and_then(|m| m.get("file_id"))
            .and_then(Value::as_str)
            .map(String::from)
    };

    // Photo sizes are ordered smallest first.
    if let Some(sizes) = message.get("photo").and_then(Value::as_array) {
        let file_id = sizes.last()?.get("file_id").and_then(Value::as_str)?;
        return Some(MessageContent::Photo {
            file_id: file_id.to_string(),
            caption,
        });
    }
    if let Some(file_id) = file_id("document") {
        return Some(MessageContent::Document { file_id, caption });
    }
    if let Some(file_id) = file_id("video") {
        return Some(MessageContent::Video { file_id, caption });
    }
    if let Some(file_id) = file_id("voice") {
        return Some(MessageContent::Voice { file_id, caption });
    }
    if let Some(file_id) = file_id("audio") {
        return Some(MessageContent::Audio { file_id, caption });
    }
    file_id("sticker").map(|file_id| MessageContent::Sticker { file_id })
}

fn parse_callback(query: &Value) -> Option<InboundEvent> {
    let sender = parse_sender(query.get("from")?)?;
    let query_id = query.get("id").and_then(Value::as_str)?.to_string();
    let data = query
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let message = query.get("message");
    let message_id = message
        .and_then(|m| m.get("message_id"))
        .and_then(Value::as_i64)
        .map(MessageHandle);
    let chat_id = message
        .and_then(|m| m.get("chat"))
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(ChatId)
        .unwrap_or_else(|| ChatId::from(sender.id));

    Some(InboundEvent {
        sender,
        chat_id,
        payload: EventPayload::Callback {
            query_id,
            data,
            message_id,
        },
    })
}

/// Split a message into chunks of at most `max_len` characters.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        // Byte offset of the max_len-th char, if the rest is longer.
        let Some((limit, _)) = remaining.char_indices().nth(max_len) else {
            chunks.push(remaining.to_string());
            break;
        };

        // Find a good split point
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Never cut through an HTML entity or tag.
        let split_at = markup_boundary(&remaining[..split_at]);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Byte offset at which `chunk` can end without leaving an `&...;` entity
/// or a `<...>` tag open. Returns `chunk.len()` when nothing is open.
fn markup_boundary(chunk: &str) -> usize {
    let open_entity = chunk.rfind('&').filter(|&amp| !chunk[amp..].contains(';'));
    let open_tag = chunk.rfind('<').filter(|&lt| !chunk[lt..].contains('>'));
    match (open_entity, open_tag) {
        (Some(a), Some(b)) => a.min(b),
        (Some(at), None) | (None, Some(at)) => at,
        (None, None) => chunk.len(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
