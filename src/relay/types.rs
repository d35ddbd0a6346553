//! Domain types shared by the relay core and the gateways.

use serde::{Deserialize, Serialize};

/// Platform-assigned user identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Platform chat identifier. In a private chat it equals the user's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Platform-assigned message identifier, unique within a chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageHandle(pub i64);

impl From<UserId> for ChatId {
    fn from(user: UserId) -> Self {
        ChatId(user.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent an inbound event. Display fields are only used for formatting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sender {
    pub id: UserId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl Sender {
    pub fn new(id: i64) -> Self {
        Self {
            id: UserId(id),
            ..Default::default()
        }
    }

    pub fn with_first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    pub fn with_last_name(mut self, name: impl Into<String>) -> Self {
        self.last_name = Some(name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Full display name, falling back to the numeric id.
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.id.to_string()
        } else {
            name
        }
    }
}

/// The closed set of content kinds the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Photo,
    Document,
    Video,
    Voice,
    Audio,
    Sticker,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Document => "document",
            Self::Video => "video",
            Self::Voice => "voice",
            Self::Audio => "audio",
            Self::Sticker => "sticker",
        };
        write!(f, "{s}")
    }
}

/// Longest media caption the platform accepts, in visible characters.
pub const CAPTION_MAX_CHARS: usize = 1024;

/// Message content. Attachments are opaque platform file handles and are
/// never downloaded or re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text { text: String },
    Photo { file_id: String, caption: Option<String> },
    Document { file_id: String, caption: Option<String> },
    Video { file_id: String, caption: Option<String> },
    Voice { file_id: String, caption: Option<String> },
    Audio { file_id: String, caption: Option<String> },
    Sticker { file_id: String },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text { .. } => ContentKind::Text,
            Self::Photo { .. } => ContentKind::Photo,
            Self::Document { .. } => ContentKind::Document,
            Self::Video { .. } => ContentKind::Video,
            Self::Voice { .. } => ContentKind::Voice,
            Self::Audio { .. } => ContentKind::Audio,
            Self::Sticker { .. } => ContentKind::Sticker,
        }
    }

    /// Whether this kind can carry text alongside it.
    pub fn accepts_caption(&self) -> bool {
        !matches!(self, Self::Sticker { .. })
    }

    /// Whether `extra` visible characters can go in front of the caption
    /// without passing [`CAPTION_MAX_CHARS`]. `measure` counts the existing
    /// caption. Text is split on delivery instead; stickers have no caption.
    pub fn caption_fits(&self, extra: usize, measure: impl Fn(&str) -> usize) -> bool {
        match self {
            Self::Text { .. } => true,
            _ if !self.accepts_caption() => false,
            media => extra + media.text_or_caption().map_or(0, measure) <= CAPTION_MAX_CHARS,
        }
    }

    /// The message text, or the media caption.
    pub fn text_or_caption(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Photo { caption, .. }
            | Self::Document { caption, .. }
            | Self::Video { caption, .. }
            | Self::Voice { caption, .. }
            | Self::Audio { caption, .. } => caption.as_deref(),
            Self::Sticker { .. } => None,
        }
    }

    /// Rewrite the text or an existing caption.
    pub fn map_text(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            Self::Text { text } => Self::Text { text: f(&text) },
            Self::Photo { file_id, caption } => Self::Photo {
                file_id,
                caption: caption.map(|c| f(&c)),
            },
            Self::Document { file_id, caption } => Self::Document {
                file_id,
                caption: caption.map(|c| f(&c)),
            },
            Self::Video { file_id, caption } => Self::Video {
                file_id,
                caption: caption.map(|c| f(&c)),
            },
            Self::Voice { file_id, caption } => Self::Voice {
                file_id,
                caption: caption.map(|c| f(&c)),
            },
            Self::Audio { file_id, caption } => Self::Audio {
                file_id,
                caption: caption.map(|c| f(&c)),
            },
            sticker @ Self::Sticker { .. } => sticker,
        }
    }

    /// Prepend `prefix` to the text or caption. Stickers are returned as-is.
    pub fn with_prefix(self, prefix: &str) -> Self {
        fn join(prefix: &str, body: Option<String>) -> Option<String> {
            match body {
                Some(body) if !body.is_empty() => Some(format!("{prefix}{body}")),
                _ => Some(prefix.trim_end().to_string()),
            }
        }

        match self {
            Self::Text { text } => Self::Text {
                text: format!("{prefix}{text}"),
            },
            Self::Photo { file_id, caption } => Self::Photo {
                file_id,
                caption: join(prefix, caption),
            },
            Self::Document { file_id, caption } => Self::Document {
                file_id,
                caption: join(prefix, caption),
            },
            Self::Video { file_id, caption } => Self::Video {
                file_id,
                caption: join(prefix, caption),
            },
            Self::Voice { file_id, caption } => Self::Voice {
                file_id,
                caption: join(prefix, caption),
            },
            Self::Audio { file_id, caption } => Self::Audio {
                file_id,
                caption: join(prefix, caption),
            },
            sticker @ Self::Sticker { .. } => sticker,
        }
    }
}

/// What happened on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// `/name arg1 arg2`. The name is lowercased and stripped of `@bot`.
    Command {
        name: String,
        args: Vec<String>,
        message_id: MessageHandle,
    },
    /// A plain text or media message.
    Message {
        content: MessageContent,
        message_id: MessageHandle,
    },
    /// An inline keyboard button press.
    Callback {
        query_id: String,
        data: String,
        message_id: Option<MessageHandle>,
    },
}

/// An inbound event delivered by a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: Sender,
    pub chat_id: ChatId,
    pub payload: EventPayload,
}

impl InboundEvent {
    /// A private-chat event (chat id equals the sender id).
    pub fn private(sender: Sender, payload: EventPayload) -> Self {
        let chat_id = ChatId::from(sender.id);
        Self {
            sender,
            chat_id,
            payload,
        }
    }
}

/// How the platform should interpret markup in text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Html,
}

/// A single inline keyboard button carrying callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }
}

/// Inline keyboard attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.rows.push(buttons);
        self
    }
}

/// A message the relay asks the gateway to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: MessageContent,
    pub markup: Option<InlineKeyboard>,
    pub parse_mode: Option<ParseMode>,
    pub reply_to: Option<MessageHandle>,
}

impl OutboundMessage {
    pub fn new(content: MessageContent) -> Self {
        Self {
            content,
            markup: None,
            parse_mode: None,
            reply_to: None,
        }
    }

    /// A plain text notice.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MessageContent::text(text))
    }

    pub fn with_markup(mut self, markup: InlineKeyboard) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn with_parse_mode(mut self, mode: ParseMode) -> Self {
        self.parse_mode = Some(mode);
        self
    }

    pub fn reply_to(mut self, handle: Option<MessageHandle>) -> Self {
        self.reply_to = handle;
        self
    }
}
