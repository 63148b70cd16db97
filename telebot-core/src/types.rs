//! Update payloads: users, chats, files, messages, callback queries, and the [`Content`] variant
//! that predicates and callbacks receive.

use serde::{Deserialize, Serialize};

use crate::error::{PredicateError, Result, TelebotError};

/// User identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

/// Chat (private, group, supergroup or channel). Two chats are equal when their ids are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl PartialEq for Chat {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Chat {}

impl Chat {
    /// Chat known only by id.
    pub fn by_id(id: i64) -> Self {
        Self {
            id,
            kind: None,
            title: None,
            username: None,
            first_name: None,
            last_name: None,
        }
    }
}

/// Reference to a file stored on the API side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    #[serde(default)]
    pub file_unique_id: String,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSize {
    #[serde(flatten)]
    pub file: FileRef,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    #[serde(flatten)]
    pub file: FileRef,
    pub width: u32,
    pub height: u32,
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audio {
    #[serde(flatten)]
    pub file: FileRef,
    pub duration: u32,
    pub performer: Option<String>,
    pub title: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(flatten)]
    pub file: FileRef,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

/// Formatting entity (mention, url, bold, ...) inside a text or caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub offset: usize,
    pub length: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: Option<String>,
}

impl Entity {
    /// Returns the part of `text` this entity covers. Offsets count UTF-16 code units.
    pub fn extract(&self, text: &str) -> String {
        let units: Vec<u16> = text
            .encode_utf16()
            .skip(self.offset)
            .take(self.length)
            .collect();
        String::from_utf16_lossy(&units)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "message_id")]
    pub id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    pub text: Option<String>,
    pub caption: Option<String>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub caption_entities: Vec<Entity>,
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
    pub sticker: Option<Sticker>,
    pub audio: Option<Audio>,
    pub document: Option<Document>,
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Text body, or the caption for media messages.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    #[serde(default)]
    pub chat_instance: String,
    pub data: Option<String>,
}

/// Decoded content of one update, tagged by what it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(Message),
    Photo(Message),
    Sticker(Message),
    Audio(Message),
    CallbackQuery(CallbackQuery),
    Other(Message),
}

impl Content {
    /// Classifies a message by its payload: text, photo, sticker, audio, otherwise generic.
    pub fn from_message(message: Message) -> Self {
        if message.text.is_some() {
            Content::Text(message)
        } else if !message.photo.is_empty() {
            Content::Photo(message)
        } else if message.sticker.is_some() {
            Content::Sticker(message)
        } else if message.audio.is_some() {
            Content::Audio(message)
        } else {
            Content::Other(message)
        }
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Content::Text(_) => "text",
            Content::Photo(_) => "photo",
            Content::Sticker(_) => "sticker",
            Content::Audio(_) => "audio",
            Content::CallbackQuery(_) => "callback_query",
            Content::Other(_) => "message",
        }
    }

    /// The message itself, or the message a callback query's button was attached to.
    pub fn message(&self) -> std::result::Result<&Message, PredicateError> {
        match self {
            Content::Text(m)
            | Content::Photo(m)
            | Content::Sticker(m)
            | Content::Audio(m)
            | Content::Other(m) => Ok(m),
            Content::CallbackQuery(q) => q
                .message
                .as_ref()
                .ok_or(PredicateError::MissingField("message")),
        }
    }

    /// Text of a text message, or caption of a photo.
    pub fn text(&self) -> std::result::Result<&str, PredicateError> {
        let found = match self {
            Content::Text(m) => m.text.as_deref(),
            Content::Photo(m) => m.caption.as_deref(),
            _ => None,
        };
        found.ok_or(PredicateError::MissingField("text"))
    }

    pub fn chat(&self) -> std::result::Result<&Chat, PredicateError> {
        self.message().map(|m| &m.chat)
    }

    /// Who sent the message, or who pressed the button.
    pub fn sender(&self) -> std::result::Result<&User, PredicateError> {
        match self {
            Content::CallbackQuery(q) => Ok(&q.from),
            other => other
                .message()?
                .from
                .as_ref()
                .ok_or(PredicateError::MissingField("from")),
        }
    }

    /// Callback data of a pressed inline button.
    pub fn data(&self) -> std::result::Result<&str, PredicateError> {
        let found = match self {
            Content::CallbackQuery(q) => q.data.as_deref(),
            _ => None,
        };
        found.ok_or(PredicateError::MissingField("data"))
    }

    /// Largest size of a photo.
    pub fn photo(&self) -> std::result::Result<&PhotoSize, PredicateError> {
        let found = match self {
            Content::Photo(m) => m
                .photo
                .iter()
                .max_by_key(|p| u64::from(p.width) * u64::from(p.height)),
            _ => None,
        };
        found.ok_or(PredicateError::MissingField("photo"))
    }

    pub fn sticker(&self) -> std::result::Result<&Sticker, PredicateError> {
        let found = match self {
            Content::Sticker(m) => m.sticker.as_ref(),
            _ => None,
        };
        found.ok_or(PredicateError::MissingField("sticker"))
    }

    pub fn audio(&self) -> std::result::Result<&Audio, PredicateError> {
        let found = match self {
            Content::Audio(m) => m.audio.as_ref(),
            _ => None,
        };
        found.ok_or(PredicateError::MissingField("audio"))
    }
}

/// Which field of the raw update carried the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    CallbackQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: i64,
    pub kind: UpdateKind,
    pub content: Content,
}

#[derive(Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<Message>,
    edited_message: Option<Message>,
    channel_post: Option<Message>,
    edited_channel_post: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

impl Update {
    /// Decodes one element of a `getUpdates` result.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawUpdate = serde_json::from_value(value)?;
        let id = raw.update_id;
        let (kind, content) = if let Some(m) = raw.message {
            (UpdateKind::Message, Content::from_message(m))
        } else if let Some(m) = raw.edited_message {
            (UpdateKind::EditedMessage, Content::from_message(m))
        } else if let Some(m) = raw.channel_post {
            (UpdateKind::ChannelPost, Content::from_message(m))
        } else if let Some(m) = raw.edited_channel_post {
            (UpdateKind::EditedChannelPost, Content::from_message(m))
        } else if let Some(q) = raw.callback_query {
            (UpdateKind::CallbackQuery, Content::CallbackQuery(q))
        } else {
            return Err(TelebotError::UnrecognizedUpdate(id));
        };
        Ok(Self { id, kind, content })
    }
}
