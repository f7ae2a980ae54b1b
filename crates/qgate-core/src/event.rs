//! Dispatch events and their categories.
//!
//! The gateway delivers every application event as a JSON payload tagged with
//! an event type string. Each type belongs to one [`EventKind`]; callbacks are
//! registered per kind, so several types share one callback.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::Envelope;

// =============================================================================
// Event Categories
// =============================================================================

/// Category of a dispatch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Guild created/updated/deleted.
    Guild,
    /// Channel created/updated/deleted.
    Channel,
    /// Guild member joined/updated/left.
    GuildMember,
    /// Reaction added/removed.
    Reaction,
    /// Interaction created.
    Interaction,
    /// Message audit passed/rejected.
    Audit,
    /// Forum thread, post and reply events.
    Forum,
    /// Audio channel events.
    Audio,
    /// Guild message (mention or full message intent).
    Message,
    /// Direct message.
    DirectMessage,
    /// Message recalled, in a guild or a direct chat.
    MessageDelete,
}

impl EventKind {
    /// All categories, in declaration order.
    pub const ALL: [EventKind; 11] = [
        Self::Guild,
        Self::Channel,
        Self::GuildMember,
        Self::Reaction,
        Self::Interaction,
        Self::Audit,
        Self::Forum,
        Self::Audio,
        Self::Message,
        Self::DirectMessage,
        Self::MessageDelete,
    ];

    /// Resolves the category of a dispatch event type.
    ///
    /// Returns `None` for types the runtime does not know.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        Some(match event_type {
            "GUILD_CREATE" | "GUILD_UPDATE" | "GUILD_DELETE" => Self::Guild,
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" | "CHANNEL_DELETE" => Self::Channel,
            "GUILD_MEMBER_ADD" | "GUILD_MEMBER_UPDATE" | "GUILD_MEMBER_REMOVE" => {
                Self::GuildMember
            }
            "MESSAGE_REACTION_ADD" | "MESSAGE_REACTION_REMOVE" => Self::Reaction,
            "INTERACTION_CREATE" => Self::Interaction,
            "MESSAGE_AUDIT_PASS" | "MESSAGE_AUDIT_REJECT" => Self::Audit,
            "FORUM_THREAD_CREATE"
            | "FORUM_THREAD_UPDATE"
            | "FORUM_THREAD_DELETE"
            | "FORUM_POST_CREATE"
            | "FORUM_POST_DELETE"
            | "FORUM_REPLY_CREATE"
            | "FORUM_REPLY_DELETE"
            | "FORUM_PUBLISH_AUDIT_RESULT" => Self::Forum,
            "AUDIO_START" | "AUDIO_FINISH" | "AUDIO_ON_MIC" | "AUDIO_OFF_MIC" => Self::Audio,
            "AT_MESSAGE_CREATE" | "MESSAGE_CREATE" => Self::Message,
            "DIRECT_MESSAGE_CREATE" => Self::DirectMessage,
            "MESSAGE_DELETE" | "PUBLIC_MESSAGE_DELETE" | "DIRECT_MESSAGE_DELETE" => {
                Self::MessageDelete
            }
            _ => return None,
        })
    }

    /// Short lowercase name used in logs and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::GuildMember => "guild_member",
            Self::Reaction => "reaction",
            Self::Interaction => "interaction",
            Self::Audit => "audit",
            Self::Forum => "forum",
            Self::Audio => "audio",
            Self::Message => "message",
            Self::DirectMessage => "direct_message",
            Self::MessageDelete => "message_delete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event
// =============================================================================

/// Payload key holding the event type.
pub const EVENT_TYPE_KEY: &str = "t";
/// Payload key holding the event id.
pub const EVENT_ID_KEY: &str = "event_id";
/// Payload key holding the treated message text.
pub const TREATED_KEY: &str = "treated_msg";

/// A decoded dispatch event as handed to user callbacks.
///
/// `data` is the envelope payload augmented with [`EVENT_TYPE_KEY`],
/// [`EVENT_ID_KEY`] and, for treated messages, [`TREATED_KEY`].
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Dispatch type, e.g. `AT_MESSAGE_CREATE`.
    pub event_type: String,
    /// Event id from the envelope.
    pub event_id: Option<String>,
    /// Augmented payload.
    pub data: Value,
}

impl Event {
    /// Builds an event from a dispatch envelope, copying the type and id into
    /// the payload.
    pub fn from_envelope(envelope: Envelope) -> Self {
        let event_type = envelope.event_type.unwrap_or_default();
        let mut data = match envelope.payload {
            Value::Object(map) => Value::Object(map),
            Value::Null => Value::Object(Default::default()),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".into(), other);
                Value::Object(map)
            }
        };
        if let Some(map) = data.as_object_mut() {
            map.insert(EVENT_TYPE_KEY.into(), Value::String(event_type.clone()));
            map.insert(
                EVENT_ID_KEY.into(),
                envelope
                    .event_id
                    .clone()
                    .map_or(Value::Null, Value::String),
            );
        }
        Self {
            event_type,
            event_id: envelope.event_id,
            data,
        }
    }

    /// Category of this event, if known.
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_event_type(&self.event_type)
    }

    /// Looks up a top-level payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Looks up a nested field by JSON pointer, e.g. `/author/id`.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.data.pointer(pointer)
    }

    /// Message text, for message events.
    pub fn content(&self) -> Option<&str> {
        self.get("content").and_then(Value::as_str)
    }

    /// Treated message text, if message treatment ran.
    pub fn treated(&self) -> Option<TreatedMessage> {
        self.get(TREATED_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Converts the payload into a typed record.
    pub fn deserialize<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

// =============================================================================
// Treated Message
// =============================================================================

/// Structured form of a message produced by a [`MessageTreater`](crate::treat::MessageTreater).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatedMessage {
    /// The cleaned text the tokens were derived from.
    pub text: String,
    /// First token, typically the command word.
    pub command: Option<String>,
    /// Remaining tokens.
    pub args: Vec<String>,
}

// =============================================================================
// Bot Identity
// =============================================================================

/// The bot's own user record, fetched once after the first READY.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotIdentity {
    /// User id; also used to build the mention token.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub username: String,
    /// Avatar URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Any other fields the API returned.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl BotIdentity {
    /// The mention token the platform inserts when users address the bot.
    pub fn mention(&self) -> String {
        format!("<@!{}>", self.id)
    }
}
