//! Platform event model and the matcher's input alphabet.
//!
//! Two layers live here:
//!
//! - [`Update`]: the raw, heterogeneous variant delivered by the platform
//!   client (messages, edits, callback presses, inline queries).
//! - [`Messageable`]: the narrowed alphabet the scenario matcher consumes,
//!   unifying incoming messages and callback queries. Every `Messageable`
//!   exposes a [`conversation_id`](Messageable::conversation_id), which is
//!   the key the [dispatcher](crate::dispatcher) fans out on.
//!
//! The projections between the two layers are in [`crate::pipes`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a conversation (chat). The dispatcher keys sub-streams on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimal attachment payload carried by document messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    pub file_name: Option<String>,
}

/// A message sent by a participant into a conversation.
///
/// `text` and `document` are both optional; a plain text message carries
/// only `text`, a file upload carries `document` (optionally with a caption
/// in `text`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat_id: ChatId,
    pub from: Option<UserId>,
    pub text: Option<String>,
    pub document: Option<Document>,
    pub date: DateTime<Utc>,
}

impl IncomingMessage {
    /// Create a plain text message.
    ///
    /// # Examples
    ///
    /// ```
    /// use colloquy::events::{ChatId, IncomingMessage};
    ///
    /// let msg = IncomingMessage::text(ChatId(7), "hello");
    /// assert_eq!(msg.text.as_deref(), Some("hello"));
    /// ```
    #[must_use]
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            message_id: 0,
            chat_id,
            from: None,
            text: Some(text.into()),
            document: None,
            date: Utc::now(),
        }
    }

    /// Create a document message.
    #[must_use]
    pub fn document(chat_id: ChatId, document: Document) -> Self {
        Self {
            message_id: 0,
            chat_id,
            from: None,
            text: None,
            document: Some(document),
            date: Utc::now(),
        }
    }

    /// True if the message is the bot command `name`.
    ///
    /// The leading token must equal `/name`; a `@botname` suffix on the
    /// token is ignored, and anything after the first whitespace is treated
    /// as arguments.
    ///
    /// ```
    /// use colloquy::events::{ChatId, IncomingMessage};
    ///
    /// assert!(IncomingMessage::text(ChatId(1), "/start").is_command("start"));
    /// assert!(IncomingMessage::text(ChatId(1), "/start@my_bot now").is_command("start"));
    /// assert!(!IncomingMessage::text(ChatId(1), "/started").is_command("start"));
    /// ```
    #[must_use]
    pub fn is_command(&self, name: &str) -> bool {
        let Some(text) = self.text.as_deref() else {
            return false;
        };
        let Some(token) = text.split_whitespace().next() else {
            return false;
        };
        let token = token.split('@').next().unwrap_or(token);
        token.strip_prefix('/') == Some(name)
    }

    /// The argument tail of a command message (text after the first token),
    /// or `None` if the message is not the given command.
    #[must_use]
    pub fn command_args(&self, name: &str) -> Option<String> {
        if !self.is_command(name) {
            return None;
        }
        let text = self.text.as_deref()?;
        let rest = text.split_once(char::is_whitespace).map(|(_, rest)| rest);
        Some(rest.unwrap_or("").trim().to_string())
    }
}

/// A button press on an inline keyboard attached to an earlier message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: UserId,
    pub chat_id: ChatId,
    /// The message the pressed keyboard was attached to, when known.
    pub message_id: Option<i64>,
    pub payload: Option<String>,
}

/// A query typed into the inline-mode box; not tied to a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    pub from: UserId,
    pub query: String,
}

/// Raw update variant as delivered by the platform client.
///
/// `Unsupported` is the forward-compatibility carrier for update kinds the
/// decoder recognizes but this crate does not model; pipes drop it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Update {
    Message(IncomingMessage),
    EditedMessage(IncomingMessage),
    CallbackQuery(CallbackQuery),
    InlineQuery(InlineQuery),
    Unsupported,
}

/// The matcher's input alphabet: events a scenario can consume.
///
/// Unifies fresh incoming messages and callback presses. Edited messages
/// and inline queries are deliberately excluded; they have their own pipes
/// for applications that want them, but they do not drive conversations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Messageable {
    Message(IncomingMessage),
    Callback(CallbackQuery),
}

impl Messageable {
    /// The conversation this event belongs to.
    #[must_use]
    pub fn conversation_id(&self) -> ChatId {
        match self {
            Messageable::Message(msg) => msg.chat_id,
            Messageable::Callback(cb) => cb.chat_id,
        }
    }

    /// Textual content: message text for messages, payload for callbacks.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Messageable::Message(msg) => msg.text.as_deref(),
            Messageable::Callback(cb) => cb.payload.as_deref(),
        }
    }

    /// The participant who produced the event, when known.
    #[must_use]
    pub fn sender(&self) -> Option<UserId> {
        match self {
            Messageable::Message(msg) => msg.from,
            Messageable::Callback(cb) => Some(cb.from),
        }
    }

    /// Timestamp of the event; callbacks carry none.
    #[must_use]
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Messageable::Message(msg) => Some(msg.date),
            Messageable::Callback(_) => None,
        }
    }

    /// Returns `true` for a [`Message`](Self::Message) event.
    #[must_use]
    pub fn is_message(&self) -> bool {
        matches!(self, Self::Message(_))
    }

    /// Returns `true` for a [`Callback`](Self::Callback) event.
    #[must_use]
    pub fn is_callback(&self) -> bool {
        matches!(self, Self::Callback(_))
    }
}

impl From<IncomingMessage> for Messageable {
    fn from(msg: IncomingMessage) -> Self {
        Messageable::Message(msg)
    }
}

impl From<CallbackQuery> for Messageable {
    fn from(cb: CallbackQuery) -> Self {
        Messageable::Callback(cb)
    }
}
