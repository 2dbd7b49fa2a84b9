use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::Error;

/// Content of the greeting that seeds an empty or reset log.
pub const GREETING: &str = "Hi! I'm the Zus AI assistant. I can help you with our products, outlet locations, and even calculations. Try typing \"/\" to see quick actions!";

/// Planner trace attached to the seeded greeting.
pub const GREETING_PLANNER: [&str; 2] = ["Greet", "Finish"];

/// Identifier of a message within the log.
///
/// Ids are derived from the millisecond clock, but the store bumps them so that
/// every id is strictly greater than the one before it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a message author.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique identifier assigned by the store.
    pub id: MessageId,

    /// The author of the message.
    pub role: MessageRole,

    /// The message text.  Bold markers are kept verbatim and resolved when rendered.
    pub content: String,

    /// When the message was created.
    #[serde(with = "crate::utils::time")]
    pub timestamp: OffsetDateTime,

    /// Planner trace returned by the backend.
    ///
    /// `None` means no debug trace is available for this message.  Only assistant
    /// messages ever carry one.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_planner"
    )]
    pub planner: Option<Vec<String>>,
}

impl Message {
    /// Returns true if the message was written by the user.
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    /// Returns true if the message was written by the assistant.
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    /// Returns true if this is the seeded greeting.
    pub fn is_greeting(&self) -> bool {
        self.is_assistant()
            && self.content == GREETING
            && self
                .planner
                .as_deref()
                .is_some_and(|planner| planner.iter().eq(GREETING_PLANNER.iter()))
    }
}

/// A message that has not been assigned an id or timestamp yet.
///
/// The store stamps it when it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// The author of the message.
    pub role: MessageRole,

    /// The message text.
    pub content: String,

    /// Planner trace, if any.
    pub planner: Option<Vec<String>>,
}

impl NewMessage {
    /// Create a new `NewMessage` with the given role and content.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            planner: None,
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create the seeded greeting.
    pub fn greeting() -> Self {
        Self::assistant(GREETING)
            .with_planner(Some(GREETING_PLANNER.iter().map(|s| s.to_string()).collect()))
    }

    /// Create an assistant message describing a failed turn.  It never carries a planner.
    pub fn failure(err: &Error) -> Self {
        Self::assistant(err.to_message_content())
    }

    /// Attach a planner trace.
    pub fn with_planner(mut self, planner: Option<Vec<String>>) -> Self {
        self.planner = planner;
        self
    }

    /// Stamp the message with an id and timestamp.
    pub fn stamp(self, id: MessageId, timestamp: OffsetDateTime) -> Message {
        Message {
            id,
            role: self.role,
            content: self.content,
            timestamp,
            planner: self.planner,
        }
    }
}

/// Accepts a planner as a list, a single label, or null.
///
/// Older logs stored the backend's action name as a bare string.
fn deserialize_planner<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(planner_from_value))
}

/// Interprets a JSON value as a planner trace.
///
/// Arrays become the sequence (non-string items as JSON text), a string becomes a
/// single step, and anything else is absent.
pub(crate) fn planner_from_value(value: Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(step) => step,
                    other => other.to_string(),
                })
                .collect(),
        ),
        Value::String(step) => Some(vec![step]),
        _ => None,
    }
}
