//! Conversation data model and request payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollectError;

/// A single prompt/response exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub response: String,
}

impl Message {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
        }
    }

    /// A message counts as present only when both halves are populated.
    pub fn is_complete(&self) -> bool {
        !self.prompt.is_empty() && !self.response.is_empty()
    }
}

/// A stored conversation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /collect` and `POST /analytics/new_convo`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewConversation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl NewConversation {
    pub fn validate(&self) -> Result<(), CollectError> {
        validate_new(&self.id, &self.user, &self.messages)
    }
}

/// Body of `POST /analytics/message` and `POST /analytics/add_message`.
///
/// `user` may be omitted only when appending to a conversation that already exists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageInstance {
    #[serde(default, alias = "convo_id")]
    pub id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub message: Message,
}

impl MessageInstance {
    pub fn validate(&self) -> Result<(), CollectError> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.user.as_deref().is_some_and(|u| u.trim().is_empty()) {
            missing.push("user");
        }
        if !self.message.is_complete() {
            missing.push("message");
        }
        into_result(missing)
    }
}

/// Preconditions for creating a conversation with a full message list.
pub fn validate_new(id: &str, user: &str, messages: &[Message]) -> Result<(), CollectError> {
    let mut missing = Vec::new();
    if id.trim().is_empty() {
        missing.push("id");
    }
    if user.trim().is_empty() {
        missing.push("user");
    }
    if messages.is_empty() || !messages.iter().all(Message::is_complete) {
        missing.push("messages");
    }
    into_result(missing)
}

/// Preconditions for appending to an existing conversation.
pub fn validate_append(id: &str, message: &Message) -> Result<(), CollectError> {
    let mut missing = Vec::new();
    if id.trim().is_empty() {
        missing.push("id");
    }
    if !message.is_complete() {
        missing.push("message");
    }
    into_result(missing)
}

/// Preconditions for the insert-or-append path.
pub fn validate_upsert(id: &str, user: &str, message: &Message) -> Result<(), CollectError> {
    let mut missing = Vec::new();
    if id.trim().is_empty() {
        missing.push("id");
    }
    if user.trim().is_empty() {
        missing.push("user");
    }
    if !message.is_complete() {
        missing.push("message");
    }
    into_result(missing)
}

fn into_result(missing: Vec<&'static str>) -> Result<(), CollectError> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CollectError::Validation(missing))
    }
}
