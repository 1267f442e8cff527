use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
            created_at: Utc::now(),
        }
    }
}

/// Append-only chat history with at most one assistant entry still streaming
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    in_progress: Option<Uuid>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn push_user(&mut self, text: &str) -> Uuid {
        self.push(Role::User, text.to_string())
    }

    /// Complete assistant message, e.g. an apology after a failed stream
    pub fn push_assistant(&mut self, text: &str) -> Uuid {
        self.push(Role::Assistant, text.to_string())
    }

    fn push(&mut self, role: Role, text: String) -> Uuid {
        let message = ChatMessage::new(role, text);
        let id = message.id;
        self.messages.push(message);
        id
    }

    /// Open an empty assistant entry that subsequent chunks will overwrite.
    /// Any entry still open is finalized first.
    pub fn begin_assistant(&mut self) -> Uuid {
        self.in_progress = None;
        let id = self.push(Role::Assistant, String::new());
        self.in_progress = Some(id);
        id
    }

    pub fn in_progress(&self) -> Option<&ChatMessage> {
        let id = self.in_progress?;
        self.messages.iter().rev().find(|m| m.id == id)
    }

    /// Replace the text of the open entry. Returns false when `id` is no
    /// longer the open entry, in which case nothing changes.
    pub fn update_in_progress(&mut self, id: Uuid, text: &str) -> bool {
        if self.in_progress != Some(id) {
            return false;
        }
        match self.messages.iter_mut().rev().find(|m| m.id == id) {
            Some(message) => {
                message.text.clear();
                message.text.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn finalize(&mut self, id: Uuid) {
        if self.in_progress == Some(id) {
            self.in_progress = None;
        }
    }
}
