use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GREETING: &str =
    "La ce te-ai gândit? Poate o piesă vestimentară de la un designer local?";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Final,
    Pending,
}

/// Message body: one string or an ordered list of lines, kept in whichever
/// shape it arrived in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Lines(Vec<String>),
}

impl Content {
    /// The text as it should be rendered, lines joined with `\n`.
    pub fn rendered(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Lines(lines) => lines.join("\n"),
        }
    }

    /// Shape-insensitive equality: `Text("a")` matches `Lines(["a"])`.
    #[cfg(test)]
    pub fn same_text(&self, other: &Content) -> bool {
        match (self, other) {
            (Content::Text(a), Content::Lines(b)) | (Content::Lines(b), Content::Text(a)) => {
                b.len() == 1 && b[0] == *a
            }
            _ => self == other,
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<Vec<String>> for Content {
    fn from(lines: Vec<String>) -> Self {
        Content::Lines(lines)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub content: Content,
    pub status: Status,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, content: impl Into<Content>, status: Status) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content: content.into(),
            status,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<Content>) -> Self {
        Self::new(Sender::User, text, Status::Final)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::new(Sender::Assistant, content, Status::Final)
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LogError {
    #[error("message {0} already in the log")]
    DuplicateId(Uuid),
    #[error("message {0} not found")]
    NotFound(Uuid),
}

/// The conversation transcript. Messages are only ever appended, or have
/// their content and status swapped in place.
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// A fresh log holding only the assistant greeting.
    pub fn seeded() -> Self {
        Self {
            messages: vec![Message::assistant(GREETING)],
        }
    }

    pub fn append(&mut self, msg: Message) -> Result<(), LogError> {
        if self.messages.iter().any(|m| m.id == msg.id) {
            return Err(LogError::DuplicateId(msg.id));
        }
        self.messages.push(msg);
        Ok(())
    }

    pub fn replace(&mut self, id: Uuid, content: Content, status: Status) -> Result<(), LogError> {
        let msg = self
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(LogError::NotFound(id))?;
        msg.content = content;
        msg.status = status;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn get(&self, id: Uuid) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}
