use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MessageKind, Sender};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub kind: MessageKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, MessageKind::Question, text)
    }

    pub fn assistant(kind: MessageKind, text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, kind, text)
    }

    fn new(sender: Sender, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            kind,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}
