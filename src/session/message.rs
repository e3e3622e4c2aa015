//! Conversation messages.
//!
//! A [`Message`] is created once, when a pipeline run completes, and never
//! changes afterwards: its fields are private and only exposed through
//! accessors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::MediaRef;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    role: Role,
    text: String,
    media: Option<MediaRef>,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        role: Role,
        text: impl Into<String>,
        media: Option<MediaRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            media,
            created_at,
        }
    }

    pub fn user(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self::new(Role::User, text, None, created_at)
    }

    pub fn assistant(
        text: impl Into<String>,
        media: Option<MediaRef>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(Role::Assistant, text, media, created_at)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn media(&self) -> Option<&MediaRef> {
        self.media.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
