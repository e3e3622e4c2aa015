//! JSON messages exchanged over the coordination channel.
//!
//! Every frame is a JSON object with a `type` discriminator. Unknown types
//! decode to [`InboundMessage::Unknown`] so the manager can log and skip
//! them instead of treating them as a protocol failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    UserMessage { text: String },
    Ping,
}

impl OutboundMessage {
    pub fn user_message(text: impl Into<String>) -> Self {
        OutboundMessage::UserMessage { text: text.into() }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames received from the coordination server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    AssistantResponse {
        text: String,
        #[serde(default)]
        audio: Option<String>,
    },
    ProcessingStatus {
        processing: bool,
        #[serde(default)]
        progress: Option<f32>,
    },
    Error {
        message: String,
    },
    ServiceStatus {
        #[serde(default)]
        services: BTreeMap<String, bool>,
    },
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Decode one text frame.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}
