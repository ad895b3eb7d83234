//! Content-type classification of inbound messages.

use serde::{Deserialize, Serialize};

use crate::channels::{EntityKind, InboundMessage};

/// What an inbound message carries, for routing purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Command,
    Document,
    Photo,
    Unsupported,
}

impl ContentType {
    /// Classify a message. Precedence: photo, file attachment, leading bot
    /// command entity, text, otherwise unsupported.
    pub fn classify(message: &InboundMessage) -> Self {
        if message.photo.is_some() {
            return Self::Photo;
        }
        if message.document.is_some() {
            return Self::Document;
        }
        if message
            .entities
            .first()
            .is_some_and(|e| e.kind == EntityKind::BotCommand)
        {
            return Self::Command;
        }
        if message.text.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return Self::Text;
        }
        Self::Unsupported
    }

    /// How the content type is named in retry prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Text => "a text message",
            Self::Command => "a command",
            Self::Document => "a file",
            Self::Photo => "a photo",
            Self::Unsupported => "unsupported content",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Command => "command",
            Self::Document => "document",
            Self::Photo => "photo",
            Self::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}
