//! Chat transport abstraction and the inbound message model.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Stream of inbound messages produced by a transport.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundMessage> + Send>>;

/// A file attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Transport-specific opaque reference.
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl FileRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: None,
            mime_type: None,
            file_size: None,
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.file_size = Some(size);
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Kind of a structured text entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    BotCommand,
    Other(String),
}

/// A tagged span inside the message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

/// A parsed inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// External user identifier; also the address replies go to.
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<FileRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<FileRef>,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
}

impl InboundMessage {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: None,
            text: None,
            photo: None,
            document: None,
            entities: Vec::new(),
        }
    }

    /// Plain text message.
    pub fn text(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(user_id).with_text(text)
    }

    /// Text message whose leading token is a bot command.
    pub fn command(user_id: impl Into<String>, command: impl Into<String>) -> Self {
        let command = command.into();
        let length = command.split_whitespace().next().map_or(0, str::len);
        Self::new(user_id)
            .with_text(command)
            .with_entity(MessageEntity {
                kind: EntityKind::BotCommand,
                offset: 0,
                length,
            })
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_photo(mut self, photo: FileRef) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn with_document(mut self, document: FileRef) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_entity(mut self, entity: MessageEntity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

/// Outbound side of a chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name for logs.
    fn name(&self) -> &str;

    /// Send a text message to a user.
    async fn send_message(&self, user_id: &str, text: &str) -> Result<(), ChannelError>;

    /// Send an in-memory file to a user.
    async fn send_file(
        &self,
        user_id: &str,
        bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Turn a file reference into a downloadable URL. Fails if the reference
    /// is invalid or expired.
    async fn resolve_file_url(&self, file: &FileRef) -> Result<String, ChannelError>;

    /// Show a "typing" indicator. Best-effort.
    async fn send_typing(&self, _user_id: &str) -> Result<(), ChannelError> {
        Ok(())
    }
}
