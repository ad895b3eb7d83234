//! Telegram transport — long-polls the Bot API for updates and implements
//! [`ChatTransport`] on top of `sendMessage`, `sendDocument` and `getFile`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{
    ChatTransport, EntityKind, FileRef, InboundMessage, MessageEntity, MessageStream,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram transport — connects to the Bot API via long-polling.
pub struct TelegramTransport {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    /// Check if a username or numeric id is in the allowed list.
    pub fn is_user_allowed(&self, identity: &str) -> bool {
        check_user_allowed(&self.allowed_users, [identity])
    }

    /// Start long-polling. Messages from users outside the allowlist are
    /// dropped with a warning.
    pub fn start(&self) -> MessageStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram transport listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(message) = update.get("message") else {
                        continue;
                    };
                    let Some(incoming) = parse_message(message) else {
                        continue;
                    };

                    let username = message
                        .get("from")
                        .and_then(|f| f.get("username"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    let identities = [username, incoming.user_id.as_str()];
                    if !check_user_allowed(&allowed_users, identities) {
                        tracing::warn!(
                            "Telegram: ignoring message from unauthorized user: \
                             username={username}, user_id={}",
                            incoming.user_id
                        );
                        continue;
                    }

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Box::pin(stream)
    }

    /// Verify the token with getMe.
    pub async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(send_failed)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(send_failed)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_message(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(user_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_file(
        &self,
        user_id: &str,
        bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let mut form = Form::new()
            .text("chat_id", user_id.to_string())
            .part("document", part);
        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(send_failed)?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("sendDocument failed: {err}"),
            });
        }

        tracing::info!("Telegram document sent to {user_id}: {file_name}");
        Ok(())
    }

    async fn resolve_file_url(&self, file: &FileRef) -> Result<String, ChannelError> {
        let unavailable = |reason: String| ChannelError::FileUnavailable {
            file_id: file.file_id.clone(),
            reason,
        };

        let resp = self
            .client
            .post(self.api_url("getFile"))
            .json(&serde_json::json!({ "file_id": file.file_id }))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("getFile returned ok=false");
            return Err(unavailable(description.to_string()));
        }

        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| unavailable("getFile response has no file_path".into()))?;

        Ok(self.file_url(file_path))
    }

    async fn send_typing(&self, user_id: &str) -> Result<(), ChannelError> {
        self.client
            .post(self.api_url("sendChatAction"))
            .json(&serde_json::json!({
                "chat_id": user_id,
                "action": "typing"
            }))
            .send()
            .await
            .map_err(send_failed)?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn send_failed(e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: e.to_string(),
    }
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Convert a Bot API `message` object into an [`InboundMessage`].
///
/// Returns `None` when the message has no sender id.
fn parse_message(message: &Value) -> Option<InboundMessage> {
    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?.to_string();
    let mut incoming = InboundMessage::new(user_id);

    if let Some(name) = from
        .get("first_name")
        .or_else(|| from.get("username"))
        .and_then(Value::as_str)
    {
        incoming = incoming.with_user_name(name);
    }

    if let Some(text) = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
    {
        incoming = incoming.with_text(text);
    }

    // Telegram lists photo sizes smallest first.
    if let Some(largest) = message
        .get("photo")
        .and_then(Value::as_array)
        .and_then(|sizes| sizes.last())
        && let Some(file_id) = largest.get("file_id").and_then(Value::as_str)
    {
        let mut photo = FileRef::new(file_id).with_mime_type("image/jpeg");
        if let Some(size) = largest.get("file_size").and_then(Value::as_u64) {
            photo = photo.with_size(size);
        }
        incoming = incoming.with_photo(photo);
    }

    if let Some(doc) = message.get("document")
        && let Some(file_id) = doc.get("file_id").and_then(Value::as_str)
    {
        let mut file = FileRef::new(file_id);
        if let Some(mime) = doc.get("mime_type").and_then(Value::as_str) {
            file = file.with_mime_type(mime);
        }
        if let Some(size) = doc.get("file_size").and_then(Value::as_u64) {
            file = file.with_size(size);
        }
        if let Some(name) = doc.get("file_name").and_then(Value::as_str) {
            file = file.with_file_name(name);
        }
        incoming = incoming.with_document(file);
    }

    let entities = message
        .get("entities")
        .or_else(|| message.get("caption_entities"))
        .and_then(Value::as_array);
    for entity in entities.into_iter().flatten() {
        let Some(kind) = entity.get("type").and_then(Value::as_str) else {
            continue;
        };
        let kind = match kind {
            "bot_command" => EntityKind::BotCommand,
            other => EntityKind::Other(other.to_string()),
        };
        incoming = incoming.with_entity(MessageEntity {
            kind,
            offset: entity.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize,
            length: entity.get("length").and_then(Value::as_u64).unwrap_or(0) as usize,
        });
    }

    Some(incoming)
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
