//! Conversational agent integration.
//!
//! The flow talks to the model through [`ConversationalAgent`], which takes
//! the session transcript plus a new prompt and returns a structured
//! [`AgentReply`]. The production implementation is [`RigAgent`], backed by
//! rig-core's Anthropic client with an `extract_document` tool.

pub mod extract_tool;
pub mod markers;
pub mod rig_agent;

pub use extract_tool::ExtractDocumentTool;
pub use markers::{AgentSignal, ParsedReply, parse_reply};
pub use rig_agent::RigAgent;

use std::sync::Arc;

use async_trait::async_trait;
use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;
use crate::extraction::DocumentExtractor;
use crate::session::{Role, SessionStore, TranscriptEntry};

/// Structured reply from one agent turn.
#[derive(Debug, Clone)]
pub struct AgentReply {
    /// Reply text, markers stripped.
    pub text: String,
    pub signal: Option<AgentSignal>,
    /// The full conversation after this turn; replaces the session transcript.
    pub transcript: Vec<TranscriptEntry>,
}

impl AgentReply {
    /// Build a reply from raw model output, appending the prompt and cleaned
    /// answer to `transcript`.
    pub fn from_raw(transcript: &[TranscriptEntry], prompt: &str, raw: &str) -> Self {
        let parsed = parse_reply(raw);
        let mut transcript = transcript.to_vec();
        transcript.push(TranscriptEntry::user(prompt));
        transcript.push(TranscriptEntry::assistant(&parsed.text));
        Self {
            text: parsed.text,
            signal: parsed.signal,
            transcript,
        }
    }

    /// Replace an empty reply (e.g. a bare marker) with `fallback`, in both
    /// the text and the final assistant transcript entry.
    pub fn or_fallback(mut self, fallback: impl FnOnce() -> String) -> Self {
        if !self.text.trim().is_empty() {
            return self;
        }
        self.text = fallback();
        match self.transcript.last_mut() {
            Some(last) if last.role == Role::Assistant => last.content = self.text.clone(),
            _ => self.transcript.push(TranscriptEntry::assistant(&self.text)),
        }
        self
    }
}

/// A conversational agent that may call tools while answering.
#[async_trait]
pub trait ConversationalAgent: Send + Sync {
    async fn run(
        &self,
        transcript: &[TranscriptEntry],
        prompt: &str,
    ) -> Result<AgentReply, LlmError>;
}

/// Configuration for the rig-backed agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: SecretString,
    pub model: String,
    /// Maximum tool-call round trips per prompt.
    pub max_turns: usize,
    pub max_tokens: u64,
}

/// Create the production agent, wiring the extraction tool to `store`.
pub fn create_agent(
    config: &AgentConfig,
    store: Arc<SessionStore>,
    extractor: Arc<dyn DocumentExtractor>,
) -> Result<Arc<dyn ConversationalAgent>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let agent = client
        .agent(&config.model)
        .preamble(rig_agent::SYSTEM_PREAMBLE)
        .max_tokens(config.max_tokens)
        .tool(ExtractDocumentTool::new(store, extractor))
        .build();

    tracing::info!("Using Anthropic agent (model: {})", config.model);
    Ok(Arc::new(RigAgent::new(agent, config.max_turns)))
}
