//! rig-core backed [`ConversationalAgent`].

use async_trait::async_trait;
use rig::OneOrMany;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};
use rig::message::{AssistantContent, Message, UserContent};

use crate::error::LlmError;
use crate::session::{Role, TranscriptEntry};

use super::markers::parse_reply;
use super::{AgentReply, ConversationalAgent};

/// Standing instructions for every agent turn. Per-step instructions travel
/// in the prompt itself.
pub const SYSTEM_PREAMBLE: &str = "\
You are the assistant of a car insurance service talking to a customer in a chat.
The customer buys a policy in this order: send a photo of their passport, confirm the \
extracted data, send a photo of their vehicle registration document, confirm the \
extracted data, accept the fixed price, then receive the policy document.
Guidelines:
- Be concise and friendly. 1-4 sentences per reply.
- Never invent document data. Only report what the extract_document tool returned.
- When an instruction asks you to append a marker such as [CONFIRMED], put it at the \
very end of your reply. The customer will NOT see markers.
- If the customer asks something unrelated, answer briefly and steer them back to the \
current step.";

/// Agent backed by a rig completion model with the extraction tool attached.
pub struct RigAgent<M: CompletionModel> {
    agent: Agent<M>,
    max_turns: usize,
}

impl<M: CompletionModel> RigAgent<M> {
    pub fn new(agent: Agent<M>, max_turns: usize) -> Self {
        Self { agent, max_turns }
    }
}

#[async_trait]
impl<M> ConversationalAgent for RigAgent<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn run(
        &self,
        transcript: &[TranscriptEntry],
        prompt: &str,
    ) -> Result<AgentReply, LlmError> {
        let mut history: Vec<Message> = transcript.iter().map(to_rig_message).collect();

        let raw = self
            .agent
            .prompt(prompt)
            .with_history(&mut history)
            .max_turns(self.max_turns)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: e.to_string(),
            })?;

        let parsed = parse_reply(&raw);
        let mut updated: Vec<TranscriptEntry> = history.iter().filter_map(from_rig_message).collect();
        // The final assistant turn is stored without markers.
        if let Some(last) = updated.last_mut()
            && last.role == Role::Assistant
        {
            last.content = parsed.text.clone();
        }

        Ok(AgentReply {
            text: parsed.text,
            signal: parsed.signal,
            transcript: updated,
        })
    }
}

fn to_rig_message(entry: &TranscriptEntry) -> Message {
    match entry.role {
        Role::User => Message::user(entry.content.clone()),
        Role::Assistant => Message::assistant(entry.content.clone()),
    }
}

/// Keep only the text parts of a rig message; tool calls and results are
/// dropped from the transcript.
fn from_rig_message(message: &Message) -> Option<TranscriptEntry> {
    let (role, text) = match message {
        Message::User { content } => (Role::User, user_text(content)),
        Message::Assistant { content, .. } => (Role::Assistant, assistant_text(content)),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(TranscriptEntry { role, content: text })
    }
}

fn user_text(content: &OneOrMany<UserContent>) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            UserContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn assistant_text(content: &OneOrMany<AssistantContent>) -> String {
    content
        .iter()
        .filter_map(|c| match c {
            AssistantContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
