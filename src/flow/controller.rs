//! Inbound message routing.
//!
//! [`FlowController::handle_inbound_message`] is the single entry point. It
//! serializes messages per user, classifies the content, and dispatches to
//! the current step's handler, the agent, or a fallback message.

use std::sync::Arc;

use crate::channels::{ChatTransport, InboundMessage};
use crate::config::UploadLimits;
use crate::error::FlowError;
use crate::extraction::DocumentExtractor;
use crate::llm::ConversationalAgent;
use crate::session::{SessionHandle, SessionStore, TranscriptEntry};

use super::confirmation::ConfirmationResolver;
use super::content::ContentType;
use super::deliverable::{DeliverableDispatcher, DeliverableRenderer};
use super::ingestion::DocumentPipeline;
use super::prompts;
use super::quote::PriceQuote;
use super::registry::{StepHandler, StepSpec};

/// Collaborators shared by every handler.
pub struct FlowDeps {
    pub transport: Arc<dyn ChatTransport>,
    pub agent: Arc<dyn ConversationalAgent>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub renderer: Arc<dyn DeliverableRenderer>,
    pub quote: PriceQuote,
    pub limits: UploadLimits,
}

impl FlowDeps {
    /// Send a text message. Blank texts are skipped.
    pub(crate) async fn say(&self, user_id: &str, text: &str) -> Result<(), FlowError> {
        if text.trim().is_empty() {
            tracing::debug!(user_id = %user_id, transport = %self.transport.name(), "Skipping blank message");
            return Ok(());
        }
        self.transport.send_message(user_id, text).await?;
        Ok(())
    }

    /// Best-effort typing indicator.
    pub(crate) async fn typing(&self, user_id: &str) {
        if let Err(e) = self.transport.send_typing(user_id).await {
            tracing::debug!(user_id = %user_id, "Typing indicator failed: {}", e);
        }
    }
}

pub struct FlowController {
    store: Arc<SessionStore>,
    deps: Arc<FlowDeps>,
}

impl FlowController {
    pub fn new(store: Arc<SessionStore>, deps: FlowDeps) -> Self {
        Self {
            store,
            deps: Arc::new(deps),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Handle one inbound message to completion. Never fails; faults are
    /// logged and the message is dropped.
    pub async fn handle_inbound_message(&self, message: InboundMessage) {
        let user_id = message.user_id.clone();
        if let Err(e) = self.route(message).await {
            tracing::error!(user_id = %user_id, "Failed to handle message: {}", e);
        }
    }

    async fn route(&self, message: InboundMessage) -> Result<(), FlowError> {
        let handle = self.store.get_or_create(&message.user_id).await;
        let _turn = handle.begin_turn().await;

        let session = handle.snapshot().await;
        let spec = StepSpec::for_step(session.step);
        let content = ContentType::classify(&message);
        tracing::debug!(
            user_id = %message.user_id,
            step = %session.step,
            content = %content,
            manual = session.awaiting_manual_input,
            "Routing message"
        );

        if content == ContentType::Unsupported {
            return self.deps.say(&message.user_id, spec.expected_action).await;
        }

        let manual_text = session.awaiting_manual_input && content == ContentType::Text;
        if spec.accepts(content) || manual_text {
            if let Err(e) = self.run_handler(&handle, &spec, &message, content).await {
                tracing::warn!(
                    user_id = %message.user_id,
                    step = %spec.step,
                    transport = %self.deps.transport.name(),
                    "Step handler failed: {}",
                    e
                );
                self.deps
                    .say(&message.user_id, &prompts::retry_prompt(spec.accepts))
                    .await?;
            }
            return Ok(());
        }

        match content {
            ContentType::Text | ContentType::Command => {
                self.converse(&handle, &spec, &message).await
            }
            _ => {
                self.deps
                    .say(&message.user_id, &prompts::fallback_message(spec.expected_action))
                    .await
            }
        }
    }

    async fn run_handler(
        &self,
        handle: &SessionHandle,
        spec: &StepSpec,
        message: &InboundMessage,
        content: ContentType,
    ) -> Result<(), FlowError> {
        let user_id = handle.user_id();
        let text = message.text.as_deref().unwrap_or_default();

        match spec.handler {
            StepHandler::Welcome => {
                let welcome = prompts::welcome_message();
                let step = handle
                    .update(|s| {
                        s.push_transcript(TranscriptEntry::assistant(&welcome));
                        s.advance()
                    })
                    .await;
                tracing::info!(user_id = %user_id, step = %step, "Application started");
                self.deps.say(user_id, &welcome).await?;
            }
            StepHandler::CollectDocument(kind) => {
                let pipeline = DocumentPipeline::new(&self.deps);
                let file = match content {
                    ContentType::Photo => message.photo.as_ref(),
                    ContentType::Document => message.document.as_ref(),
                    _ => None,
                };
                let outcome = match file {
                    Some(file) => pipeline.ingest_file(handle, kind, file, content).await?,
                    None if content == ContentType::Text => {
                        pipeline.complete_manual(handle, kind, text).await?
                    }
                    None => {
                        return Err(FlowError::Misrouted {
                            step: spec.step.to_string(),
                            what: format!("{content} handler"),
                        });
                    }
                };
                tracing::debug!(user_id = %user_id, ?outcome, "Ingestion finished");
            }
            StepHandler::Confirm(confirmation) => {
                let resolution = ConfirmationResolver::new(&self.deps)
                    .resolve(handle, &confirmation, text)
                    .await?;
                tracing::debug!(user_id = %user_id, ?resolution, "Confirmation resolved");
            }
            StepHandler::GenerateDeliverable => {
                DeliverableDispatcher::new(&self.deps)
                    .deliver_or_defer(handle)
                    .await?;
            }
            StepHandler::Closing => {
                self.deps.say(user_id, &prompts::closing_message()).await?;
            }
        }
        Ok(())
    }

    /// Off-script text or command: let the agent answer.
    async fn converse(
        &self,
        handle: &SessionHandle,
        spec: &StepSpec,
        message: &InboundMessage,
    ) -> Result<(), FlowError> {
        let user_id = handle.user_id();
        let text = message.text.as_deref().unwrap_or_default();
        let session = handle
            .update(|s| {
                s.push_transcript(TranscriptEntry::user(text));
                s.clone()
            })
            .await;
        let prompt = prompts::conversation_instruction(&session, spec.expected_action);

        self.deps.typing(user_id).await;
        match self.deps.agent.run(&session.transcript, &prompt).await {
            Ok(reply) => {
                let reply =
                    reply.or_fallback(|| prompts::fallback_message(spec.expected_action));
                handle.update(|s| s.replace_transcript(reply.transcript)).await;
                self.deps.say(user_id, &reply.text).await
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, step = %spec.step, "Agent unavailable for off-script message: {}", e);
                self.deps
                    .say(user_id, &prompts::fallback_message(spec.expected_action))
                    .await
            }
        }
    }
}
