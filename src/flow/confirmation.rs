//! Confirmation steps: interpret a yes/no style reply and run the step's
//! accept or reject behavior.

use crate::error::FlowError;
use crate::llm::AgentSignal;
use crate::session::{SessionHandle, TranscriptEntry};

use super::controller::FlowDeps;
use super::deliverable::DeliverableDispatcher;
use super::prompts;
use super::registry::{AcceptAction, Confirmation, RejectAction};

/// How a confirmation reply was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accepted,
    Rejected,
    /// The agent answered without a decision. No transition.
    SideQuestion,
    /// Agent unavailable and the reply was not a plain yes/no. No transition.
    Reprompted,
}

/// Strict yes/no match after trimming and case folding.
pub fn parse_yes_no(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

pub struct ConfirmationResolver<'a> {
    deps: &'a FlowDeps,
}

impl<'a> ConfirmationResolver<'a> {
    pub fn new(deps: &'a FlowDeps) -> Self {
        Self { deps }
    }

    pub async fn resolve(
        &self,
        handle: &SessionHandle,
        confirmation: &Confirmation,
        user_text: &str,
    ) -> Result<Resolution, FlowError> {
        let user_id = handle.user_id();
        let session = handle.snapshot().await;
        let prompt = prompts::confirmation_instruction(
            confirmation.subject,
            &session,
            &self.deps.quote,
            user_text,
        );

        self.deps.typing(user_id).await;
        match self.deps.agent.run(&session.transcript, &prompt).await {
            Ok(reply) => {
                let resolution = match reply.signal {
                    Some(AgentSignal::Confirmed) => Resolution::Accepted,
                    Some(AgentSignal::Rejected) => Resolution::Rejected,
                    Some(AgentSignal::ExtractionFailed) | None => Resolution::SideQuestion,
                };
                let reply = reply.or_fallback(|| self.template_for(confirmation, resolution));
                handle.update(|s| s.replace_transcript(reply.transcript)).await;
                self.settle(handle, confirmation, resolution, &reply.text).await?;
                Ok(resolution)
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, step = %session.step, "Agent unavailable, matching yes/no: {}", e);
                self.resolve_plain(handle, confirmation, user_text).await
            }
        }
    }

    /// Fallback when the agent errors.
    async fn resolve_plain(
        &self,
        handle: &SessionHandle,
        confirmation: &Confirmation,
        user_text: &str,
    ) -> Result<Resolution, FlowError> {
        let resolution = match parse_yes_no(user_text) {
            Some(true) => Resolution::Accepted,
            Some(false) => Resolution::Rejected,
            None => Resolution::Reprompted,
        };
        let reply = self.template_for(confirmation, resolution);

        handle
            .update(|s| {
                s.push_transcript(TranscriptEntry::user(user_text));
                s.push_transcript(TranscriptEntry::assistant(&reply));
            })
            .await;
        self.settle(handle, confirmation, resolution, &reply).await?;
        Ok(resolution)
    }

    fn template_for(&self, confirmation: &Confirmation, resolution: Resolution) -> String {
        match resolution {
            Resolution::Accepted => prompts::accepted_message(confirmation.subject),
            Resolution::Rejected => prompts::rejected_message(confirmation.subject, &self.deps.quote),
            Resolution::SideQuestion | Resolution::Reprompted => prompts::yes_no_reprompt(),
        }
    }

    /// Apply the transition, then send the reply, then any follow-up. The
    /// session is already consistent with the reply if sending fails.
    async fn settle(
        &self,
        handle: &SessionHandle,
        confirmation: &Confirmation,
        resolution: Resolution,
        reply: &str,
    ) -> Result<(), FlowError> {
        let step = match resolution {
            Resolution::Accepted => handle.update(|s| s.advance()).await,
            Resolution::Rejected => {
                handle
                    .update(|s| match confirmation.on_reject {
                        None => s.retreat(),
                        Some(RejectAction::ClearDocumentAndRetreat(kind)) => {
                            s.clear_document(kind);
                            s.retreat()
                        }
                        Some(RejectAction::Stay) => s.step,
                    })
                    .await
            }
            Resolution::SideQuestion | Resolution::Reprompted => handle.step().await,
        };
        tracing::info!(user_id = %handle.user_id(), step = %step, ?resolution, "Confirmation resolved");

        self.deps.say(handle.user_id(), reply).await?;

        if resolution == Resolution::Accepted {
            self.follow_up_accept(handle, confirmation).await?;
        }
        Ok(())
    }

    async fn follow_up_accept(
        &self,
        handle: &SessionHandle,
        confirmation: &Confirmation,
    ) -> Result<(), FlowError> {
        match confirmation.on_accept {
            None => {}
            Some(AcceptAction::AdvanceAndQuote) => {
                let quote = prompts::quote_message(&self.deps.quote);
                handle
                    .update(|s| s.push_transcript(TranscriptEntry::assistant(&quote)))
                    .await;
                self.deps.say(handle.user_id(), &quote).await?;
            }
            Some(AcceptAction::AdvanceAndDeliver) => {
                DeliverableDispatcher::new(self.deps)
                    .deliver_or_defer(handle)
                    .await?;
            }
        }
        Ok(())
    }
}
