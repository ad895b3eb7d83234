//! Step registry — what each step accepts, what it expects from the user,
//! and which handler runs for it.
//!
//! The table is a closed `match` over [`Step`], so adding a step without an
//! entry does not compile. Accept/reject callbacks only exist on the
//! confirmation variant.

use crate::session::{DocumentKind, Step};

use super::content::ContentType;

/// What a confirmation step is asking the user to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationSubject {
    Document(DocumentKind),
    Price,
}

/// Custom behavior when the user accepts. `None` means plain advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptAction {
    /// Advance, then announce the price.
    AdvanceAndQuote,
    /// Advance, then generate and send the deliverable.
    AdvanceAndDeliver,
}

/// Custom behavior when the user rejects. `None` means plain retreat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectAction {
    /// Drop the stored document, then retreat to its upload step.
    ClearDocumentAndRetreat(DocumentKind),
    /// The price is fixed; stay on the step.
    Stay,
}

/// Confirmation step configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub subject: ConfirmationSubject,
    pub on_accept: Option<AcceptAction>,
    pub on_reject: Option<RejectAction>,
}

/// Handler attached to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepHandler {
    Welcome,
    CollectDocument(DocumentKind),
    Confirm(Confirmation),
    GenerateDeliverable,
    Closing,
}

const CONVERSATION: &[ContentType] = &[ContentType::Text, ContentType::Command];
const FILES: &[ContentType] = &[ContentType::Photo, ContentType::Document];
const TEXT_ONLY: &[ContentType] = &[ContentType::Text];

/// One registry entry.
#[derive(Debug, Clone, Copy)]
pub struct StepSpec {
    pub step: Step,
    pub accepts: &'static [ContentType],
    pub expected_action: &'static str,
    pub handler: StepHandler,
}

impl StepSpec {
    /// Look up the entry for a step.
    pub fn for_step(step: Step) -> Self {
        let (accepts, expected_action, handler) = match step {
            Step::Start => (
                CONVERSATION,
                "Send /start or any message to begin your car insurance application.",
                StepHandler::Welcome,
            ),
            Step::AwaitingFirstDocument => (
                FILES,
                "Please send a photo of your passport.",
                StepHandler::CollectDocument(DocumentKind::Passport),
            ),
            Step::ConfirmingFirstDocument => (
                TEXT_ONLY,
                "Please reply \"yes\" if your passport data is correct, or \"no\" to send it again.",
                StepHandler::Confirm(Confirmation {
                    subject: ConfirmationSubject::Document(DocumentKind::Passport),
                    on_accept: None,
                    on_reject: Some(RejectAction::ClearDocumentAndRetreat(
                        DocumentKind::Passport,
                    )),
                }),
            ),
            Step::AwaitingSecondDocument => (
                FILES,
                "Please send a photo of your vehicle registration document.",
                StepHandler::CollectDocument(DocumentKind::VehicleRegistration),
            ),
            Step::ConfirmingSecondDocument => (
                TEXT_ONLY,
                "Please reply \"yes\" if your vehicle data is correct, or \"no\" to send it again.",
                StepHandler::Confirm(Confirmation {
                    subject: ConfirmationSubject::Document(DocumentKind::VehicleRegistration),
                    on_accept: Some(AcceptAction::AdvanceAndQuote),
                    on_reject: Some(RejectAction::ClearDocumentAndRetreat(
                        DocumentKind::VehicleRegistration,
                    )),
                }),
            ),
            Step::ConfirmingPrice => (
                TEXT_ONLY,
                "Please reply \"yes\" to accept the price, or \"no\" to decline.",
                StepHandler::Confirm(Confirmation {
                    subject: ConfirmationSubject::Price,
                    on_accept: Some(AcceptAction::AdvanceAndDeliver),
                    on_reject: Some(RejectAction::Stay),
                }),
            ),
            Step::GeneratingDeliverable => (
                CONVERSATION,
                "Your policy is being prepared. Send any message if it has not arrived yet.",
                StepHandler::GenerateDeliverable,
            ),
            Step::Completed => (
                CONVERSATION,
                "Your policy has been issued. Nothing else is needed.",
                StepHandler::Closing,
            ),
        };

        Self {
            step,
            accepts,
            expected_action,
            handler,
        }
    }

    pub fn accepts(&self, content: ContentType) -> bool {
        self.accepts.contains(&content)
    }

    pub fn confirmation(&self) -> Option<&Confirmation> {
        match &self.handler {
            StepHandler::Confirm(c) => Some(c),
            _ => None,
        }
    }
}
