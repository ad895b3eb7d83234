//! The insurance application flow.
//!
//! Messages are queued per user by [`MessageDispatcher`] and handled by
//! [`FlowController`], which classifies them into a [`ContentType`] and
//! dispatches according to the [`StepSpec`] of the user's current step.

pub mod confirmation;
pub mod content;
pub mod controller;
pub mod deliverable;
pub mod dispatch;
pub mod ingestion;
pub mod prompts;
pub mod quote;
pub mod registry;

pub use confirmation::{ConfirmationResolver, Resolution, parse_yes_no};
pub use content::ContentType;
pub use controller::{FlowController, FlowDeps};
pub use deliverable::{
    DeliverableDispatcher, DeliverableRenderer, PlainTextPolicyRenderer, RenderedDeliverable,
};
pub use dispatch::MessageDispatcher;
pub use ingestion::{DocumentPipeline, IngestOutcome, UploadRejection, validate_upload};
pub use quote::PriceQuote;
pub use registry::{
    AcceptAction, Confirmation, ConfirmationSubject, RejectAction, StepHandler, StepSpec,
};
