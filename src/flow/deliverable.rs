//! Policy document rendering and delivery.

use chrono::{Months, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{DeliverableError, FlowError};
use crate::session::{DocumentKind, DocumentValue, Session, SessionHandle, Step};

use super::controller::FlowDeps;
use super::prompts;
use super::quote::PriceQuote;

/// A rendered file ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDeliverable {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// Turns a completed session into the final document.
pub trait DeliverableRenderer: Send + Sync {
    fn render(
        &self,
        session: &Session,
        quote: &PriceQuote,
    ) -> Result<RenderedDeliverable, DeliverableError>;
}

/// Plain-text insurance policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextPolicyRenderer;

impl PlainTextPolicyRenderer {
    fn render_on(
        &self,
        session: &Session,
        quote: &PriceQuote,
        policy_id: Uuid,
        issued: NaiveDate,
    ) -> Result<RenderedDeliverable, DeliverableError> {
        let holder = required_document(session, DocumentKind::Passport)?;
        let vehicle = required_document(session, DocumentKind::VehicleRegistration)?;
        let valid_until = issued
            .checked_add_months(Months::new(12))
            .ok_or_else(|| DeliverableError::Render("expiry date out of range".to_string()))?;

        let number = policy_id.simple().to_string().to_uppercase();
        let mut out = String::new();
        out.push_str("CAR INSURANCE POLICY\n");
        out.push_str("====================\n\n");
        out.push_str(&format!("Policy number: {number}\n"));
        out.push_str(&format!("Issue date:    {}\n", issued.format("%Y-%m-%d")));
        out.push_str(&format!("Valid until:   {}\n", valid_until.format("%Y-%m-%d")));
        out.push_str(&format!("Premium:       {quote}\n\n"));
        out.push_str("POLICYHOLDER\n");
        write_document(&mut out, holder);
        out.push_str("\nINSURED VEHICLE\n");
        write_document(&mut out, vehicle);
        out.push_str(
            "\nThis policy covers third-party liability for the vehicle above \
             for the period stated.\n",
        );

        Ok(RenderedDeliverable {
            bytes: out.into_bytes(),
            file_name: format!("policy-{}.txt", &number[..8]),
        })
    }
}

impl DeliverableRenderer for PlainTextPolicyRenderer {
    fn render(
        &self,
        session: &Session,
        quote: &PriceQuote,
    ) -> Result<RenderedDeliverable, DeliverableError> {
        self.render_on(session, quote, Uuid::new_v4(), Utc::now().date_naive())
    }
}

fn required_document(
    session: &Session,
    kind: DocumentKind,
) -> Result<&DocumentValue, DeliverableError> {
    session
        .document(kind)
        .ok_or_else(|| DeliverableError::MissingDocument(kind.label().to_string()))
}

fn write_document(out: &mut String, value: &DocumentValue) {
    match value {
        DocumentValue::Fields(fields) => {
            for (name, value) in fields.iter() {
                out.push_str(&format!("  {}: {}\n", prompts::humanize(name), value));
            }
        }
        DocumentValue::Raw(text) => {
            for line in text.lines() {
                out.push_str(&format!("  {}\n", line.trim()));
            }
        }
    }
}

/// Renders, sends and completes.
pub struct DeliverableDispatcher<'a> {
    deps: &'a FlowDeps,
}

impl<'a> DeliverableDispatcher<'a> {
    pub fn new(deps: &'a FlowDeps) -> Self {
        Self { deps }
    }

    /// Render and send the policy, then move to `completed`.
    pub async fn deliver(&self, handle: &SessionHandle) -> Result<(), FlowError> {
        let user_id = handle.user_id();
        let session = handle.snapshot().await;
        if session.step != Step::GeneratingDeliverable {
            return Err(FlowError::Misrouted {
                step: session.step.to_string(),
                what: "deliverable".to_string(),
            });
        }

        let rendered = self.deps.renderer.render(&session, &self.deps.quote)?;
        self.deps.typing(user_id).await;
        self.deps
            .transport
            .send_file(
                user_id,
                rendered.bytes,
                &rendered.file_name,
                Some(prompts::delivery_caption()),
            )
            .await?;

        let step = handle.update(|s| s.advance()).await;
        tracing::info!(user_id = %user_id, step = %step, file = %rendered.file_name, "Policy delivered");
        self.deps.say(user_id, &prompts::closing_message()).await?;
        Ok(())
    }

    /// Like [`deliver`](Self::deliver), but a failure leaves the session at
    /// `generating_deliverable` and tells the user to retry.
    pub async fn deliver_or_defer(&self, handle: &SessionHandle) -> Result<(), FlowError> {
        if let Err(e) = self.deliver(handle).await {
            if handle.step().await == Step::Completed {
                return Err(e);
            }
            tracing::warn!(user_id = %handle.user_id(), "Policy delivery failed: {}", e);
            self.deps
                .say(handle.user_id(), &prompts::delivery_deferred_message())
                .await?;
        }
        Ok(())
    }
}
