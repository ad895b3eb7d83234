//! Agent instructions and templated user-facing messages.
//!
//! Instructions are sent to the agent as the prompt of a turn; templates are
//! sent directly to the user when the agent is unavailable.

use crate::llm::markers::{CONFIRMED_MARKER, EXTRACTION_FAILED_MARKER, REJECTED_MARKER};
use crate::session::{DocumentFields, DocumentKind, DocumentValue, Session};

use super::content::ContentType;
use super::quote::PriceQuote;
use super::registry::ConfirmationSubject;

// ── Agent instructions ──────────────────────────────────────────────

/// Ask the agent to run the extraction tool on an uploaded file.
pub fn extraction_instruction(user_id: &str, file_url: &str, kind: DocumentKind) -> String {
    format!(
        "The customer (user_id: {user_id}) uploaded their {label}.\n\
         File URL: {file_url}\n\n\
         Call the extract_document tool with user_id \"{user_id}\", this file_url and \
         document_kind \"{kind}\". Then show the customer the extracted fields as a short \
         list and ask them to reply \"yes\" if everything is correct or \"no\" to send the \
         document again.\n\
         If the tool fails or the document is unreadable, briefly explain the problem, ask \
         for a clearer photo, and append {EXTRACTION_FAILED_MARKER} at the very end of your reply.",
        label = kind.label(),
    )
}

/// Ask the agent to classify a reply at a confirmation step.
pub fn confirmation_instruction(
    subject: ConfirmationSubject,
    session: &Session,
    quote: &PriceQuote,
    user_text: &str,
) -> String {
    let context = match subject {
        ConfirmationSubject::Document(kind) => format!(
            "The customer is confirming the data extracted from their {}:\n{}\n\
             Do not mention the price; it is sent separately.",
            kind.label(),
            document_listing(session.document(kind)),
        ),
        ConfirmationSubject::Price => format!(
            "The customer is deciding whether to accept the insurance price of {quote}. \
             The price is fixed and cannot be negotiated. If they decline, tell them politely \
             that {quote} is the only available price."
        ),
    };

    format!(
        "{context}\n\n\
         Customer's reply: \"{user_text}\"\n\n\
         Analyze the intent of the reply.\n\
         - If the customer agrees, acknowledge it briefly and append {CONFIRMED_MARKER}.\n\
         - If the customer disagrees, acknowledge it briefly and append {REJECTED_MARKER}.\n\
         - Otherwise answer their question and ask them to reply \"yes\" or \"no\". \
         Do not append any marker."
    )
}

/// Ask the agent to handle a message the current step does not expect.
pub fn conversation_instruction(session: &Session, expected_action: &str) -> String {
    format!(
        "The customer sent the message above while the application is at step \"{step}\". \
         What the step expects: {expected_action}\n\
         Infer what the customer wants and respond helpfully in 1-3 sentences, then remind \
         them what to do next. Do not append any marker.",
        step = session.step,
    )
}

// ── Templates ───────────────────────────────────────────────────────

pub fn welcome_message() -> String {
    "Hi! I'll help you buy car insurance in a few minutes.\n\n\
     I'll need a photo of your passport and of your vehicle registration document. \
     Let's start: please send a photo of your passport."
        .to_string()
}

pub fn processing_ack(kind: DocumentKind) -> String {
    format!("Got it! Reading your {}...", kind.label())
}

/// Field-by-field summary used when the agent could not present the data.
pub fn fields_summary(kind: DocumentKind, fields: &DocumentFields) -> String {
    let mut lines = vec![format!("Here is what I read from your {}:", kind.label())];
    lines.extend(
        fields
            .iter()
            .map(|(name, value)| format!("• {}: {}", humanize(name), value)),
    );
    lines.push(String::new());
    lines.push("Is this information correct? Please reply \"yes\" or \"no\".".to_string());
    lines.join("\n")
}

pub fn unreadable_document(kind: DocumentKind) -> String {
    format!(
        "Sorry, I couldn't read your {}. Please send a clearer photo.",
        kind.label()
    )
}

pub fn manual_entry_prompt(kind: DocumentKind) -> String {
    format!(
        "Sorry, I couldn't read your {label} automatically right now.\n\
         Please type the details instead: {hint}.",
        label = kind.label(),
        hint = kind.manual_entry_hint(),
    )
}

pub fn manual_confirmation(kind: DocumentKind, raw: &str) -> String {
    format!(
        "You entered the following {} details:\n{raw}\n\n\
         Is this correct? Please reply \"yes\" or \"no\".",
        kind.label()
    )
}

pub fn accepted_message(subject: ConfirmationSubject) -> String {
    match subject {
        ConfirmationSubject::Document(DocumentKind::Passport) => {
            "Thank you, your passport data is confirmed. \
             Now please send a photo of your vehicle registration document."
                .to_string()
        }
        ConfirmationSubject::Document(DocumentKind::VehicleRegistration) => {
            "Thank you, your vehicle data is confirmed.".to_string()
        }
        ConfirmationSubject::Price => "Great, thank you! Preparing your policy now.".to_string(),
    }
}

pub fn rejected_message(subject: ConfirmationSubject, quote: &PriceQuote) -> String {
    match subject {
        ConfirmationSubject::Document(kind) => {
            format!("No problem. Please send a new photo of your {}.", kind.label())
        }
        ConfirmationSubject::Price => format!(
            "Sorry, {quote} is the only price available. \
             Reply \"yes\" if you would like to proceed."
        ),
    }
}

pub fn yes_no_reprompt() -> String {
    "Please answer with \"yes\" or \"no\".".to_string()
}

pub fn quote_message(quote: &PriceQuote) -> String {
    format!(
        "The price of your car insurance policy is {quote}.\n\
         Do you accept it? Please reply \"yes\" or \"no\"."
    )
}

pub fn delivery_caption() -> &'static str {
    "Your car insurance policy"
}

pub fn closing_message() -> String {
    "Your policy has been issued. Thank you for choosing us, drive safely!".to_string()
}

pub fn delivery_deferred_message() -> String {
    "Sorry, I couldn't generate your policy just now. \
     Send any message and I'll try again."
        .to_string()
}

pub fn retry_prompt(accepts: &[ContentType]) -> String {
    let options: Vec<&str> = accepts.iter().map(ContentType::describe).collect();
    format!(
        "Something went wrong while processing that. Please send: {}.",
        options.join(" or ")
    )
}

pub fn fallback_message(expected_action: &str) -> String {
    format!("Sorry, I can't handle that right now. {expected_action}")
}

// ── Helpers ─────────────────────────────────────────────────────────

/// `birth_date` → `Birth date`.
pub fn humanize(field: &str) -> String {
    let spaced = field.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn document_listing(value: Option<&DocumentValue>) -> String {
    match value {
        Some(DocumentValue::Fields(fields)) => fields
            .iter()
            .map(|(name, value)| format!("- {}: {}", humanize(name), value))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(DocumentValue::Raw(text)) => format!("(typed by the customer) {text}"),
        None => "(no data stored)".to_string(),
    }
}
