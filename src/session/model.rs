//! Session data model: documents, transcript, and the per-user record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::Step;

/// The two documents the flow collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Passport,
    VehicleRegistration,
}

impl DocumentKind {
    /// Human-readable name used in user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passport => "passport",
            Self::VehicleRegistration => "vehicle registration document",
        }
    }

    /// Canonical field names, in display order.
    pub fn expected_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Passport => &[
                "surname",
                "given_names",
                "birth_date",
                "document_number",
                "nationality",
                "expiry_date",
            ],
            Self::VehicleRegistration => &[
                "registration_number",
                "vin",
                "make",
                "model",
                "year",
                "owner_name",
            ],
        }
    }

    /// What to type when automated extraction is unavailable.
    pub fn manual_entry_hint(&self) -> &'static str {
        match self {
            Self::Passport => "full name, date of birth, passport number and nationality",
            Self::VehicleRegistration => {
                "registration number, VIN, make, model and year of the vehicle"
            }
        }
    }

    /// The step at which this document is uploaded.
    pub fn upload_step(&self) -> Step {
        match self {
            Self::Passport => Step::AwaitingFirstDocument,
            Self::VehicleRegistration => Step::AwaitingSecondDocument,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passport => "passport",
            Self::VehicleRegistration => "vehicle_registration",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentKind {
    type Err = crate::error::ExtractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "passport" => Ok(Self::Passport),
            "vehicle_registration" | "vehicle" => Ok(Self::VehicleRegistration),
            other => Err(crate::error::ExtractionError::UnknownKind(other.to_string())),
        }
    }
}

/// Structured fields extracted from a document, kept in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFields(Vec<(String, String)>);

impl DocumentFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DocumentFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Self::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// A stored document: either extracted fields or free text typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DocumentValue {
    Fields(DocumentFields),
    Raw(String),
}

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation memory handed to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

impl TranscriptEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One user's progress through the flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub step: Step,
    pub transcript: Vec<TranscriptEntry>,
    pub passport: Option<DocumentValue>,
    pub vehicle: Option<DocumentValue>,
    /// Set while both automated extraction tiers have failed and the next
    /// text message is taken verbatim as the document.
    pub awaiting_manual_input: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            step: Step::default(),
            transcript: Vec::new(),
            passport: None,
            vehicle: None,
            awaiting_manual_input: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to the next step. Saturates at the terminal step.
    pub fn advance(&mut self) -> Step {
        if let Some(next) = self.step.next() {
            self.step = next;
            self.touch();
        }
        self.step
    }

    /// Move to the previous step. No-op at the initial step.
    pub fn retreat(&mut self) -> Step {
        if let Some(previous) = self.step.previous() {
            self.step = previous;
            self.touch();
        }
        self.step
    }

    pub fn document(&self, kind: DocumentKind) -> Option<&DocumentValue> {
        match kind {
            DocumentKind::Passport => self.passport.as_ref(),
            DocumentKind::VehicleRegistration => self.vehicle.as_ref(),
        }
    }

    pub fn set_document(&mut self, kind: DocumentKind, value: DocumentValue) {
        match kind {
            DocumentKind::Passport => self.passport = Some(value),
            DocumentKind::VehicleRegistration => self.vehicle = Some(value),
        }
        self.touch();
    }

    pub fn clear_document(&mut self, kind: DocumentKind) {
        match kind {
            DocumentKind::Passport => self.passport = None,
            DocumentKind::VehicleRegistration => self.vehicle = None,
        }
        self.touch();
    }

    pub fn push_transcript(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
        self.touch();
    }

    /// Replace the transcript with the one returned by the agent.
    pub fn replace_transcript(&mut self, transcript: Vec<TranscriptEntry>) {
        self.transcript = transcript;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
