//! Control markers exchanged between the agent and the flow.
//!
//! The model is told to append one of these literals to its reply. They are
//! parsed here, once, into an [`AgentSignal`]; the rest of the crate never
//! sees the raw strings outside of prompt text.

use serde::{Deserialize, Serialize};

/// The user confirmed the data or offer under discussion.
pub const CONFIRMED_MARKER: &str = "[CONFIRMED]";
/// The user rejected the data or offer under discussion.
pub const REJECTED_MARKER: &str = "[REJECTED]";
/// The extraction tool could not read the document.
pub const EXTRACTION_FAILED_MARKER: &str = "[EXTRACTION_FAILED]";

/// Machine-readable outcome attached to an agent reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentSignal {
    Confirmed,
    Rejected,
    ExtractionFailed,
}

impl AgentSignal {
    pub const ALL: [AgentSignal; 3] = [Self::ExtractionFailed, Self::Confirmed, Self::Rejected];

    pub fn marker(&self) -> &'static str {
        match self {
            Self::Confirmed => CONFIRMED_MARKER,
            Self::Rejected => REJECTED_MARKER,
            Self::ExtractionFailed => EXTRACTION_FAILED_MARKER,
        }
    }
}

/// Result of parsing a raw agent reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Reply text with every marker stripped (safe to display).
    pub text: String,
    pub signal: Option<AgentSignal>,
}

/// Strip markers from `raw` and report which one was present.
///
/// When the model emits both confirm and reject markers the reply is treated
/// as ambiguous and no signal is reported. The extraction-failure marker wins
/// over either.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let present = |signal: AgentSignal| raw.contains(signal.marker());

    let signal = if present(AgentSignal::ExtractionFailed) {
        Some(AgentSignal::ExtractionFailed)
    } else {
        match (present(AgentSignal::Confirmed), present(AgentSignal::Rejected)) {
            (true, false) => Some(AgentSignal::Confirmed),
            (false, true) => Some(AgentSignal::Rejected),
            _ => None,
        }
    };

    let text = AgentSignal::ALL
        .iter()
        .fold(raw.to_string(), |acc, signal| acc.replace(signal.marker(), ""))
        .trim()
        .to_string();

    ParsedReply { text, signal }
}
