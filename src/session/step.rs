//! Step state machine — tracks where a user is in the intake flow.

use serde::{Deserialize, Serialize};

/// The steps of the intake conversation.
///
/// Progresses linearly: Start → AwaitingFirstDocument →
/// ConfirmingFirstDocument → AwaitingSecondDocument →
/// ConfirmingSecondDocument → ConfirmingPrice → GeneratingDeliverable →
/// Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    Start,
    AwaitingFirstDocument,
    ConfirmingFirstDocument,
    AwaitingSecondDocument,
    ConfirmingSecondDocument,
    ConfirmingPrice,
    GeneratingDeliverable,
    Completed,
}

impl Step {
    /// Every step, in flow order.
    pub const ALL: [Step; 8] = [
        Step::Start,
        Step::AwaitingFirstDocument,
        Step::ConfirmingFirstDocument,
        Step::AwaitingSecondDocument,
        Step::ConfirmingSecondDocument,
        Step::ConfirmingPrice,
        Step::GeneratingDeliverable,
        Step::Completed,
    ];

    /// The following step, if any.
    pub fn next(&self) -> Option<Step> {
        use Step::*;
        match self {
            Start => Some(AwaitingFirstDocument),
            AwaitingFirstDocument => Some(ConfirmingFirstDocument),
            ConfirmingFirstDocument => Some(AwaitingSecondDocument),
            AwaitingSecondDocument => Some(ConfirmingSecondDocument),
            ConfirmingSecondDocument => Some(ConfirmingPrice),
            ConfirmingPrice => Some(GeneratingDeliverable),
            GeneratingDeliverable => Some(Completed),
            Completed => None,
        }
    }

    /// The preceding step, if any.
    pub fn previous(&self) -> Option<Step> {
        use Step::*;
        match self {
            Start => None,
            AwaitingFirstDocument => Some(Start),
            ConfirmingFirstDocument => Some(AwaitingFirstDocument),
            AwaitingSecondDocument => Some(ConfirmingFirstDocument),
            ConfirmingSecondDocument => Some(AwaitingSecondDocument),
            ConfirmingPrice => Some(ConfirmingSecondDocument),
            GeneratingDeliverable => Some(ConfirmingPrice),
            Completed => Some(GeneratingDeliverable),
        }
    }

    /// Whether this step is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Stable snake_case name, identical to the serde form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::AwaitingFirstDocument => "awaiting_first_document",
            Self::ConfirmingFirstDocument => "confirming_first_document",
            Self::AwaitingSecondDocument => "awaiting_second_document",
            Self::ConfirmingSecondDocument => "confirming_second_document",
            Self::ConfirmingPrice => "confirming_price",
            Self::GeneratingDeliverable => "generating_deliverable",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
