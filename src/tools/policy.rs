use serde::{Deserialize, Serialize};

/// What to do when the best knowledge-base match is below the configured minimum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidenceAction {
    Transfer,
    Voicemail,
    /// Also the fallback for unrecognized values.
    #[default]
    #[serde(other)]
    AskClarify,
}

impl LowConfidenceAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AskClarify => "ask_clarify",
            Self::Transfer => "transfer",
            Self::Voicemail => "voicemail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Answered,
    Clarify,
    Transfer,
    Voicemail,
}

impl GateOutcome {
    /// Wire tag for the low-confidence outcomes.
    #[must_use]
    pub const fn action(self) -> Option<&'static str> {
        match self {
            Self::Answered => None,
            Self::Clarify => Some("CLARIFY"),
            Self::Transfer => Some("TRANSFER"),
            Self::Voicemail => Some("VOICEMAIL"),
        }
    }
}

/// Pure function of the score and the configured action. NaN never passes.
#[must_use]
pub fn gate(confidence: f64, threshold: f64, action: LowConfidenceAction) -> GateOutcome {
    if confidence >= threshold {
        return GateOutcome::Answered;
    }
    match action {
        LowConfidenceAction::AskClarify => GateOutcome::Clarify,
        LowConfidenceAction::Transfer => GateOutcome::Transfer,
        LowConfidenceAction::Voicemail => GateOutcome::Voicemail,
    }
}
