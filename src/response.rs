//! Poll reply interpreter.
//!
//! Maps inbound patient text to one of five poll responses. Matching is
//! deliberately narrow: a bare digit, a canonical button token, or one of
//! a short list of exact phrasings. Free-form narration that merely
//! contains a trigger word ("worse than my headache yesterday") stays
//! unclassified and goes to the conversational handler instead.

use serde::{Deserialize, Serialize};

/// A recognised poll reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollResponse {
    MuchBetter,
    SlightlyBetter,
    SameSymptoms,
    WorseCondition,
    EmergencyHelp,
}

impl PollResponse {
    /// Positional order used by numeric replies (1-5).
    pub const ORDERED: [Self; 5] = [
        Self::MuchBetter,
        Self::SlightlyBetter,
        Self::SameSymptoms,
        Self::WorseCondition,
        Self::EmergencyHelp,
    ];

    /// Canonical token as sent by structured (button) replies.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::MuchBetter => "much_better",
            Self::SlightlyBetter => "slightly_better",
            Self::SameSymptoms => "same_symptoms",
            Self::WorseCondition => "worse_condition",
            Self::EmergencyHelp => "emergency_help",
        }
    }

    #[must_use]
    pub fn action(self) -> PollAction {
        match self {
            Self::MuchBetter => PollAction::Reduce,
            Self::SlightlyBetter | Self::SameSymptoms => PollAction::Continue,
            Self::WorseCondition => PollAction::Escalate,
            Self::EmergencyHelp => PollAction::Emergency,
        }
    }
}

/// What the controller should do with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Cancel the symptom chain; daily monitoring continues.
    Reduce,
    /// Keep the current cadence.
    Continue,
    /// Move the symptom chain one tier up.
    Escalate,
    /// Emergency messaging plus one safety follow-up.
    Emergency,
    /// Not a poll reply; route to the conversational handler.
    Unhandled,
}

// (response, phrases), compared after normalisation, never as substrings.
const PHRASES: &[(PollResponse, &[&str])] = &[
    (
        PollResponse::MuchBetter,
        &[
            "much better",
            "feeling much better",
            "i feel much better",
            "i'm much better",
            "im much better",
            "a lot better",
            "way better",
            "all better",
            "feeling great",
            "i'm fine now",
            "im fine now",
        ],
    ),
    (
        PollResponse::SlightlyBetter,
        &[
            "slightly better",
            "a little better",
            "a bit better",
            "bit better",
            "little better",
            "somewhat better",
            "better",
            "feeling better",
            "a little bit better",
        ],
    ),
    (
        PollResponse::SameSymptoms,
        &[
            "same",
            "the same",
            "about the same",
            "same symptoms",
            "no change",
            "unchanged",
            "still the same",
        ],
    ),
    (
        PollResponse::WorseCondition,
        &[
            "worse",
            "feeling worse",
            "i feel worse",
            "getting worse",
            "much worse",
            "worse condition",
            "i'm worse",
            "im worse",
        ],
    ),
    (
        PollResponse::EmergencyHelp,
        &[
            "emergency",
            "help",
            "need help",
            "i need help",
            "emergency help",
            "sos",
            "call an ambulance",
        ],
    ),
];

/// Classify a reply. `None` means unclassified.
#[must_use]
pub fn classify_response(text: &str) -> Option<PollResponse> {
    let normalised = normalise(text);
    if normalised.is_empty() {
        return None;
    }

    // 1. Bare digit.
    if let [digit @ b'0'..=b'9'] = normalised.as_bytes() {
        let n = usize::from(*digit - b'0');
        return (1..=5).contains(&n).then(|| PollResponse::ORDERED[n - 1]);
    }

    // 2. Canonical token.
    if let Some(response) = PollResponse::ORDERED
        .iter()
        .copied()
        .find(|r| r.token() == normalised)
    {
        return Some(response);
    }

    // 3. Curated phrasings.
    let phrase = normalised.trim_end_matches(['.', '!']).trim_end();
    PHRASES
        .iter()
        .find(|(_, phrases)| phrases.contains(&phrase))
        .map(|(response, _)| *response)
}

/// Map raw reply text to a controller action.
///
/// Any text mentioning 911 is treated as an emergency even when it is not
/// otherwise a poll reply.
#[must_use]
pub fn interpret(text: &str) -> PollAction {
    if text.contains("911") {
        return PollAction::Emergency;
    }
    classify_response(text).map_or(PollAction::Unhandled, PollResponse::action)
}

fn normalise(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
