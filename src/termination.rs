//! Termination conditions for team runs.

use crate::transcript::Transcript;

/// Predicate over the transcript deciding when a run stops. Evaluated after
/// every appended message; once satisfied, no further turns execute.
pub trait TerminationCondition: Send + Sync {
    fn is_satisfied(&self, transcript: &Transcript) -> bool;

    /// Short label used in the run's stop reason.
    fn description(&self) -> String;
}

/// Stops when a marker substring appears in the most recently appended
/// message. The match is case-sensitive and exact: no whitespace or
/// punctuation normalization, and earlier messages are never scanned, so a
/// historical mention cannot end the run.
pub struct TextMentionTermination {
    marker: String,
}

impl TextMentionTermination {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }
}

impl TerminationCondition for TextMentionTermination {
    fn is_satisfied(&self, transcript: &Transcript) -> bool {
        transcript
            .last()
            .map(|message| message.content.contains(&self.marker))
            .unwrap_or(false)
    }

    fn description(&self) -> String {
        format!("text `{}` mentioned", self.marker)
    }
}
