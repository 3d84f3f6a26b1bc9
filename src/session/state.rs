//! Persona state machine.

use serde::{Deserialize, Serialize};

use super::model::Persona;

/// Position of the widget in the persona state machine.
///
/// `Qa ⇄ Ingest*` on explicit switches; `IngestNoToken → IngestReady` on a
/// validated token; `IngestReady → IngestNoToken` on token clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaState {
    Qa,
    IngestNoToken,
    IngestReady,
}

impl PersonaState {
    /// The state a persona resolves to given token presence.
    pub fn resolve(persona: Persona, has_token: bool) -> Self {
        match (persona, has_token) {
            (Persona::Qa, _) => Self::Qa,
            (Persona::Ingest, false) => Self::IngestNoToken,
            (Persona::Ingest, true) => Self::IngestReady,
        }
    }

    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: PersonaState) -> bool {
        use PersonaState::*;
        matches!(
            (self, target),
            (Qa, IngestNoToken)
                | (Qa, IngestReady)
                | (IngestNoToken, Qa)
                | (IngestReady, Qa)
                | (IngestNoToken, IngestReady)
                | (IngestReady, IngestNoToken)
        )
    }

    /// Whether text typed into the input box is a token candidate.
    pub fn expects_token(&self) -> bool {
        matches!(self, Self::IngestNoToken)
    }
}

impl std::fmt::Display for PersonaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Qa => "qa",
            Self::IngestNoToken => "ingest_no_token",
            Self::IngestReady => "ingest_ready",
        };
        write!(f, "{s}")
    }
}
