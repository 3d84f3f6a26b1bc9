//! Persona and session data models.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::forms::FileRef;

use super::state::PersonaState;

/// The active assistant identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persona {
    /// Maverick, the question-and-answer assistant.
    #[serde(rename = "maverick")]
    Qa,
    /// Goose, the document and contact ingestion assistant.
    #[serde(rename = "goose")]
    Ingest,
}

impl Default for Persona {
    fn default() -> Self {
        Self::Qa
    }
}

impl Persona {
    /// Display name used as the speaker label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Qa => "Maverick",
            Self::Ingest => "Goose",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Qa => "💬",
            Self::Ingest => "🪿",
        }
    }

    /// Welcome turn shown when the persona becomes active.
    pub fn welcome_text(&self) -> &'static str {
        match self {
            Self::Qa => {
                "Hi! I'm Maverick, your chat assistant. Ask me anything about RealNex, \
                 RealBlasts, Featured Property Email Marketing, Training, Webinars, and more!"
            }
            Self::Ingest => {
                "Honk! I'm Goose. Drop a business card (image or PDF) and I'll scan it into \
                 a contact, or drop a spreadsheet and I'll bulk-import it."
            }
        }
    }

    /// Whether file handling may proceed past validation.
    pub fn accepts_files(&self) -> bool {
        matches!(self, Self::Ingest)
    }

    pub fn other(&self) -> Persona {
        match self {
            Self::Qa => Self::Ingest,
            Self::Ingest => Self::Qa,
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Qa => "maverick",
            Self::Ingest => "goose",
        };
        write!(f, "{s}")
    }
}

/// The per-widget session.
#[derive(Debug, Default)]
pub struct Session {
    pub persona: Persona,
    pub token: Option<SecretString>,
    pub has_prompted_for_host_integration: bool,
    pub declined_host_integration: bool,
    /// File waiting for its confirm form to be submitted.
    pub pending_file: Option<FileRef>,
    /// A chat message or token candidate is in flight.
    pub sending: bool,
    /// An upload-category call is in flight.
    pub uploading: bool,
    /// Host-integration question is on screen and unanswered.
    pub host_prompt_pending: bool,
    /// Bumped on persona switch and token set/clear; guards stale responses.
    pub epoch: u64,
}

impl Session {
    /// Derived state-machine position.
    pub fn state(&self) -> PersonaState {
        PersonaState::resolve(self.persona, self.token.is_some())
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Whether the one-shot host-integration prompt may still be shown.
    pub fn host_prompt_due(&self) -> bool {
        !self.has_prompted_for_host_integration && !self.declined_host_integration
    }

    /// Start a new epoch, invalidating every outstanding call.
    pub fn bump_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }
}

/// Keys used for durable client-side persistence.
pub mod storage_keys {
    /// The access token string.
    pub const TOKEN: &str = "widget_token";
    /// Set once the host-integration prompt has been answered.
    pub const HOST_PROMPTED: &str = "host_integration_prompted";
    /// Set when the user said no to host integration.
    pub const HOST_DECLINED: &str = "host_integration_declined";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_serde_uses_assistant_names() {
        assert_eq!(serde_json::to_string(&Persona::Qa).unwrap(), "\"maverick\"");
        assert_eq!(serde_json::to_string(&Persona::Ingest).unwrap(), "\"goose\"");
        let parsed: Persona = serde_json::from_str("\"goose\"").unwrap();
        assert_eq!(parsed, Persona::Ingest);
    }

    #[test]
    fn display_matches_serde() {
        for persona in [Persona::Qa, Persona::Ingest] {
            let json = serde_json::to_string(&persona).unwrap();
            assert_eq!(format!("\"{persona}\""), json);
        }
    }

    #[test]
    fn only_ingest_accepts_files() {
        assert!(Persona::Ingest.accepts_files());
        assert!(!Persona::Qa.accepts_files());
    }

    #[test]
    fn default_session() {
        let session = Session::default();
        assert_eq!(session.persona, Persona::Qa);
        assert!(!session.has_token());
        assert!(session.host_prompt_due());
        assert!(!session.sending);
        assert_eq!(session.epoch, 0);
        assert_eq!(session.state(), PersonaState::Qa);
    }

    #[test]
    fn declining_suppresses_host_prompt() {
        let session = Session {
            declined_host_integration: true,
            ..Default::default()
        };
        assert!(!session.host_prompt_due());
    }

    #[test]
    fn session_state_follows_token() {
        let mut session = Session {
            persona: Persona::Ingest,
            ..Default::default()
        };
        assert_eq!(session.state(), PersonaState::IngestNoToken);
        session.token = Some(SecretString::from("abc".to_string()));
        assert_eq!(session.state(), PersonaState::IngestReady);
    }

    #[test]
    fn bump_epoch_is_monotonic() {
        let mut session = Session::default();
        assert_eq!(session.bump_epoch(), 1);
        assert_eq!(session.bump_epoch(), 2);
    }
}
