//! Conversation transcript: append-only log of rendered turns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::session::Persona;
use crate::surface::Surface;

/// Who a turn is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "persona", rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant(Persona),
    System,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "You"),
            Self::Assistant(persona) => write!(f, "{}", persona.name()),
            Self::System => write!(f, "System"),
        }
    }
}

/// One rendered message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    /// Assistant replies come from the service as markup; everything else is plain text.
    pub rendered_as_html: bool,
    pub is_error: bool,
    pub at: DateTime<Utc>,
}

impl Turn {
    fn new(speaker: Speaker, text: impl Into<String>, rendered_as_html: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text: text.into(),
            rendered_as_html,
            is_error: false,
            at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text, false)
    }

    pub fn assistant(persona: Persona, text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant(persona), text, true)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Speaker::System, text, false)
    }

    /// A failure reported to the user as part of the conversation.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(Speaker::System, text, false)
        }
    }
}

/// Ordered, append-only list of turns.
///
/// Every append is rendered and followed by a scroll to the newest turn.
pub struct MessageLog {
    turns: Vec<Turn>,
    surface: Arc<dyn Surface>,
}

impl MessageLog {
    pub fn new(surface: Arc<dyn Surface>) -> Self {
        Self {
            turns: Vec::new(),
            surface,
        }
    }

    /// Append a turn, render it, and keep it in view.
    pub fn append(&mut self, turn: Turn) -> &Turn {
        tracing::debug!(
            speaker = %turn.speaker,
            error = turn.is_error,
            chars = turn.text.len(),
            "Turn appended"
        );
        self.surface.render_turn(&turn);
        self.surface.scroll_to_latest();
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}
