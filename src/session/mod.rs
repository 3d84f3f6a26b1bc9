//! Session state: the single mutable value owned by the controller.
//!
//! One `Session` exists per widget instance. The persona and in-flight flags
//! live for the page; the token and the host-integration flags are mirrored
//! into durable storage by the controller.

pub mod model;
pub mod state;

pub use model::{Persona, Session, storage_keys};
pub use state::PersonaState;
