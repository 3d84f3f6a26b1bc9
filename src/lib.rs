//! Persona widget: conversational front end for the Maverick (Q&A) and
//! Goose (ingestion) assistants.

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod forms;
pub mod gateway;
pub mod session;
pub mod storage;
pub mod surface;
pub mod transcript;
pub mod upload;

pub use controller::{Dispatch, PersonaController, WidgetSnapshot};
pub use forms::{ColumnMapping, DynamicForm, FileKind, FileRef, FormSubmission};
pub use session::{Persona, PersonaState};
