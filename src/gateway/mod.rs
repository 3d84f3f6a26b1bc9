//! Transport to the remote service.
//!
//! `RequestGateway` is the contract the core depends on; `HttpGateway` is the
//! reqwest implementation. Every call resolves to its typed payload or a
//! [`ServiceError`].

pub mod http;
pub mod types;

pub use http::HttpGateway;
pub use types::{ChatAction, ChatReply, ImportSummary, ScanResult, Settings, UploadReply, endpoints};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::ServiceError;
use crate::forms::{ColumnMapping, FileRef};
use crate::session::Persona;

/// Remote calls consumed by the widget.
#[async_trait]
pub trait RequestGateway: Send + Sync {
    /// `/chat`: ask the active persona.
    async fn chat(&self, message: &str, persona: Persona) -> Result<ChatReply, ServiceError>;

    /// `/validate-token`: Ok when the service accepts the token.
    async fn validate_token(&self, token: &SecretString) -> Result<(), ServiceError>;

    /// `/upload`: OCR preview without importing.
    async fn upload(&self, file: &FileRef) -> Result<UploadReply, ServiceError>;

    /// `/suggest-mapping`: column mapping proposal for a spreadsheet.
    async fn suggest_mapping(&self, file: &FileRef) -> Result<ColumnMapping, ServiceError>;

    /// `/bulk-import`: import every row of a spreadsheet.
    async fn bulk_import(
        &self,
        file: &FileRef,
        token: &SecretString,
        mapping: &ColumnMapping,
    ) -> Result<ImportSummary, ServiceError>;

    /// `/upload-business-card`: scan a card into a contact.
    async fn upload_business_card(
        &self,
        file: &FileRef,
        token: &SecretString,
        notes: &str,
    ) -> Result<ScanResult, ServiceError>;

    /// `/settings-data`: bearer-authorized settings read.
    async fn settings_data(&self, token: &SecretString) -> Result<Settings, ServiceError>;

    /// `/save-settings`: bearer-authorized settings write; returns the status text.
    async fn save_settings(
        &self,
        token: &SecretString,
        settings: &Settings,
    ) -> Result<String, ServiceError>;
}
