//! Wire types for the remote service contract.
//!
//! Each endpoint has one reply struct with one canonical field name. The
//! `error` field is handled once, in [`decode_body`], before any of these are
//! deserialized.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::forms::ColumnMapping;
use crate::session::Persona;

/// Endpoint paths.
pub mod endpoints {
    pub const CHAT: &str = "/chat";
    pub const VALIDATE_TOKEN: &str = "/validate-token";
    pub const UPLOAD: &str = "/upload";
    pub const SUGGEST_MAPPING: &str = "/suggest-mapping";
    pub const BULK_IMPORT: &str = "/bulk-import";
    pub const UPLOAD_BUSINESS_CARD: &str = "/upload-business-card";
    pub const SETTINGS_DATA: &str = "/settings-data";
    pub const SAVE_SETTINGS: &str = "/save-settings";
}

/// Key/value settings exchanged with `/settings-data` and `/save-settings`.
pub type Settings = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub persona: Persona,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateTokenRequest<'a> {
    pub token: &'a str,
}

/// Follow-up the service asks the widget to perform after a chat reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    ShowDashboard,
}

/// `/chat` reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    #[serde(alias = "answer", alias = "message")]
    pub response: String,
    #[serde(default, deserialize_with = "lenient_action")]
    pub action: Option<ChatAction>,
}

/// `/validate-token` reply.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ValidateTokenReply {
    pub valid: bool,
}

/// `/upload` reply: OCR preview of a file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReply {
    pub message: String,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SuggestMappingReply {
    pub suggested_mapping: ColumnMapping,
}

/// `/bulk-import` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ImportSummary {
    pub processed: u64,
}

/// `/upload-business-card` reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub follow_up_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SaveSettingsReply {
    #[serde(default)]
    pub status: Option<String>,
}

/// Unknown actions are ignored rather than failing the whole reply.
fn lenient_action<'de, D>(deserializer: D) -> Result<Option<ChatAction>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

/// Turn a response body into the endpoint's payload.
///
/// - body with a non-empty `error` string → `Rejected`
/// - non-success status without `error` → `Transport`
/// - body that is not JSON or does not match `T` → `Transport`
pub(crate) fn decode_body<T: DeserializeOwned>(
    endpoint: &str,
    status: u16,
    body: &str,
) -> Result<T, ServiceError> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ServiceError::transport(endpoint, format!("HTTP {status}: invalid JSON body ({e})"))
    })?;

    if let Some(reason) = value
        .get("error")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
    {
        return Err(ServiceError::rejected(endpoint, reason));
    }

    if !(200..300).contains(&status) {
        return Err(ServiceError::transport(endpoint, format!("HTTP {status}")));
    }

    serde_json::from_value(value)
        .map_err(|e| ServiceError::transport(endpoint, format!("unexpected reply shape: {e}")))
}

/// `{valid: false}` without an `error` reason still needs a message.
pub(crate) fn check_token_reply(reply: ValidateTokenReply) -> Result<(), ServiceError> {
    if reply.valid {
        Ok(())
    } else {
        Err(ServiceError::rejected(
            endpoints::VALIDATE_TOKEN,
            "The token was not accepted.",
        ))
    }
}
