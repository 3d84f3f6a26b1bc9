//! reqwest-backed gateway.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::RequestGateway;
use super::types::{
    ChatReply, ChatRequest, ImportSummary, SaveSettingsReply, ScanResult, Settings,
    SuggestMappingReply, UploadReply, ValidateTokenReply, ValidateTokenRequest,
    check_token_reply, decode_body, endpoints,
};
use crate::error::ServiceError;
use crate::forms::{ColumnMapping, FileRef};
use crate::session::Persona;

/// Gateway talking JSON and multipart over HTTP.
///
/// No timeout is applied: a stalled call keeps its control disabled until it
/// settles.
pub struct HttpGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.base_url)
    }

    async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(endpoint)).json(body);
        self.execute(endpoint, request).await
    }

    async fn post_multipart<T>(&self, endpoint: &str, form: Form) -> Result<T, ServiceError>
    where
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(endpoint)).multipart(form);
        self.execute(endpoint, request).await
    }

    async fn execute<T>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ServiceError>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(endpoint, "Sending request");
        let resp = request
            .send()
            .await
            .map_err(|e| ServiceError::transport(endpoint, e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::transport(endpoint, e.to_string()))?;

        let result = decode_body(endpoint, status.as_u16(), &body);
        if let Err(ref e) = result {
            tracing::warn!(endpoint, status = status.as_u16(), error = %e, "Request failed");
        }
        result
    }
}

/// The `file` part shared by every upload endpoint.
fn file_part(endpoint: &str, file: &FileRef) -> Result<Part, ServiceError> {
    Part::bytes(file.bytes.to_vec())
        .file_name(file.name.clone())
        .mime_str(file.content_type())
        .map_err(|e| ServiceError::transport(endpoint, format!("invalid content type: {e}")))
}

#[async_trait]
impl RequestGateway for HttpGateway {
    async fn chat(&self, message: &str, persona: Persona) -> Result<ChatReply, ServiceError> {
        self.post_json(endpoints::CHAT, &ChatRequest { message, persona })
            .await
    }

    async fn validate_token(&self, token: &SecretString) -> Result<(), ServiceError> {
        let reply: ValidateTokenReply = self
            .post_json(
                endpoints::VALIDATE_TOKEN,
                &ValidateTokenRequest {
                    token: token.expose_secret(),
                },
            )
            .await?;
        check_token_reply(reply)
    }

    async fn upload(&self, file: &FileRef) -> Result<UploadReply, ServiceError> {
        let form = Form::new().part("file", file_part(endpoints::UPLOAD, file)?);
        self.post_multipart(endpoints::UPLOAD, form).await
    }

    async fn suggest_mapping(&self, file: &FileRef) -> Result<ColumnMapping, ServiceError> {
        let form = Form::new().part("file", file_part(endpoints::SUGGEST_MAPPING, file)?);
        let reply: SuggestMappingReply =
            self.post_multipart(endpoints::SUGGEST_MAPPING, form).await?;
        Ok(reply.suggested_mapping)
    }

    async fn bulk_import(
        &self,
        file: &FileRef,
        token: &SecretString,
        mapping: &ColumnMapping,
    ) -> Result<ImportSummary, ServiceError> {
        let mapping_json = serde_json::to_string(mapping)
            .map_err(|e| ServiceError::transport(endpoints::BULK_IMPORT, e.to_string()))?;
        let form = Form::new()
            .part("file", file_part(endpoints::BULK_IMPORT, file)?)
            .text("token", token.expose_secret().to_string())
            .text("mapping", mapping_json);
        self.post_multipart(endpoints::BULK_IMPORT, form).await
    }

    async fn upload_business_card(
        &self,
        file: &FileRef,
        token: &SecretString,
        notes: &str,
    ) -> Result<ScanResult, ServiceError> {
        let form = Form::new()
            .part("file", file_part(endpoints::UPLOAD_BUSINESS_CARD, file)?)
            .text("token", token.expose_secret().to_string())
            .text("notes", notes.to_string());
        self.post_multipart(endpoints::UPLOAD_BUSINESS_CARD, form)
            .await
    }

    async fn settings_data(&self, token: &SecretString) -> Result<Settings, ServiceError> {
        let request = self
            .client
            .get(self.url(endpoints::SETTINGS_DATA))
            .bearer_auth(token.expose_secret());
        self.execute(endpoints::SETTINGS_DATA, request).await
    }

    async fn save_settings(
        &self,
        token: &SecretString,
        settings: &Settings,
    ) -> Result<String, ServiceError> {
        let request = self
            .client
            .post(self.url(endpoints::SAVE_SETTINGS))
            .bearer_auth(token.expose_secret())
            .json(settings);
        let reply: SaveSettingsReply = self.execute(endpoints::SAVE_SETTINGS, request).await?;
        Ok(reply.status.unwrap_or_else(|| "saved".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let gateway = HttpGateway::new("http://crm.local/");
        assert_eq!(gateway.url(endpoints::CHAT), "http://crm.local/chat");
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_failure() {
        // Port 9 (discard) on localhost is closed in test environments.
        let gateway = HttpGateway::new("http://127.0.0.1:9");
        let err = gateway.chat("hi", Persona::Qa).await.unwrap_err();
        assert!(matches!(err, ServiceError::Transport { .. }));
    }

    #[test]
    fn file_part_rejects_bad_mime() {
        let file = FileRef::new("card.png", Some("not a mime".into()), vec![0u8]);
        assert!(file_part(endpoints::UPLOAD, &file).is_err());
    }
}
