//! Remote scan-service protocol.
//!
//! JSON over HTTP: `POST /scan/init`, `POST /scan/{id}/upload` (multipart),
//! `GET /scan/{id}/status`, `GET /scan/{id}/result`. Every request carries
//! whatever bearer credential the `CredentialSource` currently holds; this
//! module never refreshes credentials.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use crate::error::ApiError;
use crate::types::RemoteStatus;

/// Supplies the current bearer token, if any. Refresh is the auth
/// collaborator's problem; `None` simply sends unauthenticated requests.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token handed in at construction (or none at all).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl CredentialSource for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// `POST /scan/init` response.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCreated {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

/// `POST /scan/{id}/upload` response.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadAck {
    pub status: RemoteStatus,
}

/// `GET /scan/{id}/status` response.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub status: RemoteStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Port to the remote analysis service. The orchestrator and polling engine
/// only ever talk through this, which keeps them runnable against scripted
/// fakes in tests.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    async fn create_session(&self) -> Result<SessionCreated, ApiError>;

    async fn upload_image(
        &self,
        session_id: &str,
        payload: Bytes,
        content_type: &'static str,
    ) -> Result<UploadAck, ApiError>;

    async fn fetch_status(&self, session_id: &str) -> Result<StatusReport, ApiError>;

    /// Raw result payload; shape validation is the normalizer's job.
    async fn fetch_result(&self, session_id: &str) -> Result<serde_json::Value, ApiError>;
}

/// reqwest-backed production client.
pub struct HttpScanClient {
    base_url: String,
    client: Client,
    credentials: Box<dyn CredentialSource>,
}

impl HttpScanClient {
    pub fn new(base_url: impl Into<String>, credentials: Box<dyn CredentialSource>) -> Self {
        let mut base_url = base_url.into();
        while base_url.len() > 1 && base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: Client::new(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn expect_json<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, ApiError> {
        let response = check_status(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Body(e.to_string()))
    }
}

#[async_trait]
impl ScanBackend for HttpScanClient {
    async fn create_session(&self) -> Result<SessionCreated, ApiError> {
        let response = self
            .authorize(self.client.post(self.url("/scan/init")))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn upload_image(
        &self,
        session_id: &str,
        payload: Bytes,
        content_type: &'static str,
    ) -> Result<UploadAck, ApiError> {
        let extension = if content_type == "image/png" { "png" } else { "jpg" };
        let part = reqwest::multipart::Part::stream(reqwest::Body::from(payload))
            .file_name(format!("capture.{}", extension))
            .mime_str(content_type)
            .map_err(|e| ApiError::Body(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .authorize(
                self.client
                    .post(self.url(&format!("/scan/{}/upload", session_id))),
            )
            .multipart(form)
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn fetch_status(&self, session_id: &str) -> Result<StatusReport, ApiError> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("/scan/{}/status", session_id))),
            )
            .send()
            .await?;
        Self::expect_json(response).await
    }

    async fn fetch_result(&self, session_id: &str) -> Result<serde_json::Value, ApiError> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("/scan/{}/result", session_id))),
            )
            .send()
            .await?;
        Self::expect_json(response).await
    }
}

/// Converts a non-2xx response into the uniform error shape: HTTP status,
/// human-readable detail, timestamp.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);

    let body = response.text().await.unwrap_or_default();
    let detail = if is_json {
        extract_json_detail(&body).unwrap_or(body)
    } else {
        body
    };

    Err(ApiError::Status {
        status: status.as_u16(),
        detail: if detail.is_empty() {
            default_detail(status)
        } else {
            detail
        },
        timestamp: Utc::now(),
    })
}

/// Pulls a displayable message out of a JSON error body. FastAPI-style
/// bodies carry `{"detail": ...}`; anything else is compacted verbatim.
fn extract_json_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match &value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => match map.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

fn default_detail(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fastapi_detail_field() {
        assert_eq!(
            extract_json_detail(r#"{"detail": "Scan not found"}"#).as_deref(),
            Some("Scan not found")
        );
    }

    #[test]
    fn extracts_bare_string_body() {
        assert_eq!(
            extract_json_detail(r#""rate limited""#).as_deref(),
            Some("rate limited")
        );
    }

    #[test]
    fn compacts_structured_bodies() {
        let detail = extract_json_detail(r#"{"errors": [1, 2]}"#).unwrap();
        assert!(detail.contains("errors"));
    }

    #[test]
    fn status_report_accepts_minimal_payload() {
        let report: StatusReport = serde_json::from_str(r#"{"status": "processing"}"#).unwrap();
        assert_eq!(report.status, RemoteStatus::Processing);
        assert!(report.message.is_none());
        assert!(report.progress.is_none());
    }

    #[test]
    fn status_report_keeps_message_and_progress() {
        let report: StatusReport =
            serde_json::from_str(r#"{"status": "failed", "message": "low quality", "progress": 0.4}"#)
                .unwrap();
        assert_eq!(report.status, RemoteStatus::Failed);
        assert_eq!(report.message.as_deref(), Some("low quality"));
    }

    #[test]
    fn session_created_accepts_both_casings() {
        let snake: SessionCreated =
            serde_json::from_str(r#"{"session_id": "abc"}"#).unwrap();
        let camel: SessionCreated = serde_json::from_str(r#"{"sessionId": "abc"}"#).unwrap();
        assert_eq!(snake.session_id, camel.session_id);
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = HttpScanClient::new(
            "https://api.example.com/",
            Box::new(StaticCredentials::default()),
        );
        assert_eq!(client.url("/scan/init"), "https://api.example.com/scan/init");
    }
}
