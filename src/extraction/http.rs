//! HTTP client for the extraction service.
//!
//! `POST {base_url}/{kind}/predict` with `{"document": "<url>"}` and a
//! `Token` authorization header. The response carries predictions under
//! `document.inference.prediction`, each either `{"value": ...}` or
//! `{"values": [{"content": ...}, ...]}`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::error::ExtractionError;
use crate::session::{DocumentFields, DocumentKind};

use super::{DocumentExtractor, normalize_fields};

/// Extraction service reached over HTTP.
pub struct HttpExtractor {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl HttpExtractor {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, kind: DocumentKind) -> String {
        format!("{}/{}/predict", self.base_url, kind.as_str())
    }
}

#[async_trait]
impl DocumentExtractor for HttpExtractor {
    async fn extract(
        &self,
        file_url: &str,
        kind: DocumentKind,
    ) -> Result<DocumentFields, ExtractionError> {
        tracing::debug!(kind = %kind, "Calling extraction service");

        let resp = self
            .client
            .post(self.endpoint(kind))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", self.api_key.expose_secret()),
            )
            .json(&serde_json::json!({ "document": file_url }))
            .send()
            .await
            .map_err(|e| ExtractionError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        parse_prediction(kind, &data)
    }
}

/// Pull fields out of an extraction response body.
fn parse_prediction(kind: DocumentKind, data: &Value) -> Result<DocumentFields, ExtractionError> {
    let prediction = data
        .pointer("/document/inference/prediction")
        .and_then(Value::as_object)
        .ok_or_else(|| ExtractionError::Malformed("missing document.inference.prediction".into()))?;

    let raw = prediction
        .iter()
        .filter_map(|(name, field)| field_text(field).map(|text| (name.as_str(), text)));

    normalize_fields(kind, raw)
}

fn field_text(field: &Value) -> Option<String> {
    if let Some(value) = field.get("value") {
        return scalar_text(value);
    }
    let values = field.get("values")?.as_array()?;
    let parts: Vec<String> = values
        .iter()
        .filter_map(|v| v.get("content").and_then(scalar_text))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
