//! Google Translate `translate_a/single` client.
//! One GET per call; no retry and no request timeout. Callers cancel.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::{TranslateError, Translator};

pub const DEFAULT_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";
pub const DEFAULT_CLIENT_ID: &str = "gtx";

pub struct GoogleTranslateClient {
    http: reqwest::Client,
    endpoint: String,
    client_id: String,
}

impl GoogleTranslateClient {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TranslateError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
        })
    }

    async fn request(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Option<String>, TranslateError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("client", self.client_id.as_str()),
                ("sl", source_lang),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| TranslateError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::Network(format!("unexpected status {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TranslateError::Network(e.to_string()))?;
        debug!(bytes = body.len(), "translate response received");
        parse_response(&body)
    }
}

impl Translator for GoogleTranslateClient {
    fn translate<'a>(
        &'a self,
        text: &'a str,
        source_lang: &'a str,
        target_lang: &'a str,
    ) -> BoxFuture<'a, Result<Option<String>, TranslateError>> {
        Box::pin(self.request(text, source_lang, target_lang))
    }
}

/// Extract `response[0][0][0]`.
/// Format: `[[["translated", "source", null, null, 10]], null, "zh-TW", ...]`.
/// A missing, null or empty `response[0]` means no translation is available.
pub fn parse_response(body: &str) -> Result<Option<String>, TranslateError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| TranslateError::MalformedResponse(format!("JSON parse error: {e}")))?;

    let top = json.as_array().ok_or_else(|| {
        TranslateError::MalformedResponse("top-level value is not an array".into())
    })?;

    let segments = match top.first() {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(segments)) if segments.is_empty() => return Ok(None),
        Some(Value::Array(segments)) => segments,
        Some(other) => {
            return Err(TranslateError::MalformedResponse(format!(
                "expected segment array, found {other}"
            )))
        }
    };

    segments
        .first()
        .and_then(|segment| segment.get(0))
        .and_then(Value::as_str)
        .map(|text| Some(text.to_string()))
        .ok_or_else(|| {
            TranslateError::MalformedResponse("first segment carries no translated text".into())
        })
}
