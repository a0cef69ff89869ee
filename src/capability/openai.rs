//! OpenAI-compatible capability clients.
//!
//! Both clients speak the de-facto standard API shape (`/chat/completions`
//! with image content parts for captioning, `/embeddings` for vectors), so
//! they work against OpenAI, Azure OpenAI, and self-hosted gateways alike —
//! the base URL is a constructor argument, never hard-coded.
//!
//! Retry is **not** handled here. The clients only classify failures into
//! [`CapabilityError`]; backoff policy belongs to the pipeline stages so it
//! is applied uniformly across providers.

use super::{CapabilityError, TextEmbedder, VisionCaptioner};
use crate::error::IndexError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

fn build_client(api_key: &str, timeout: Duration) -> Result<Client, IndexError> {
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth)
            .map_err(|_| IndexError::InvalidConfig("API key contains invalid characters".into()))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| IndexError::Internal(format!("failed to build HTTP client: {e}")))
}

fn classify_send_error(err: reqwest::Error) -> CapabilityError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        CapabilityError::Transient(err.to_string())
    } else {
        CapabilityError::Permanent(err.to_string())
    }
}

async fn classify_status(response: Response) -> Result<Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(CapabilityError::RateLimited { retry_after_secs });
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    if status.is_server_error() {
        Err(CapabilityError::Transient(format!("{status}: {body}")))
    } else {
        Err(CapabilityError::Permanent(format!("{status}: {body}")))
    }
}

// ── Captioning ───────────────────────────────────────────────────────────

/// Vision-captioning client for OpenAI-compatible chat endpoints.
///
/// Sends the image as a base64 data-URI content part alongside the caption
/// prompt and returns the assistant's text.
pub struct OpenAiCaptioner {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: usize,
}

impl OpenAiCaptioner {
    pub fn new(
        api_key: impl AsRef<str>,
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(IndexError::InvalidConfig("caption model must be set".into()));
        }
        Ok(Self {
            client: build_client(api_key.as_ref(), timeout)?,
            endpoint: format!(
                "{}/chat/completions",
                base_url.as_ref().trim_end_matches('/')
            ),
            model,
            max_tokens: 512,
        })
    }
}

#[derive(Serialize)]
struct CaptionRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    messages: Vec<CaptionMessage<'a>>,
}

#[derive(Serialize)]
struct CaptionMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct CaptionResponse {
    choices: Vec<CaptionChoice>,
}

#[derive(Deserialize)]
struct CaptionChoice {
    message: CaptionContent,
}

#[derive(Deserialize)]
struct CaptionContent {
    content: Option<String>,
}

#[async_trait]
impl VisionCaptioner for OpenAiCaptioner {
    async fn caption(
        &self,
        payload: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, CapabilityError> {
        let data_uri = format!("data:{};base64,{}", mime_type, STANDARD.encode(payload));
        let request = CaptionRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![CaptionMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_uri },
                    },
                ],
            }],
        };

        debug!(model = %self.model, bytes = payload.len(), "requesting caption");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;
        let response = classify_status(response).await?;

        let parsed: CaptionResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Permanent(format!("invalid caption response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| CapabilityError::Permanent("caption response had no content".into()))
    }
}

// ── Embedding ────────────────────────────────────────────────────────────

/// Embedding client for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl AsRef<str>,
        base_url: impl AsRef<str>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(IndexError::InvalidConfig(
                "embedding model must be set".into(),
            ));
        }
        Ok(Self {
            client: build_client(api_key.as_ref(), timeout)?,
            endpoint: format!("{}/embeddings", base_url.as_ref().trim_end_matches('/')),
            model,
            dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
            dimensions: self.dimensions,
        };

        debug!(model = %self.model, chars = text.len(), "requesting embedding");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_send_error)?;
        let response = classify_status(response).await?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Permanent(format!("invalid embedding response: {e}")))?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| CapabilityError::Permanent("embedding response had no data".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn embedder_parses_vector() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
                }));
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("key", server.base_url(), "test-embed", None, TIMEOUT).unwrap();
        let vector = embedder.embed("hello").await.unwrap();

        mock.assert_async().await;
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embedder_classifies_rate_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(429).header("retry-after", "7");
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("key", server.base_url(), "test-embed", None, TIMEOUT).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::RateLimited {
                retry_after_secs: Some(7)
            }
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn embedder_classifies_client_error_as_permanent() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(400).body("bad input");
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("key", server.base_url(), "test-embed", None, TIMEOUT).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, CapabilityError::Permanent(_)));
    }

    #[tokio::test]
    async fn embedder_classifies_server_error_as_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(503).body("overloaded");
            })
            .await;

        let embedder =
            OpenAiEmbedder::new("key", server.base_url(), "test-embed", None, TIMEOUT).unwrap();
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, CapabilityError::Transient(_)));
    }

    #[tokio::test]
    async fn captioner_sends_data_uri_and_parses_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .body_contains("data:image/png;base64,");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"content": "a bar chart"}}]
                }));
            })
            .await;

        let captioner =
            OpenAiCaptioner::new("key", server.base_url(), "test-vision", TIMEOUT).unwrap();
        let caption = captioner
            .caption(b"\x89PNG fake", "image/png", "Describe this image.")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(caption, "a bar chart");
    }

    #[tokio::test]
    async fn captioner_rejects_empty_content() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{"message": {"content": ""}}]
                }));
            })
            .await;

        let captioner =
            OpenAiCaptioner::new("key", server.base_url(), "test-vision", TIMEOUT).unwrap();
        let err = captioner
            .caption(b"img", "image/png", "Describe.")
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Permanent(_)));
    }

    #[test]
    fn empty_model_is_rejected() {
        assert!(OpenAiEmbedder::new("key", "http://x", "  ", None, TIMEOUT).is_err());
        assert!(OpenAiCaptioner::new("key", "http://x", "", TIMEOUT).is_err());
    }
}
