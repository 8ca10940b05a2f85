//! Embedding provider client.
//!
//! One HTTP implementation covers both vendors; the endpoint enum captures
//! the differences (URL shape and auth header). Batches are split to the
//! configured size and results are re-assembled in input order.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{AppError, Result};
use crate::utils::{EmbeddingConfig, VendorConfig};

/// Delay before the single retry of a transient transport failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Text-to-vector interface.
///
/// Implementations must preserve input order in [`embed_batch`], reject
/// empty or oversized input with `InvalidInput`, and surface vendor
/// failures as `Provider`.
///
/// [`embed_batch`]: EmbeddingClient::embed_batch
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Vector dimensionality produced by this client.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, returning vectors in the same order as the input.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Vendor-specific embeddings endpoint.
#[derive(Debug, Clone)]
enum EmbeddingEndpoint {
    OpenAi {
        url: String,
        api_key: String,
        model: String,
    },
    Azure {
        url: String,
        api_key: String,
    },
}

/// [`EmbeddingClient`] backed by the OpenAI or Azure OpenAI embeddings API.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: EmbeddingEndpoint,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpEmbeddingClient {
    /// Build the client for the configured vendor.
    pub fn from_config(vendor: &VendorConfig, config: EmbeddingConfig) -> Self {
        let endpoint = match vendor {
            VendorConfig::OpenAi {
                api_key, api_base, ..
            } => EmbeddingEndpoint::OpenAi {
                url: format!("{}/embeddings", api_base.trim_end_matches('/')),
                api_key: api_key.clone(),
                model: config.model.clone(),
            },
            VendorConfig::Azure {
                endpoint,
                api_key,
                api_version,
                embedding_deployment,
                ..
            } => EmbeddingEndpoint::Azure {
                url: format!(
                    "{}/openai/deployments/{}/embeddings?api-version={}",
                    endpoint.trim_end_matches('/'),
                    embedding_deployment,
                    api_version
                ),
                api_key: api_key.clone(),
            },
        };

        Self {
            client: reqwest::Client::new(),
            endpoint,
            config,
        }
    }

    /// Build the client against an explicit OpenAI-compatible URL.
    /// Useful for tests pointing at a local mock server.
    pub fn with_url(url: impl Into<String>, api_key: impl Into<String>, config: EmbeddingConfig) -> Self {
        let model = config.model.clone();
        Self {
            client: reqwest::Client::new(),
            endpoint: EmbeddingEndpoint::OpenAi {
                url: url.into(),
                api_key: api_key.into(),
                model,
            },
            config,
        }
    }

    fn validate(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "cannot embed empty or whitespace-only text".into(),
            ));
        }
        if text.len() > self.config.max_input_chars {
            return Err(AppError::InvalidInput(format!(
                "text of {} chars exceeds the {} char embedding limit",
                text.len(),
                self.config.max_input_chars
            )));
        }
        Ok(())
    }

    async fn post_once(&self, input: &[String]) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let request = match &self.endpoint {
            EmbeddingEndpoint::OpenAi {
                url,
                api_key,
                model,
            } => self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(&EmbeddingRequest {
                    model: Some(model),
                    input,
                }),
            EmbeddingEndpoint::Azure { url, api_key } => self
                .client
                .post(url)
                .header("api-key", api_key)
                .json(&EmbeddingRequest { model: None, input }),
        };
        request.send().await
    }

    /// Embed one API-sized sub-batch, retrying a transient transport
    /// failure once before surfacing it.
    async fn embed_chunk(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = match self.post_once(input).await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!(error = %e, "transient embedding transport failure, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.post_once(input)
                    .await
                    .map_err(|e| AppError::Provider(format!("Embedding request failed: {}", e)))?
            }
            Err(e) => {
                return Err(AppError::Provider(format!(
                    "Embedding request failed: {}",
                    e
                )))
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AppError::Provider(format!(
                "Embedding API returned {}: {}",
                status, detail
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse embedding response: {}", e)))?;

        if parsed.data.len() != input.len() {
            return Err(AppError::Provider(format!(
                "Embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                input.len()
            )));
        }

        // The API may reorder items; the index field restores input order.
        parsed.data.sort_by_key(|d| d.index);

        for data in &parsed.data {
            if data.embedding.len() != self.config.dimensions {
                warn!(
                    expected = self.config.dimensions,
                    actual = data.embedding.len(),
                    "embedding dimensionality differs from configuration"
                );
                break;
            }
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Embedding models treat newlines as weak separators; the original
/// service flattens them before sending.
fn clean_text(text: &str) -> String {
    text.replace('\n', " ")
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.validate(text)?;
        let input = vec![clean_text(text)];
        let mut vectors = self.embed_chunk(&input).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::Provider("Embedding API returned no vectors".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            self.validate(text)?;
        }

        debug!(
            batch_size = texts.len(),
            sub_batch = self.config.batch_size,
            "embedding batch"
        );

        let cleaned: Vec<String> = texts.iter().map(|t| clean_text(t)).collect();
        let mut vectors = Vec::with_capacity(cleaned.len());
        for chunk in cleaned.chunks(self.config.batch_size.max(1)) {
            vectors.extend(self.embed_chunk(chunk).await?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dimensions: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            model: "text-embedding-3-small".into(),
            dimensions,
            max_input_chars: 100,
            batch_size: 2,
        }
    }

    fn embedding_body(vectors: &[(usize, Vec<f32>)]) -> serde_json::Value {
        serde_json::json!({
            "data": vectors
                .iter()
                .map(|(index, embedding)| serde_json::json!({
                    "index": index,
                    "embedding": embedding,
                }))
                .collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn test_embed_returns_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(embedding_body(&[(0, vec![0.1, 0.2])])),
            )
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::with_url(
            format!("{}/embeddings", server.uri()),
            "sk-test",
            test_config(2),
        );
        let vector = client.embed("aspirin\nfor pain").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2]);
    }

    #[tokio::test]
    async fn test_batch_restores_input_order() {
        let server = MockServer::start().await;
        // Response deliberately out of order.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(embedding_body(&[
                (1, vec![1.0, 1.0]),
                (0, vec![0.0, 0.0]),
            ])))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::with_url(
            format!("{}/embeddings", server.uri()),
            "sk-test",
            test_config(2),
        );
        let vectors = client
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors[0], vec![0.0, 0.0]);
        assert_eq!(vectors[1], vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_request() {
        let client = HttpEmbeddingClient::with_url("http://127.0.0.1:9", "sk-test", test_config(2));
        let err = client.embed("   ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_oversized_input_rejected() {
        let client = HttpEmbeddingClient::with_url("http://127.0.0.1:9", "sk-test", test_config(2));
        let err = client.embed(&"x".repeat(101)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_api_error_surfaces_as_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "bad key"}
            })))
            .mount(&server)
            .await;

        let client = HttpEmbeddingClient::with_url(
            format!("{}/embeddings", server.uri()),
            "sk-test",
            test_config(2),
        );
        let err = client.embed("aspirin").await.unwrap_err();
        match err {
            AppError::Provider(message) => assert!(message.contains("bad key")),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let client = HttpEmbeddingClient::with_url("http://127.0.0.1:9", "sk-test", test_config(2));
        assert!(client.embed_batch(&[]).await.unwrap().is_empty());
    }
}
