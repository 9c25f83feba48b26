//! OpenAI-compatible embedding client.
//!
//! Wraps the `async-openai` embeddings endpoint with a per-call timeout,
//! bounded retries with exponential backoff for transient failures, and a
//! dimension check against the configured contract. API-reported errors
//! (authentication, quota, bad request) are never retried.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{CreateEmbeddingRequest, EmbeddingInput};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::embedding::Embedder;
use crate::error::ServerError;

/// Base delay for the exponential backoff between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(200);

/// Embedding client for any OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
    timeout: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedder {
    /// Creates an embedder from the embedding configuration.
    #[must_use]
    pub fn new(config: &EmbeddingConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            dimension: config.dimension,
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    /// One request/response cycle against the service, without retry policy.
    async fn embed_once(&self, text: &str) -> Result<Vec<f32>, EmbedAttemptError> {
        let request = CreateEmbeddingRequest {
            model: self.model.clone(),
            input: EmbeddingInput::String(text.to_string()),
            encoding_format: None,
            user: None,
            dimensions: None,
        };

        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| EmbedAttemptError::Transient(format!(
                "embedding request timed out after {}ms",
                self.timeout.as_millis()
            )))?
            .map_err(classify_api_error)?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                EmbedAttemptError::Fatal(ServerError::EmbeddingService {
                    message: "service returned no embedding".to_string(),
                })
            })?;

        if vector.len() != self.dimension {
            return Err(EmbedAttemptError::Fatal(ServerError::EmbeddingContract {
                expected: self.dimension,
                actual: vector.len(),
            }));
        }

        Ok(vector)
    }
}

/// Per-attempt outcome: transient failures may be retried, fatal ones not.
enum EmbedAttemptError {
    Transient(String),
    Fatal(ServerError),
}

/// Network-level failures are transient; anything the API itself reported
/// (invalid key, quota, malformed request) is not.
fn classify_api_error(err: OpenAIError) -> EmbedAttemptError {
    match err {
        OpenAIError::Reqwest(e) => EmbedAttemptError::Transient(e.to_string()),
        other => EmbedAttemptError::Fatal(ServerError::EmbeddingService {
            message: other.to_string(),
        }),
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServerError> {
        let mut last_transient = String::new();

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = BACKOFF_BASE * 2_u32.saturating_pow(attempt - 1);
                tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying embedding call");
                tokio::time::sleep(backoff).await;
            }

            match self.embed_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(EmbedAttemptError::Fatal(e)) => return Err(e),
                Err(EmbedAttemptError::Transient(message)) => {
                    tracing::warn!(attempt, error = %message, "transient embedding failure");
                    last_transient = message;
                }
            }
        }

        Err(ServerError::EmbeddingService {
            message: format!(
                "giving up after {} attempts: {last_transient}",
                self.max_retries + 1
            ),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_is_fatal() {
        let err = classify_api_error(OpenAIError::InvalidArgument("bad input".to_string()));
        assert!(matches!(err, EmbedAttemptError::Fatal(_)));
    }

    #[test]
    fn test_fatal_carries_embedding_service_kind() {
        let err = classify_api_error(OpenAIError::InvalidArgument("quota exceeded".to_string()));
        if let EmbedAttemptError::Fatal(e) = err {
            assert_eq!(e.kind(), "embedding_service_error");
        } else {
            unreachable!("expected fatal classification");
        }
    }

    #[test]
    fn test_embedder_reports_configured_dimension() {
        let config = EmbeddingConfig {
            api_key: "k".to_string(),
            base_url: None,
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        };
        let embedder = OpenAiEmbedder::new(&config);
        assert_eq!(embedder.dimension(), 1536);
    }
}
