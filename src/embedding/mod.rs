//! Embedding service seam.
//!
//! The embedding generator is an opaque, injectable collaborator: one call
//! from text to a fixed-length vector. Production uses the
//! OpenAI-compatible client in [`openai`]; tests substitute the stubs in
//! [`crate::testing`].

pub mod openai;

use async_trait::async_trait;

use crate::error::ServerError;

/// Turns text into a fixed-length numeric vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds one text.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::EmbeddingService`] when the service fails
    /// after bounded retries, or [`ServerError::EmbeddingContract`] when the
    /// response dimension does not match the configured one.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServerError>;

    /// The fixed vector dimension this embedder is configured for.
    fn dimension(&self) -> usize;
}

pub use openai::OpenAiEmbedder;
