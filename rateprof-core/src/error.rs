use thiserror::Error;

use crate::completion::CompletionError;
use crate::embeddings::EmbeddingError;
use crate::vector_index::RetrievalError;

/// Failure of one chat request, tagged with the pipeline stage that produced it.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Embedding stage failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Retrieval stage failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Completion stage failed: {0}")]
    Completion(#[from] CompletionError),
}

impl RagError {
    pub fn stage(&self) -> &'static str {
        match self {
            RagError::MalformedInput(_) => "intake",
            RagError::Embedding(_) => "embedding",
            RagError::Retrieval(_) => "retrieval",
            RagError::Completion(_) => "completion",
        }
    }
}
