use std::sync::Arc;

use rateprof_core::prompt::SYSTEM_PROMPT;
use rateprof_core::{
    CompletionBackend, EmbeddingBackend, HttpEmbeddingClient, OpenAiCompletionClient,
    PineconeIndex, RagConfig, RagError, VectorIndex,
};

/// Process-wide, read-only handles shared by every request.
pub struct AppState {
    pub config: RagConfig,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub index: Arc<dyn VectorIndex>,
    pub completion: Arc<dyn CompletionBackend>,
    pub system_prompt: String,
}

impl AppState {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<dyn VectorIndex>,
        completion: Arc<dyn CompletionBackend>,
    ) -> Self {
        let system_prompt = config
            .completion
            .system_prompt
            .clone()
            .unwrap_or_else(|| SYSTEM_PROMPT.to_string());
        Self {
            config,
            embedder,
            index,
            completion,
            system_prompt,
        }
    }

    /// Build the HTTP clients for all three upstream services.
    pub fn from_config(config: RagConfig) -> Result<Self, RagError> {
        let embedder = HttpEmbeddingClient::new(&config.embedding, &config.retry)?;
        let index = PineconeIndex::new(&config.vector_index, &config.retry)?;
        let completion = OpenAiCompletionClient::new(&config.completion)?;

        Ok(Self::new(
            config,
            Arc::new(embedder),
            Arc::new(index),
            Arc::new(completion),
        ))
    }
}
