pub mod completion;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod prompt;
pub mod retry;
pub mod sse;
pub mod vector_index;

pub use completion::{CompletionBackend, CompletionError, CompletionStream, OpenAiCompletionClient};
pub use config::RagConfig;
pub use embeddings::{EmbeddingBackend, EmbeddingError, HttpEmbeddingClient};
pub use error::RagError;
pub use models::{ChatMessage, Conversation, ProfessorMetadata, RetrievalMatch, Role};
pub use vector_index::{PineconeIndex, RetrievalError, VectorIndex, TOP_K};
