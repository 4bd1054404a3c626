pub mod message;
pub mod retrieval;

pub use message::{ChatMessage, Conversation, Role};
pub use retrieval::{ProfessorMetadata, RetrievalMatch};
