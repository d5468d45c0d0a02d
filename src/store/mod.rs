//! Persistence layer — chatbot tables behind a swappable backend.

pub mod conversation_store;
pub mod memory_backend;
pub mod models;
pub mod query;
pub mod rest_backend;
pub mod traits;

pub use conversation_store::{ConversationStore, DEFAULT_HISTORY_LIMIT};
pub use memory_backend::MemoryBackend;
pub use models::{ContextRecord, KnowledgeEntry, Message, UserProfile};
pub use query::{Direction, Query, TextSearch};
pub use rest_backend::RestBackend;
pub use traits::{Row, Table, TableBackend};
