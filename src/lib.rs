//! Chat Store — conversation persistence for a chatbot on a hosted table service.

pub mod config;
pub mod error;
pub mod store;

pub use config::StoreConfig;
pub use error::{ConfigError, Error, ErrorKind, Result, StoreError};
pub use store::{ConversationStore, MemoryBackend, RestBackend, TableBackend};
