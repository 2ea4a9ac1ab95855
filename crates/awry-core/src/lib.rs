//! Profile store and query orchestration for the awry query tool.

mod backend;
mod config_store;
mod error;
mod orchestrator;
mod storage;

pub use backend::{BackendError, CommandBackend, QueryBackend};
pub use config_store::{ConfigStore, StoreEvent};
pub use error::AwryError;
pub use orchestrator::{OrchestratorEvent, QueryOrchestrator};
pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage};

/// Result type for awry operations.
pub type Result<T> = std::result::Result<T, AwryError>;
