//! Error types for awry.

use crate::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwryError {
    #[error("No active connection: connect to a database before any query operation")]
    NoConnection,

    #[error("No model configured: the active profile has no model path")]
    NoModel,

    #[error("Only SELECT statements may be executed directly")]
    NotReadOnly,

    #[error("A request is already in flight")]
    RequestInFlight,

    #[error("Missing required profile field: {0}")]
    MissingField(&'static str),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
