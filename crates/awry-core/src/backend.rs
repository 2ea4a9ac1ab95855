//! Backend port and the external-command implementation.

use async_trait::async_trait;
use awry_types::{CommandRequest, Profile, ResultEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Failure of a backend command invocation.
///
/// Variants keep the backend's own fields structured; the flat
/// "key : value" rendering the user sees comes from [`diagnostic`]
/// and is produced only at presentation edges.
///
/// [`diagnostic`]: BackendError::diagnostic
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendError {
    /// The request envelope could not be encoded.
    #[error("backend request could not be encoded: {0}")]
    Encode(String),

    /// The backend process could not be started.
    #[error("backend could not be started: {0}")]
    Spawn(String),

    /// The process failed without a structured report.
    #[error("backend exited with status {status}")]
    Exit { status: i32, stderr: String },

    /// The backend reported a structured failure.
    #[error("{}", flatten(.fields))]
    Reported { fields: BTreeMap<String, String> },

    /// The response did not parse as the expected shape. Treated the
    /// same as a transport failure: no history entry is created.
    #[error("malformed backend response: {reason}")]
    MalformedResponse { raw: String, reason: String },
}

impl BackendError {
    /// Flatten to the user-facing `"key : value, key : value"` form.
    pub fn diagnostic(&self) -> String {
        match self {
            BackendError::Reported { fields } => flatten(fields),
            other => flatten(&other.as_fields()),
        }
    }

    fn as_fields(&self) -> BTreeMap<String, String> {
        let (err, msg) = match self {
            BackendError::Encode(msg) => ("Encode", msg.clone()),
            BackendError::Spawn(msg) => ("Spawn", msg.clone()),
            BackendError::Exit { status, stderr } => {
                let msg = if stderr.is_empty() {
                    format!("exit status {status}")
                } else {
                    stderr.clone()
                };
                ("Exit", msg)
            }
            BackendError::MalformedResponse { reason, .. } => {
                ("MalformedResponse", reason.clone())
            }
            BackendError::Reported { fields } => return fields.clone(),
        };
        BTreeMap::from([("err".to_string(), err.to_string()), ("msg".to_string(), msg)])
    }
}

fn flatten(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{} : {}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Port to the external query/inference backend.
///
/// One round trip per call, no streaming, no cancellation. Every call
/// carries the full profile; the backend holds no profile state of its
/// own between invocations. Timeouts are the backend's responsibility.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Establish a connection for the profile; returns an opaque
    /// acknowledgement string.
    async fn connect(&self, profile: &Profile) -> std::result::Result<String, BackendError>;

    /// Natural-language question to tabular result.
    async fn ask(
        &self,
        profile: &Profile,
        question: &str,
    ) -> std::result::Result<ResultEntry, BackendError>;

    /// Natural-language question to a generated statement. Does not
    /// execute the statement.
    async fn ask_for_sql(
        &self,
        profile: &Profile,
        question: &str,
    ) -> std::result::Result<ResultEntry, BackendError>;

    /// Execute the statement directly.
    async fn query(
        &self,
        profile: &Profile,
        sql: &str,
    ) -> std::result::Result<ResultEntry, BackendError>;
}

/// Backend reached by invoking an external executable once per request.
///
/// The command name is passed as the single argument and the JSON
/// request envelope on stdin; the response is read from stdout. A
/// nonzero exit with a JSON `{err, msg}` body is a structured report;
/// any other nonzero exit is a plain failure.
pub struct CommandBackend {
    program: PathBuf,
}

impl CommandBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn invoke(&self, request: &CommandRequest) -> std::result::Result<String, BackendError> {
        let payload =
            serde_json::to_string(request).map_err(|e| BackendError::Encode(e.to_string()))?;

        debug!(target: "awry::backend", "Invoking {} {}", self.program.display(), request.name());

        let mut child = Command::new(&self.program)
            .arg(request.name())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::Spawn(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A backend that fails before reading its input closes the
            // pipe; the exit status carries the real outcome, so a write
            // error here is not itself a failure. Dropping stdin closes
            // it so the backend sees EOF.
            let _ = stdin.write_all(payload.as_bytes()).await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BackendError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            for raw in [stdout.as_str(), stderr.as_str()] {
                if let Ok(fields) = serde_json::from_str::<BTreeMap<String, String>>(raw) {
                    if !fields.is_empty() {
                        return Err(BackendError::Reported { fields });
                    }
                }
            }
            return Err(BackendError::Exit {
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(stdout)
    }

    fn parse_entry(raw: &str) -> std::result::Result<ResultEntry, BackendError> {
        serde_json::from_str(raw).map_err(|e| BackendError::MalformedResponse {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl QueryBackend for CommandBackend {
    async fn connect(&self, profile: &Profile) -> std::result::Result<String, BackendError> {
        let request = CommandRequest::Connect {
            profile: profile.clone(),
        };
        self.invoke(&request).await
    }

    async fn ask(
        &self,
        profile: &Profile,
        question: &str,
    ) -> std::result::Result<ResultEntry, BackendError> {
        let request = CommandRequest::Ask {
            profile: profile.clone(),
            question: question.to_string(),
        };
        let raw = self.invoke(&request).await?;
        Self::parse_entry(&raw)
    }

    async fn ask_for_sql(
        &self,
        profile: &Profile,
        question: &str,
    ) -> std::result::Result<ResultEntry, BackendError> {
        let request = CommandRequest::AskForSql {
            profile: profile.clone(),
            question: question.to_string(),
        };
        let raw = self.invoke(&request).await?;
        Self::parse_entry(&raw)
    }

    async fn query(
        &self,
        profile: &Profile,
        sql: &str,
    ) -> std::result::Result<ResultEntry, BackendError> {
        let request = CommandRequest::Query {
            profile: profile.clone(),
            sql: sql.to_string(),
        };
        let raw = self.invoke(&request).await?;
        Self::parse_entry(&raw)
    }
}
