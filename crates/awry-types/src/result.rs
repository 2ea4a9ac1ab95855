//! Result history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of tabular data: column name to scalar value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// One immutable record of a completed backend interaction.
///
/// Entries are appended to the session history by the orchestrator and
/// never mutated afterwards. A populated `err`/`msg` pair marks a soft
/// failure the backend reported inside a successful response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Original natural-language input; empty for direct queries.
    #[serde(default)]
    pub question: String,
    /// The statement involved, user-supplied or backend-generated.
    #[serde(default)]
    pub sql: String,
    /// Returned rows, when the command produced tabular data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    /// Backend-reported error tag, present only on soft failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// Diagnostic message accompanying `err`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// When the entry was appended. Not part of the wire format; the
    /// orchestrator stamps it at append time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ResultEntry {
    /// Whether the backend reported a soft failure in this entry.
    pub fn is_soft_error(&self) -> bool {
        self.err.is_some() || self.msg.is_some()
    }

    /// Number of returned rows, 0 when no tabular data came back.
    pub fn row_count(&self) -> usize {
        self.data.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_payload_without_timestamp() {
        let raw = r#"{
            "question": "how many customers?",
            "sql": "select count(*) from customers;",
            "data": [{"count": 42}]
        }"#;
        let entry: ResultEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.question, "how many customers?");
        assert_eq!(entry.row_count(), 1);
        assert!(!entry.is_soft_error());
    }

    #[test]
    fn soft_error_fields_round_trip() {
        let raw = r#"{"sql": "select * from missing;", "err": "QueryError", "msg": "table not found"}"#;
        let entry: ResultEntry = serde_json::from_str(raw).unwrap();
        assert!(entry.is_soft_error());
        assert_eq!(entry.err.as_deref(), Some("QueryError"));
        assert_eq!(entry.question, "");
        assert_eq!(entry.row_count(), 0);
    }
}
