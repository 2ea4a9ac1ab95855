//! Connection profiles and the draft form used for editing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported database kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbType {
    #[serde(rename = "MySQL")]
    MySql,
    #[serde(rename = "PostgreSQL")]
    PostgreSql,
    #[serde(rename = "SQLite")]
    Sqlite,
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DbType::MySql => "MySQL",
            DbType::PostgreSql => "PostgreSQL",
            DbType::Sqlite => "SQLite",
        };
        write!(f, "{}", s)
    }
}

/// A persisted database-connection + model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique within the store. 0 is reserved for "not yet persisted".
    pub id: u64,
    pub db_type: DbType,
    /// Passed verbatim to the backend.
    pub connection_string: String,
    /// Auxiliary CLI path, resolved and consumed by the backend.
    #[serde(default)]
    pub ai_cli_path: String,
    /// Path to the local model artifact; required before any ask operation.
    #[serde(default)]
    pub ai_model_path: String,
    /// Free-text schema/domain hints for SQL generation. May be empty.
    #[serde(default)]
    pub sql_knowledge: String,
}

/// Partial profile used for creation, editing and merge-upsert.
///
/// Absent fields keep their previous values when merged onto an existing
/// profile, and default to empty when a new profile is inserted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    /// 0 requests insertion; any other value targets an existing profile.
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub db_type: Option<DbType>,
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub ai_cli_path: Option<String>,
    #[serde(default)]
    pub ai_model_path: Option<String>,
    #[serde(default)]
    pub sql_knowledge: Option<String>,
}

impl ProfileDraft {
    /// An empty draft for a profile that does not exist yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge this draft onto an existing profile. Draft fields win;
    /// absent fields retain the base values. The base id is kept.
    pub fn apply_to(&self, base: &Profile) -> Profile {
        Profile {
            id: base.id,
            db_type: self.db_type.unwrap_or(base.db_type),
            connection_string: self
                .connection_string
                .clone()
                .unwrap_or_else(|| base.connection_string.clone()),
            ai_cli_path: self
                .ai_cli_path
                .clone()
                .unwrap_or_else(|| base.ai_cli_path.clone()),
            ai_model_path: self
                .ai_model_path
                .clone()
                .unwrap_or_else(|| base.ai_model_path.clone()),
            sql_knowledge: self
                .sql_knowledge
                .clone()
                .unwrap_or_else(|| base.sql_knowledge.clone()),
        }
    }

    /// Materialize a new profile under `id`. Absent string fields become
    /// empty; returns `None` when no database kind was chosen, since a
    /// profile cannot exist without one.
    pub fn into_profile(self, id: u64) -> Option<Profile> {
        Some(Profile {
            id,
            db_type: self.db_type?,
            connection_string: self.connection_string.unwrap_or_default(),
            ai_cli_path: self.ai_cli_path.unwrap_or_default(),
            ai_model_path: self.ai_model_path.unwrap_or_default(),
            sql_knowledge: self.sql_knowledge.unwrap_or_default(),
        })
    }

    /// The first required field that is missing or empty, if any.
    /// Required before a draft may be saved: database kind, connection
    /// string, and model path.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        if self.db_type.is_none() {
            return Some("db_type");
        }
        if self.connection_string.as_deref().is_none_or(str::is_empty) {
            return Some("connection_string");
        }
        if self.ai_model_path.as_deref().is_none_or(str::is_empty) {
            return Some("ai_model_path");
        }
        None
    }
}

impl From<Profile> for ProfileDraft {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            db_type: Some(p.db_type),
            connection_string: Some(p.connection_string),
            ai_cli_path: Some(p.ai_cli_path),
            ai_model_path: Some(p.ai_model_path),
            sql_knowledge: Some(p.sql_knowledge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_profile() -> Profile {
        Profile {
            id: 3,
            db_type: DbType::PostgreSql,
            connection_string: "postgresql://localhost/app".into(),
            ai_cli_path: "/opt/llama/llama-cli".into(),
            ai_model_path: "/models/phi3.gguf".into(),
            sql_knowledge: "orders reference customers".into(),
        }
    }

    #[test]
    fn db_type_wire_tags() {
        assert_eq!(serde_json::to_string(&DbType::MySql).unwrap(), "\"MySQL\"");
        assert_eq!(
            serde_json::to_string(&DbType::PostgreSql).unwrap(),
            "\"PostgreSQL\""
        );
        assert_eq!(serde_json::to_string(&DbType::Sqlite).unwrap(), "\"SQLite\"");
        let parsed: DbType = serde_json::from_str("\"SQLite\"").unwrap();
        assert_eq!(parsed, DbType::Sqlite);
    }

    #[test]
    fn apply_to_keeps_unset_fields() {
        let base = full_profile();
        let draft = ProfileDraft {
            id: base.id,
            connection_string: Some("postgresql://localhost/other".into()),
            ..ProfileDraft::default()
        };

        let merged = draft.apply_to(&base);
        assert_eq!(merged.id, 3);
        assert_eq!(merged.connection_string, "postgresql://localhost/other");
        assert_eq!(merged.db_type, DbType::PostgreSql);
        assert_eq!(merged.ai_model_path, "/models/phi3.gguf");
        assert_eq!(merged.sql_knowledge, "orders reference customers");
    }

    #[test]
    fn into_profile_requires_db_type() {
        let draft = ProfileDraft {
            connection_string: Some("sqlite::memory:".into()),
            ..ProfileDraft::default()
        };
        assert!(draft.into_profile(1).is_none());

        let draft = ProfileDraft {
            db_type: Some(DbType::Sqlite),
            connection_string: Some("sqlite::memory:".into()),
            ..ProfileDraft::default()
        };
        let profile = draft.into_profile(7).unwrap();
        assert_eq!(profile.id, 7);
        assert_eq!(profile.ai_model_path, "");
    }

    #[test]
    fn missing_field_order() {
        let mut draft = ProfileDraft::new();
        assert_eq!(draft.first_missing_field(), Some("db_type"));

        draft.db_type = Some(DbType::MySql);
        assert_eq!(draft.first_missing_field(), Some("connection_string"));

        draft.connection_string = Some("mysql://localhost/app".into());
        assert_eq!(draft.first_missing_field(), Some("ai_model_path"));

        draft.ai_model_path = Some("".into());
        assert_eq!(draft.first_missing_field(), Some("ai_model_path"));

        draft.ai_model_path = Some("/models/phi3.gguf".into());
        assert_eq!(draft.first_missing_field(), None);
    }
}
