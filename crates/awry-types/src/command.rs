//! Backend wire protocol.

use crate::Profile;
use serde::{Deserialize, Serialize};

/// Request envelope for one backend command invocation.
///
/// Every command carries the full profile: the backend keeps no
/// connection state between invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandRequest {
    Connect {
        profile: Profile,
    },
    Ask {
        profile: Profile,
        question: String,
    },
    AskForSql {
        profile: Profile,
        question: String,
    },
    Query {
        profile: Profile,
        sql: String,
    },
}

impl CommandRequest {
    /// Wire name of the command, passed to the backend executable.
    pub fn name(&self) -> &'static str {
        match self {
            CommandRequest::Connect { .. } => "connect",
            CommandRequest::Ask { .. } => "ask",
            CommandRequest::AskForSql { .. } => "ask_for_sql",
            CommandRequest::Query { .. } => "query",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbType;

    fn profile() -> Profile {
        Profile {
            id: 1,
            db_type: DbType::Sqlite,
            connection_string: "sqlite://app.db".into(),
            ai_cli_path: String::new(),
            ai_model_path: "/models/phi3.gguf".into(),
            sql_knowledge: String::new(),
        }
    }

    #[test]
    fn tagged_envelope_shape() {
        let req = CommandRequest::AskForSql {
            profile: profile(),
            question: "list all tables".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["command"], "ask_for_sql");
        assert_eq!(json["question"], "list all tables");
        assert_eq!(json["profile"]["db_type"], "SQLite");
        assert_eq!(req.name(), "ask_for_sql");
    }

    #[test]
    fn connect_carries_only_profile() {
        let req = CommandRequest::Connect { profile: profile() };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["command"], "connect");
        assert!(json.get("question").is_none());
        assert_eq!(req.name(), "connect");
    }
}
