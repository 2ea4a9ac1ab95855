//! End-to-end store + orchestrator flows against a stub backend.

use async_trait::async_trait;
use awry_core::{
    AwryError, BackendError, ConfigStore, MemoryStorage, QueryBackend, QueryOrchestrator,
};
use awry_types::{DbType, Profile, ProfileDraft, ResultEntry, Row};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Stub backend that records every invocation and replies from a
/// scripted queue (falling back to a canned success).
#[derive(Default)]
struct StubBackend {
    calls: Mutex<Vec<String>>,
    scripted: Mutex<Vec<Result<ResultEntry, BackendError>>>,
    fail_connect: bool,
}

impl StubBackend {
    fn new() -> Self {
        Self::default()
    }

    fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    fn script(&self, outcome: Result<ResultEntry, BackendError>) {
        self.scripted.lock().unwrap().push(outcome);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(&self, question: &str, sql: &str) -> Result<ResultEntry, BackendError> {
        let mut scripted = self.scripted.lock().unwrap();
        if scripted.is_empty() {
            let mut row = Row::new();
            row.insert("n".into(), serde_json::json!(1));
            Ok(ResultEntry {
                question: question.to_string(),
                sql: sql.to_string(),
                data: Some(vec![row]),
                err: None,
                msg: None,
                created_at: chrono::Utc::now(),
            })
        } else {
            scripted.remove(0)
        }
    }
}

#[async_trait]
impl QueryBackend for StubBackend {
    async fn connect(&self, profile: &Profile) -> Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("connect:{}", profile.id));
        if self.fail_connect {
            return Err(BackendError::Reported {
                fields: BTreeMap::from([
                    ("err".to_string(), "ConnectionError".to_string()),
                    ("msg".to_string(), "refused".to_string()),
                ]),
            });
        }
        Ok("{\"msg\": \"success\"}".to_string())
    }

    async fn ask(&self, _profile: &Profile, question: &str) -> Result<ResultEntry, BackendError> {
        self.calls.lock().unwrap().push(format!("ask:{question}"));
        self.reply(question, "select * from t;")
    }

    async fn ask_for_sql(
        &self,
        _profile: &Profile,
        question: &str,
    ) -> Result<ResultEntry, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("ask_for_sql:{question}"));
        let mut entry = self.reply(question, "select id from t;")?;
        entry.data = None;
        Ok(entry)
    }

    async fn query(&self, _profile: &Profile, sql: &str) -> Result<ResultEntry, BackendError> {
        self.calls.lock().unwrap().push(format!("query:{sql}"));
        self.reply("", sql)
    }
}

fn store_with_profile(model_path: &str) -> (Arc<ConfigStore>, Profile) {
    let store = Arc::new(ConfigStore::open(Arc::new(MemoryStorage::new())).unwrap());
    let profile = store
        .upsert(ProfileDraft {
            db_type: Some(DbType::Sqlite),
            connection_string: Some("sqlite://app.db".into()),
            ai_model_path: Some(model_path.into()),
            ..ProfileDraft::default()
        })
        .unwrap()
        .unwrap();
    (store, profile)
}

fn orchestrator(
    store: Arc<ConfigStore>,
    backend: Arc<StubBackend>,
) -> QueryOrchestrator {
    QueryOrchestrator::new(store, backend)
}

#[tokio::test]
async fn connect_activates_the_profile() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());

    assert!(store.active().is_none());
    let ack = orch.connect(profile.clone()).await.unwrap();
    assert_eq!(ack, "{\"msg\": \"success\"}");
    assert_eq!(store.active().map(|p| p.id), Some(profile.id));
    assert_eq!(backend.calls(), vec![format!("connect:{}", profile.id)]);
}

#[tokio::test]
async fn failed_connect_leaves_activation_untouched() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::failing_connect());
    let orch = orchestrator(store.clone(), backend.clone());

    let err = orch.connect(profile).await.unwrap_err();
    match err {
        AwryError::Backend(e) => {
            assert_eq!(e.diagnostic(), "err : ConnectionError, msg : refused")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.active().is_none());

    // The guard was released: a later operation is not rejected.
    let err = orch.ask("q").await.unwrap_err();
    assert!(matches!(err, AwryError::NoConnection));
}

#[tokio::test]
async fn ask_without_connection_short_circuits() {
    let (store, _) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store, backend.clone());

    let err = orch.ask("how many rows?").await.unwrap_err();
    assert!(matches!(err, AwryError::NoConnection));
    assert!(backend.calls().is_empty());
    assert!(orch.history().is_empty());
}

#[tokio::test]
async fn ask_without_model_short_circuits() {
    let (store, profile) = store_with_profile("");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());
    store.set_active(profile);

    let err = orch.ask("how many rows?").await.unwrap_err();
    assert!(matches!(err, AwryError::NoModel));
    let err = orch.ask_for_sql("how many rows?").await.unwrap_err();
    assert!(matches!(err, AwryError::NoModel));
    assert!(backend.calls().is_empty());

    // Direct queries perform no inference and need no model.
    orch.query("select 1").await.unwrap();
    assert_eq!(backend.calls(), vec!["query:select 1".to_string()]);
}

#[tokio::test]
async fn non_select_statement_is_rejected_locally() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());
    store.set_active(profile);

    let err = orch.query("update t set x = 1").await.unwrap_err();
    assert!(matches!(err, AwryError::NotReadOnly));
    assert!(backend.calls().is_empty());
    assert!(orch.history().is_empty());

    // Leading whitespace and mixed case pass the check.
    orch.query("  SeLeCt 1").await.unwrap();
    assert_eq!(orch.history().len(), 1);
}

#[tokio::test]
async fn history_appends_in_invocation_order() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());
    store.set_active(profile);

    orch.ask_for_sql("q1").await.unwrap();
    orch.query("select 1").await.unwrap();
    orch.ask("q2").await.unwrap();

    let history = orch.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].question, "q1");
    assert!(history[0].data.is_none());
    assert_eq!(history[1].sql, "select 1");
    assert_eq!(history[1].question, "");
    assert_eq!(history[2].question, "q2");
}

#[tokio::test]
async fn ask_for_sql_stages_pending_statement() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());
    store.set_active(profile);

    assert!(orch.pending_sql().is_none());
    let entry = orch.ask_for_sql("list ids").await.unwrap();
    assert_eq!(orch.pending_sql().as_deref(), Some(entry.sql.as_str()));
    // Generation does not execute: only one backend call, one entry.
    assert_eq!(backend.calls().len(), 1);
    assert_eq!(orch.history().len(), 1);
}

#[tokio::test]
async fn soft_error_envelope_is_still_appended() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());
    store.set_active(profile);

    backend.script(Ok(ResultEntry {
        question: "q".into(),
        sql: "select * from missing;".into(),
        data: None,
        err: Some("table not found".into()),
        msg: Some("no such table: missing".into()),
        created_at: chrono::Utc::now(),
    }));

    let entry = orch.ask("q").await.unwrap();
    assert!(entry.is_soft_error());

    let history = orch.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].err.as_deref(), Some("table not found"));
}

#[tokio::test]
async fn invocation_failure_appends_nothing_and_releases_guard() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());
    store.set_active(profile);

    backend.script(Err(BackendError::Exit {
        status: 1,
        stderr: "backend crashed".into(),
    }));

    let err = orch.ask("q").await.unwrap_err();
    assert!(matches!(err, AwryError::Backend(_)));
    assert!(orch.history().is_empty());

    // The guard was released on the failure path.
    orch.ask("again").await.unwrap();
    assert_eq!(orch.history().len(), 1);
}

#[tokio::test]
async fn orchestrator_reads_active_profile_per_call() {
    let (store, profile) = store_with_profile("/m.gguf");
    let backend = Arc::new(StubBackend::new());
    let orch = orchestrator(store.clone(), backend.clone());
    store.set_active(profile.clone());

    orch.ask("q").await.unwrap();

    // Deleting the active profile clears activation; the next call
    // fails the precondition without reaching the backend.
    store.delete(profile.id).unwrap();
    let err = orch.ask("q").await.unwrap_err();
    assert!(matches!(err, AwryError::NoConnection));
    assert_eq!(backend.calls().len(), 1);
}
