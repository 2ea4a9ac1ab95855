//! Query orchestration over the active profile.
//!
//! Translates user intents into backend command invocations, normalizes
//! outcomes, and accumulates every completed round trip into an ordered,
//! append-only session history.

use crate::{AwryError, BackendError, ConfigStore, QueryBackend, Result};
use awry_types::{Profile, ResultEntry};
use chrono::Utc;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notifications emitted as the history grows.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    EntryAppended(ResultEntry),
}

type RequestToken = u64;

/// Single-request guard. At most one backend invocation may be
/// outstanding; a completion holding a superseded token is detected so
/// its result can be discarded instead of racing into the history.
struct RequestGuard {
    state: Mutex<GuardState>,
}

#[derive(Default)]
struct GuardState {
    counter: u64,
    current: Option<RequestToken>,
}

impl RequestGuard {
    fn new() -> Self {
        Self {
            state: Mutex::new(GuardState::default()),
        }
    }

    fn begin(&self) -> Result<RequestToken> {
        let mut state = self.state.lock().unwrap();
        if state.current.is_some() {
            return Err(AwryError::RequestInFlight);
        }
        state.counter += 1;
        state.current = Some(state.counter);
        Ok(state.counter)
    }

    /// Release the guard. Returns whether `token` was still the current
    /// request; a `false` means the completion is stale.
    fn finish(&self, token: RequestToken) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.current {
            Some(current) if current == token => {
                state.current = None;
                true
            }
            _ => false,
        }
    }
}

/// Sequences requests against the backend for the active profile.
///
/// Reads the active profile from [`ConfigStore`] on every operation and
/// never mutates the profile collection; the only store mutation it
/// performs is activating a profile after a successful connect.
pub struct QueryOrchestrator {
    store: Arc<ConfigStore>,
    backend: Arc<dyn QueryBackend>,
    history: RwLock<Vec<ResultEntry>>,
    pending_sql: RwLock<Option<String>>,
    guard: RequestGuard,
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl QueryOrchestrator {
    pub fn new(store: Arc<ConfigStore>, backend: Arc<dyn QueryBackend>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            store,
            backend,
            history: RwLock::new(Vec::new()),
            pending_sql: RwLock::new(None),
            guard: RequestGuard::new(),
            event_tx,
        }
    }

    /// Subscribe to history notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the session history, in completion order.
    pub fn history(&self) -> Vec<ResultEntry> {
        self.history.read().unwrap().clone()
    }

    /// The generated statement staged for manual execution, if any.
    pub fn pending_sql(&self) -> Option<String> {
        self.pending_sql.read().unwrap().clone()
    }

    pub fn set_pending_sql(&self, sql: Option<String>) {
        *self.pending_sql.write().unwrap() = sql;
    }

    /// Connect with the given profile. On success the profile becomes
    /// the active one; on failure the previous activation is untouched.
    pub async fn connect(&self, profile: Profile) -> Result<String> {
        let token = self.guard.begin()?;
        let outcome = self.backend.connect(&profile).await;
        self.guard.finish(token);

        match outcome {
            Ok(ack) => {
                info!(target: "awry::orchestrator", "Connected to {} (profile {})", profile.db_type, profile.id);
                self.store.set_active(profile);
                Ok(ack)
            }
            Err(e) => {
                warn!(target: "awry::orchestrator", "Connect failed: {}", e.diagnostic());
                Err(e.into())
            }
        }
    }

    /// Natural-language question to tabular result. Requires an active
    /// profile with a model path; the outcome is appended to history.
    pub async fn ask(&self, question: &str) -> Result<ResultEntry> {
        let token = self.guard.begin()?;
        let profile = match self.require_model() {
            Ok(p) => p,
            Err(e) => {
                self.guard.finish(token);
                return Err(e);
            }
        };

        debug!(target: "awry::orchestrator", "ask: {}", question);
        let outcome = self.backend.ask(&profile, question).await;
        self.complete(token, outcome)
    }

    /// Natural-language question to a generated statement, which is
    /// staged as the pending query text rather than executed.
    pub async fn ask_for_sql(&self, question: &str) -> Result<ResultEntry> {
        let token = self.guard.begin()?;
        let profile = match self.require_model() {
            Ok(p) => p,
            Err(e) => {
                self.guard.finish(token);
                return Err(e);
            }
        };

        debug!(target: "awry::orchestrator", "ask_for_sql: {}", question);
        let outcome = self.backend.ask_for_sql(&profile, question).await;
        let entry = self.complete(token, outcome)?;

        self.set_pending_sql(Some(entry.sql.clone()));
        Ok(entry)
    }

    /// Execute a statement directly against the active profile's
    /// connection. Only statements beginning with the SELECT keyword
    /// are allowed past this layer; the check is syntactic only and not
    /// a substitute for backend-side authorization. No model is
    /// required, since no inference takes place.
    pub async fn query(&self, sql: &str) -> Result<ResultEntry> {
        let token = self.guard.begin()?;
        let profile = match self.require_active() {
            Ok(p) => p,
            Err(e) => {
                self.guard.finish(token);
                return Err(e);
            }
        };
        if !is_select(sql) {
            self.guard.finish(token);
            return Err(AwryError::NotReadOnly);
        }

        debug!(target: "awry::orchestrator", "query: {}", sql);
        let outcome = self.backend.query(&profile, sql).await;
        self.complete(token, outcome)
    }

    fn require_active(&self) -> Result<Profile> {
        self.store.active().ok_or(AwryError::NoConnection)
    }

    fn require_model(&self) -> Result<Profile> {
        let profile = self.require_active()?;
        if profile.ai_model_path.is_empty() {
            return Err(AwryError::NoModel);
        }
        Ok(profile)
    }

    /// Common completion path: release the guard, then append on
    /// success. A backend-reported soft error still rides inside a
    /// successful envelope and is appended; an invocation failure
    /// appends nothing. A stale completion is returned to its caller
    /// but kept out of the history.
    fn complete(
        &self,
        token: RequestToken,
        outcome: std::result::Result<ResultEntry, BackendError>,
    ) -> Result<ResultEntry> {
        let still_current = self.guard.finish(token);

        match outcome {
            Ok(mut entry) => {
                entry.created_at = Utc::now();
                if !still_current {
                    warn!(target: "awry::orchestrator", "Discarding response for superseded request");
                    return Ok(entry);
                }
                if entry.is_soft_error() {
                    debug!(
                        target: "awry::orchestrator",
                        "Backend reported {}: {}",
                        entry.err.as_deref().unwrap_or("error"),
                        entry.msg.as_deref().unwrap_or("")
                    );
                } else {
                    debug!(target: "awry::orchestrator", "Retrieved {} rows", entry.row_count());
                }
                self.history.write().unwrap().push(entry.clone());
                let _ = self
                    .event_tx
                    .send(OrchestratorEvent::EntryAppended(entry.clone()));
                Ok(entry)
            }
            Err(e) => {
                warn!(target: "awry::orchestrator", "Backend invocation failed: {}", e.diagnostic());
                Err(e.into())
            }
        }
    }
}

/// Whether the statement begins with the SELECT keyword, ignoring
/// leading whitespace and case.
fn is_select(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    let Some(head) = trimmed.get(..6) else {
        return false;
    };
    if !head.eq_ignore_ascii_case("select") {
        return false;
    }
    // Keyword boundary: end of input or a non-identifier character.
    match trimmed[6..].chars().next() {
        None => true,
        Some(c) => !c.is_alphanumeric() && c != '_',
    }
}
