//! Durable CRUD over connection profiles, plus the session state that
//! hangs off them: the active profile, the edit buffer, and the
//! last-used model path.

use crate::{AwryError, KeyValueStorage, Result};
use awry_types::{Profile, ProfileDraft};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Slot holding the serialized profile collection.
const CONFIGS_SLOT: &str = "configs";
/// Slot holding the last-used default model path.
const MODEL_PATH_SLOT: &str = "modelPath";

/// Change notifications emitted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    ProfilesChanged,
    ActiveChanged,
    ModelPathChanged,
}

/// Observable store of connection profiles.
///
/// All mutations persist the full collection synchronously before
/// returning, so a `profiles()` snapshot taken immediately after a
/// mutation reflects it. The store assumes a single logical writer per
/// storage; concurrent writers from separate sessions are not supported.
pub struct ConfigStore {
    storage: Arc<dyn KeyValueStorage>,
    profiles: RwLock<Vec<Profile>>,
    active: RwLock<Option<Profile>>,
    edit_buffer: RwLock<Option<ProfileDraft>>,
    model_path: RwLock<String>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl ConfigStore {
    /// Open a store over the given storage, loading both slots.
    /// A missing slot yields the empty state; a corrupt `configs` slot
    /// is an error rather than silent data loss.
    pub fn open(storage: Arc<dyn KeyValueStorage>) -> Result<Self> {
        let profiles: Vec<Profile> = match storage.get(CONFIGS_SLOT)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let model_path = storage.get(MODEL_PATH_SLOT)?.unwrap_or_default();
        let (event_tx, _) = broadcast::channel(64);

        debug!(target: "awry::store", "Loaded {} profiles", profiles.len());

        Ok(Self {
            storage,
            profiles: RwLock::new(profiles),
            active: RwLock::new(None),
            edit_buffer: RwLock::new(None),
            model_path: RwLock::new(model_path),
            event_tx,
        })
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the persisted collection, in stored order.
    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles.read().unwrap().clone()
    }

    /// Look up a single profile by ID.
    pub fn get(&self, id: u64) -> Option<Profile> {
        self.profiles
            .read()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Insert or update a profile from a draft.
    ///
    /// A draft with `id == 0` is inserted under a freshly allocated ID
    /// (max existing + 1). Any other ID merges the draft onto the
    /// matching profile, absent draft fields keeping their old values;
    /// an unknown ID is a no-op returning `Ok(None)`. The collection is
    /// persisted before this returns.
    pub fn upsert(&self, draft: ProfileDraft) -> Result<Option<Profile>> {
        let mut profiles = self.profiles.write().unwrap();

        let stored = if draft.id == 0 {
            let next_id = profiles.iter().map(|p| p.id).max().unwrap_or(0) + 1;
            let profile = draft
                .into_profile(next_id)
                .ok_or(AwryError::MissingField("db_type"))?;
            info!(target: "awry::store", "Created profile {} ({})", profile.id, profile.db_type);
            profiles.push(profile.clone());
            profile
        } else {
            match profiles.iter_mut().find(|p| p.id == draft.id) {
                Some(existing) => {
                    let merged = draft.apply_to(existing);
                    *existing = merged.clone();
                    debug!(target: "awry::store", "Updated profile {}", merged.id);
                    merged
                }
                None => {
                    warn!(target: "awry::store", "Upsert for unknown profile {} ignored", draft.id);
                    return Ok(None);
                }
            }
        };

        self.persist(&profiles)?;
        drop(profiles);

        let _ = self.event_tx.send(StoreEvent::ProfilesChanged);
        Ok(Some(stored))
    }

    /// Remove the profile with the given ID; no-op when absent.
    /// Deleting the currently active profile also clears the activation.
    pub fn delete(&self, id: u64) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap();
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Ok(());
        }

        self.persist(&profiles)?;
        drop(profiles);
        info!(target: "awry::store", "Deleted profile {}", id);

        let deactivated = {
            let mut active = self.active.write().unwrap();
            if active.as_ref().is_some_and(|p| p.id == id) {
                *active = None;
                true
            } else {
                false
            }
        };

        let _ = self.event_tx.send(StoreEvent::ProfilesChanged);
        if deactivated {
            info!(target: "awry::store", "Deleted profile {} was active; activation cleared", id);
            let _ = self.event_tx.send(StoreEvent::ActiveChanged);
        }
        Ok(())
    }

    /// Validate and persist the draft, then clear the edit buffer.
    ///
    /// This is the save path behind the profile form: the database kind,
    /// connection string and model path must all be present. The saved
    /// model path also becomes the session's last-used default.
    pub fn save(&self, draft: ProfileDraft) -> Result<Option<Profile>> {
        if let Some(field) = draft.first_missing_field() {
            return Err(AwryError::MissingField(field));
        }

        let model_path = draft.ai_model_path.clone();
        let stored = self.upsert(draft)?;

        if stored.is_some() {
            if let Some(path) = model_path.filter(|p| !p.is_empty()) {
                self.set_model_path(&path)?;
            }
            self.clear_edit_buffer();
        }
        Ok(stored)
    }

    /// The profile currently designated as connected, if any.
    pub fn active(&self) -> Option<Profile> {
        self.active.read().unwrap().clone()
    }

    /// Designate a profile as connected. Called only after a successful
    /// backend connect; the profile need not be a persisted member.
    pub fn set_active(&self, profile: Profile) {
        *self.active.write().unwrap() = Some(profile);
        let _ = self.event_tx.send(StoreEvent::ActiveChanged);
    }

    /// Drop the connected designation.
    pub fn clear_active(&self) {
        let was = self.active.write().unwrap().take();
        if was.is_some() {
            let _ = self.event_tx.send(StoreEvent::ActiveChanged);
        }
    }

    /// The draft currently being created or edited, if any.
    pub fn edit_buffer(&self) -> Option<ProfileDraft> {
        self.edit_buffer.read().unwrap().clone()
    }

    pub fn set_edit_buffer(&self, draft: ProfileDraft) {
        *self.edit_buffer.write().unwrap() = Some(draft);
    }

    pub fn clear_edit_buffer(&self) {
        *self.edit_buffer.write().unwrap() = None;
    }

    /// Last-used default model path. Maintained independently of any
    /// profile's own model path.
    pub fn model_path(&self) -> String {
        self.model_path.read().unwrap().clone()
    }

    pub fn set_model_path(&self, path: &str) -> Result<()> {
        self.storage.set(MODEL_PATH_SLOT, path)?;
        *self.model_path.write().unwrap() = path.to_string();
        let _ = self.event_tx.send(StoreEvent::ModelPathChanged);
        Ok(())
    }

    fn persist(&self, profiles: &[Profile]) -> Result<()> {
        let raw = serde_json::to_string(profiles)?;
        self.storage.set(CONFIGS_SLOT, &raw)
    }
}
