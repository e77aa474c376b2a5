//! Persisted wizard progress.
//!
//! One JSON snapshot per futsal, stored under `bookingProgress_{futsalId}`.
//! Snapshots carry a format version; anything that fails to decode, has the
//! wrong version or points at a past date is dropped on restore.
//!
//! Only the guest's intended selection is persisted. Restoring never
//! reserves anything again; the slot status check before leaving step 3
//! catches a hold that lapsed while the wizard was closed.

use crate::error::StorageError;
use crate::machine::Step;
use crate::types::{Booking, FutsalId, GuestDetails, Shift, Slot, SlotId, TrackingCode};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Current snapshot format
pub const PROGRESS_VERSION: u32 = 1;

/// Storage key for a futsal's snapshot
#[must_use]
pub fn storage_key(futsal_id: FutsalId) -> String {
    format!("bookingProgress_{futsal_id}")
}

/// Wizard snapshot for one futsal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingProgress {
    /// Snapshot format
    pub version: u32,
    /// Current step
    pub step: Step,
    /// Chosen day, never before today when restored
    pub selected_date: Option<NaiveDate>,
    /// Chosen shift
    pub selected_shift: Option<Shift>,
    /// Reserved slot; at most one element
    pub selected_slot_ids: Vec<SlotId>,
    /// Shifts offered for the selected date
    pub available_shifts: Vec<Shift>,
    /// Last listing for the selected date and shift
    pub available_slots: Vec<Slot>,
    /// Guest phone
    pub phone: String,
    /// Guest name
    pub name: String,
    /// Party size
    pub number_of_players: u8,
    /// Optional team name
    pub team_name: String,
    /// Payment reference
    pub payment_id: String,
    /// Created booking, from step 6 onwards
    pub booking: Option<Booking>,
    /// Tracking code of the created booking
    pub generated_tracking_code: Option<TrackingCode>,
}

impl Default for BookingProgress {
    fn default() -> Self {
        Self {
            version: PROGRESS_VERSION,
            step: Step::SelectDate,
            selected_date: None,
            selected_shift: None,
            selected_slot_ids: Vec::new(),
            available_shifts: Vec::new(),
            available_slots: Vec::new(),
            phone: String::new(),
            name: String::new(),
            number_of_players: 1,
            team_name: String::new(),
            payment_id: String::new(),
            booking: None,
            generated_tracking_code: None,
        }
    }
}

impl BookingProgress {
    /// The reserved slot, if any
    #[must_use]
    pub fn selected_slot(&self) -> Option<SlotId> {
        self.selected_slot_ids.first().copied()
    }

    /// Guest fields as a validatable value
    #[must_use]
    pub fn guest(&self) -> GuestDetails {
        let team = self.team_name.trim();
        GuestDetails {
            phone: self.phone.trim().to_string(),
            name: self.name.trim().to_string(),
            number_of_players: self.number_of_players,
            team_name: (!team.is_empty()).then(|| team.to_string()),
        }
    }

    /// Copy guest fields in
    pub fn set_guest(&mut self, guest: GuestDetails) {
        self.phone = guest.phone;
        self.name = guest.name;
        self.number_of_players = guest.number_of_players;
        self.team_name = guest.team_name.unwrap_or_default();
    }
}

/// Key/value storage for serialized snapshots
pub trait ProgressStore: Send + Sync + 'static {
    /// Read the value under `key`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage fails.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage fails.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`; deleting a missing key succeeds
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backing storage fails.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process map, shared between clones
#[derive(Clone, Debug, Default)]
pub struct MemoryProgressStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryProgressStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// One `{key}.json` file per snapshot in a directory
#[derive(Clone, Debug)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    /// Store snapshots under `dir`, created on first save
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the snapshots
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, value)?;
        std::fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Typed access to snapshots in a [`ProgressStore`]
///
/// Writes issued from concurrently running effects can land out of order.
/// The `*_revision` methods remember the newest revision written per futsal
/// and drop anything older.
///
/// All methods block on the store (and the `*_revision` ones on a mutex
/// while they write), so async callers run them through
/// [`tokio::task::spawn_blocking`].
#[derive(Debug)]
pub struct ProgressRepository<P> {
    store: Arc<P>,
    revisions: Arc<Mutex<HashMap<FutsalId, u64>>>,
}

impl<P> Clone for ProgressRepository<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            revisions: Arc::clone(&self.revisions),
        }
    }
}

impl<P: ProgressStore> ProgressRepository<P> {
    /// Wrap a store
    #[must_use]
    pub fn new(store: P) -> Self {
        Self {
            store: Arc::new(store),
            revisions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Underlying store
    #[must_use]
    pub fn store(&self) -> &P {
        &self.store
    }

    /// Load the snapshot for `futsal_id`, if one is usable on `today`.
    ///
    /// Unusable snapshots are removed. Storage failures are logged and
    /// treated as "nothing saved".
    pub fn restore(&self, futsal_id: FutsalId, today: NaiveDate) -> Option<BookingProgress> {
        let key = storage_key(futsal_id);
        let raw = match self.store.load(&key) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!(%key, %error, "Failed to read booking progress");
                return None;
            },
        };

        let progress = match serde_json::from_str::<BookingProgress>(&raw) {
            Ok(progress) if progress.version == PROGRESS_VERSION => progress,
            Ok(progress) => {
                tracing::warn!(%key, version = progress.version, "Discarding booking progress with unknown version");
                self.discard(&key);
                return None;
            },
            Err(error) => {
                tracing::warn!(%key, %error, "Discarding corrupt booking progress");
                self.discard(&key);
                return None;
            },
        };

        if progress.selected_date.is_some_and(|date| date < today) {
            tracing::debug!(%key, "Discarding booking progress for a past date");
            self.discard(&key);
            return None;
        }

        tracing::debug!(%key, step = %progress.step, "Restored booking progress");
        Some(progress)
    }

    /// Save the snapshot for `futsal_id`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when encoding or writing fails.
    pub fn persist(&self, futsal_id: FutsalId, progress: &BookingProgress) -> Result<(), StorageError> {
        let json = serde_json::to_string(progress)?;
        self.store.save(&storage_key(futsal_id), &json)
    }

    /// Delete the snapshot for `futsal_id`
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot delete it.
    pub fn clear(&self, futsal_id: FutsalId) -> Result<(), StorageError> {
        self.store.remove(&storage_key(futsal_id))
    }

    /// Save `progress` unless a newer revision was already written.
    ///
    /// Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when encoding or writing fails.
    pub fn persist_revision(
        &self,
        futsal_id: FutsalId,
        revision: u64,
        progress: &BookingProgress,
    ) -> Result<bool, StorageError> {
        self.write_if_newer(futsal_id, revision, || self.persist(futsal_id, progress))
    }

    /// Delete the snapshot unless a newer revision was already written.
    ///
    /// Returns whether the delete happened.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the store cannot delete it.
    pub fn clear_revision(&self, futsal_id: FutsalId, revision: u64) -> Result<bool, StorageError> {
        self.write_if_newer(futsal_id, revision, || self.clear(futsal_id))
    }

    /// Newest revision written for `futsal_id`; new sessions continue from it
    #[must_use]
    pub fn latest_revision(&self, futsal_id: FutsalId) -> u64 {
        self.revisions
            .lock()
            .map_or(0, |revisions| revisions.get(&futsal_id).copied().unwrap_or(0))
    }

    fn write_if_newer(
        &self,
        futsal_id: FutsalId,
        revision: u64,
        write: impl FnOnce() -> Result<(), StorageError>,
    ) -> Result<bool, StorageError> {
        let mut revisions = self.revisions.lock().map_err(|_| StorageError::Poisoned)?;
        if revisions.get(&futsal_id).is_some_and(|newest| *newest >= revision) {
            tracing::trace!(%futsal_id, revision, "Skipping superseded progress write");
            return Ok(false);
        }
        write()?;
        revisions.insert(futsal_id, revision);
        Ok(true)
    }

    fn discard(&self, key: &str) {
        if let Err(error) = self.store.remove(key) {
            tracing::warn!(%key, %error, "Failed to remove unusable booking progress");
        }
    }
}
