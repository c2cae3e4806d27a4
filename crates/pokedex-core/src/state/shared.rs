use std::sync::{Mutex, PoisonError, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::NamedApiResource;
use crate::store::{FileStore, StoreError};

use super::{Collection, PokedexDocument};

/// Whether and how often changes are flushed to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSaveSettings {
    pub enabled: bool,
    /// Changes per save. Never below 1.
    pub interval: u32,
}

impl Default for AutoSaveSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 1,
        }
    }
}

impl AutoSaveSettings {
    pub fn new(enabled: bool, interval: u32) -> Self {
        Self {
            enabled,
            interval: interval.max(1),
        }
    }
}

/// Counts changes since the last scheduled save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounter {
    pub changes_since_sync: u32,
    pub settings: AutoSaveSettings,
}

impl SyncCounter {
    /// Count one change. Returns true when a save is due, in which case the
    /// counter has already been reset.
    ///
    /// While disabled the counter keeps climbing past the interval, so the
    /// first change after re-enabling triggers exactly one save.
    fn record_change(&mut self) -> bool {
        self.changes_since_sync = self.changes_since_sync.saturating_add(1);
        if self.settings.enabled && self.changes_since_sync >= self.settings.interval {
            self.changes_since_sync = 0;
            true
        } else {
            false
        }
    }
}

/// What `record_change_and_maybe_sync` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Saved,
    Pending { changes: u32, interval: u32 },
    Disabled { changes: u32 },
}

/// Everything guarded by the state lock.
#[derive(Debug, Default)]
pub struct PokedexState {
    pub pokedex: Collection,
    pub next_location_url: Option<String>,
    pub prev_location_url: Option<String>,
    /// Last page of locations shown, so `explore 3` can refer to it.
    pub recent_locations: Vec<NamedApiResource>,
    pub map_viewed: bool,
    pub sync: SyncCounter,
}

impl PokedexState {
    fn to_document(&self) -> PokedexDocument {
        PokedexDocument {
            pokedex: self.pokedex.entries().clone(),
            last_saved: Some(Utc::now()),
            auto_save: Some(self.sync.settings),
        }
    }
}

/// The Pokédex and map cursors behind a reader/writer lock, plus the store
/// they are flushed to.
///
/// The lock is never held across disk I/O: saves snapshot the state under a
/// read lock and write after releasing it. Closures passed to `with_read` and
/// `with_write` must not call back into the same `SharedState`.
#[derive(Debug)]
pub struct SharedState {
    inner: RwLock<PokedexState>,
    store: FileStore,
    /// Serializes flushes within this process so an older snapshot can never
    /// land on disk after a newer one.
    flush_lock: Mutex<()>,
}

impl SharedState {
    /// Start with an empty Pokédex.
    pub fn new(store: FileStore, settings: AutoSaveSettings) -> Self {
        let state = PokedexState {
            sync: SyncCounter {
                changes_since_sync: 0,
                settings,
            },
            ..PokedexState::default()
        };
        Self {
            inner: RwLock::new(state),
            store,
            flush_lock: Mutex::new(()),
        }
    }

    /// Load the Pokédex from `store`. Settings saved in the file override
    /// `default_settings`; map cursors always start empty.
    ///
    /// Two keys for the same Pokémon with different records make the file
    /// undecodable, the same as malformed JSON.
    pub fn load(store: FileStore, default_settings: AutoSaveSettings) -> Result<Self, StoreError> {
        let document: PokedexDocument = store.load()?;
        let pokedex =
            Collection::from_entries(document.pokedex).map_err(|e| StoreError::Decode {
                path: store.path().to_path_buf(),
                source: <serde_json::Error as serde::de::Error>::custom(e),
            })?;
        let settings = document
            .auto_save
            .map(|s| AutoSaveSettings::new(s.enabled, s.interval))
            .unwrap_or(default_settings);

        let shared = Self::new(store, settings);
        shared.with_write(|state| state.pokedex = pokedex);
        info!(
            count = shared.with_read(|state| state.pokedex.len()),
            last_saved = ?document.last_saved,
            "Pokédex loaded"
        );
        Ok(shared)
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn with_read<R>(&self, f: impl FnOnce(&PokedexState) -> R) -> R {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    pub fn with_write<R>(&self, f: impl FnOnce(&mut PokedexState) -> R) -> R {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Count one user-visible change and save if the auto-save policy says so.
    ///
    /// The in-memory change already happened and stays. A failed save is
    /// returned but the counter is not rolled back; the next due save or an
    /// explicit `save_now` writes the change.
    pub fn record_change_and_maybe_sync(&self) -> Result<SyncOutcome, StoreError> {
        let (due, counter) = self.with_write(|state| {
            let due = state.sync.record_change();
            (due, state.sync)
        });

        if !due {
            let outcome = if counter.settings.enabled {
                SyncOutcome::Pending {
                    changes: counter.changes_since_sync,
                    interval: counter.settings.interval,
                }
            } else {
                SyncOutcome::Disabled {
                    changes: counter.changes_since_sync,
                }
            };
            debug!(?outcome, "Change recorded");
            return Ok(outcome);
        }

        self.flush().map(|()| SyncOutcome::Saved).inspect_err(|e| {
            warn!(error = %e, "Auto-save failed, changes kept in memory");
        })
    }

    /// Save immediately, regardless of the auto-save policy.
    pub fn save_now(&self) -> Result<(), StoreError> {
        self.with_write(|state| state.sync.changes_since_sync = 0);
        self.flush()
    }

    /// Change the auto-save policy and persist it.
    pub fn set_auto_save(&self, settings: AutoSaveSettings) -> Result<(), StoreError> {
        let settings = AutoSaveSettings::new(settings.enabled, settings.interval);
        self.with_write(|state| state.sync.settings = settings);
        self.flush()
    }

    /// Release every Pokémon and persist the empty Pokédex.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.with_write(|state| {
            state.pokedex.clear();
            state.sync.changes_since_sync = 0;
        });
        self.flush()
    }

    fn flush(&self) -> Result<(), StoreError> {
        let _flushing = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Snapshot after taking the flush lock, so it includes every change
        // made before this flush was requested.
        let document = self.with_read(PokedexState::to_document);
        self.store.save(&document)
    }
}

// ============================================================================
// Tests
// ============================================================================
