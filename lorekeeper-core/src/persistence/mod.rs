//! Save store contract and its implementations.
//!
//! The store is the only place a [`GameState`] is stamped with
//! `last_saved_at`. Failures are surfaced verbatim to the caller; nothing in
//! this crate retries them.
//!
//! - [`sqlite::SqliteSaveStore`] — one SQLite file, JSON rows, optional
//!   CRC-32 checksums.
//! - [`json_dir::JsonDirStore`] — one pretty-printed `<save_id>.json` per
//!   save, handy for inspecting saves by hand.

pub mod json_dir;
pub mod sqlite;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{PersistenceConfig, StoreBackend};
use crate::error::Result;
use crate::state::GameState;
use crate::types::SaveId;

/// What `list_all` reports for each save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    /// The player's name.
    pub player_name: String,
    /// The player's level.
    pub level: u32,
    /// Where the player was when saved.
    pub location: String,
    /// When the save was written.
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl From<&GameState> for SaveSummary {
    fn from(state: &GameState) -> Self {
        Self {
            player_name: state.player.name().to_string(),
            level: state.player.level,
            location: state.current_location.clone(),
            last_saved_at: state.last_saved_at,
        }
    }
}

/// Read/write contract of the save store, keyed by [`SaveId`].
///
/// Implementations must make `put` atomic per id; the session layer relies
/// on that for at-most-one mutation per save.
pub trait SaveStore: Send + Sync {
    /// Load a save. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    /// Storage or decoding failures.
    fn get(&self, id: &SaveId) -> Result<Option<GameState>>;

    /// Upsert a save, returning the state as stored (with `last_saved_at` set).
    ///
    /// # Errors
    /// Storage or encoding failures.
    fn put(&self, id: &SaveId, state: &GameState) -> Result<GameState>;

    /// Delete a save. `Ok(false)` when it did not exist.
    ///
    /// # Errors
    /// Storage failures.
    fn delete(&self, id: &SaveId) -> Result<bool>;

    /// Summaries of every save.
    ///
    /// # Errors
    /// Storage failures. Individual unreadable saves are skipped.
    fn list_all(&self) -> Result<BTreeMap<SaveId, SaveSummary>>;
}

impl<T: SaveStore + ?Sized> SaveStore for Box<T> {
    fn get(&self, id: &SaveId) -> Result<Option<GameState>> {
        (**self).get(id)
    }

    fn put(&self, id: &SaveId, state: &GameState) -> Result<GameState> {
        (**self).put(id, state)
    }

    fn delete(&self, id: &SaveId) -> Result<bool> {
        (**self).delete(id)
    }

    fn list_all(&self) -> Result<BTreeMap<SaveId, SaveSummary>> {
        (**self).list_all()
    }
}

/// Open the store selected by `config.backend`.
///
/// # Errors
/// Returns an error if the database or directory cannot be opened.
pub fn open_store(config: &PersistenceConfig) -> Result<Box<dyn SaveStore>> {
    Ok(match config.backend {
        StoreBackend::Sqlite => Box::new(sqlite::SqliteSaveStore::open(&config.path, config)?),
        StoreBackend::Json => Box::new(json_dir::JsonDirStore::open(&config.path)?),
    })
}

/// Copy of `state` stamped with the current time.
pub(crate) fn stamped(state: &GameState) -> GameState {
    let mut out = state.clone();
    out.last_saved_at = Some(Utc::now());
    out
}
