//! SQLite save store.
//!
//! Each [`GameState`] is serialised to JSON and stored in a single table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS game_saves (
//!     save_id  TEXT PRIMARY KEY,
//!     data     BLOB NOT NULL,
//!     saved_at TEXT NOT NULL,
//!     checksum TEXT
//! );
//! ```
//!
//! - WAL mode for concurrent reads while a session is being played.
//! - JSON inside a BLOB keeps the schema stable when the model grows.
//! - Optional CRC-32 checksum detects save corruption.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use super::{stamped, SaveStore, SaveSummary};
use crate::config::PersistenceConfig;
use crate::error::{LoreError, Result};
use crate::state::GameState;
use crate::types::SaveId;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS game_saves (
    save_id  TEXT PRIMARY KEY,
    data     BLOB NOT NULL,
    saved_at TEXT NOT NULL,
    checksum TEXT
);";

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    format!("{:08x}", !crc)
}

/// Save store backed by one SQLite database.
///
/// ```no_run
/// # use lorekeeper_core::persistence::{SaveStore, sqlite::SqliteSaveStore};
/// # use lorekeeper_core::config::PersistenceConfig;
/// # use lorekeeper_core::{GameState, Player, SaveId};
/// let store = SqliteSaveStore::open("saves.db", &PersistenceConfig::default())?;
/// let id = SaveId::new();
/// store.put(&id, &GameState::new(Player::new("Aria"), "You wake up.", "start"))?;
/// let loaded = store.get(&id)?;
/// # Ok::<(), lorekeeper_core::LoreError>(())
/// ```
pub struct SqliteSaveStore {
    conn: Mutex<Connection>,
    checksum_enabled: bool,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteSaveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSaveStore")
            .field("db_path", &self.db_path)
            .field("checksum_enabled", &self.checksum_enabled)
            .finish_non_exhaustive()
    }
}

impl SqliteSaveStore {
    /// Open (or create) a database at `path`, creating the schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LoreError::Database`] on SQLite failures, or
    /// [`LoreError::Io`] if the parent directory cannot be created.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Save store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            checksum_enabled: config.checksum_enabled,
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`LoreError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            checksum_enabled: config.checksum_enabled,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Run SQLite's integrity check. `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`LoreError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn decode(id: &str, data: &[u8]) -> Result<GameState> {
        serde_json::from_slice(data)
            .map_err(|e| LoreError::Serialization(format!("save {id}: {e}")))
    }
}

impl SaveStore for SqliteSaveStore {
    fn get(&self, id: &SaveId) -> Result<Option<GameState>> {
        let start = Instant::now();
        let id_str = id.to_string();

        let row: Option<(Vec<u8>, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare_cached("SELECT data, checksum FROM game_saves WHERE save_id = ?1")?;
            stmt.query_row(params![id_str], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?
        };

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        save_id = %id,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch — possible save corruption"
                    );
                }
            }
        }

        let state = Self::decode(&id_str, &data)?;
        debug!(
            save_id = %id,
            memory = state.story_memory.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded save"
        );
        Ok(Some(state))
    }

    fn put(&self, id: &SaveId, state: &GameState) -> Result<GameState> {
        let start = Instant::now();
        let stored = stamped(state);
        let json = serde_json::to_vec(&stored).map_err(|e| LoreError::Serialization(e.to_string()))?;
        let checksum = self.checksum_enabled.then(|| crc32_hex(&json));
        let saved_at = stored
            .last_saved_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        self.conn.lock().execute(
            "INSERT INTO game_saves (save_id, data, saved_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(save_id) DO UPDATE SET
                data = excluded.data,
                saved_at = excluded.saved_at,
                checksum = excluded.checksum",
            params![id.to_string(), json, saved_at, checksum],
        )?;

        debug!(
            save_id = %id,
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved game"
        );
        Ok(stored)
    }

    fn delete(&self, id: &SaveId) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM game_saves WHERE save_id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn list_all(&self) -> Result<BTreeMap<SaveId, SaveSummary>> {
        let rows: Vec<(String, Vec<u8>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached("SELECT save_id, data FROM game_saves")?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<_, _>>()?
        };

        let mut saves = BTreeMap::new();
        for (id_str, data) in rows {
            let Ok(id) = id_str.parse::<SaveId>() else {
                warn!(id = %id_str, "Skipping row with invalid save id");
                continue;
            };
            match Self::decode(&id_str, &data) {
                Ok(state) => {
                    saves.insert(id, SaveSummary::from(&state));
                }
                Err(e) => warn!(save_id = %id, error = %e, "Skipping unreadable save"),
            }
        }
        Ok(saves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    fn sample_state() -> GameState {
        let mut state = GameState::new(Player::new("Aria"), "You wake up.", "start");
        state.story_memory.push("A bard sings of dragons.".into());
        state.player.xp = 42;
        state
    }

    #[test]
    fn round_trip_put_get() {
        let store = SqliteSaveStore::open_in_memory(&test_config()).expect("open");
        let id = SaveId::new();
        let state = sample_state();

        let stored = store.put(&id, &state).expect("put");
        assert!(stored.last_saved_at.is_some());
        let loaded = store.get(&id).expect("get").expect("Some");

        assert!(loaded.same_progress(&state));
        assert_eq!(loaded.last_saved_at, stored.last_saved_at);
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = SqliteSaveStore::open_in_memory(&test_config()).expect("open");
        assert!(store.get(&SaveId::new()).expect("get").is_none());
    }

    #[test]
    fn upsert_overwrites() {
        let store = SqliteSaveStore::open_in_memory(&test_config()).expect("open");
        let id = SaveId::new();
        store.put(&id, &sample_state()).expect("put1");

        let mut later = sample_state();
        later.current_location = "Crypt".into();
        store.put(&id, &later).expect("put2");

        let loaded = store.get(&id).expect("get").expect("Some");
        assert_eq!(loaded.current_location, "Crypt");
        assert_eq!(store.list_all().expect("list").len(), 1);
    }

    #[test]
    fn delete_reports_missing() {
        let store = SqliteSaveStore::open_in_memory(&test_config()).expect("open");
        let id = SaveId::new();
        store.put(&id, &sample_state()).expect("put");
        assert!(store.delete(&id).expect("delete"));
        assert!(!store.delete(&id).expect("delete again"));
        assert!(store.get(&id).expect("get").is_none());
    }

    #[test]
    fn list_all_summarises_each_save() {
        let store = SqliteSaveStore::open_in_memory(&test_config()).expect("open");
        let a = SaveId::new();
        let b = SaveId::new();
        store.put(&a, &sample_state()).expect("put");
        let mut other = sample_state();
        other.player.level = 4;
        store.put(&b, &other).expect("put");

        let saves = store.list_all().expect("list");
        assert_eq!(saves.len(), 2);
        assert_eq!(saves[&a].player_name, "Aria");
        assert_eq!(saves[&b].level, 4);
        assert!(saves[&b].last_saved_at.is_some());
    }

    #[test]
    fn corrupt_checksum_still_loads() {
        let store = SqliteSaveStore::open_in_memory(&test_config()).expect("open");
        let id = SaveId::new();
        store.put(&id, &sample_state()).expect("put");
        store
            .conn
            .lock()
            .execute(
                "UPDATE game_saves SET checksum = 'deadbeef' WHERE save_id = ?1",
                params![id.to_string()],
            )
            .expect("corrupt checksum");
        assert!(store.get(&id).expect("get").is_some());
    }

    #[test]
    fn undecodable_row_is_skipped_in_listing_but_errors_on_get() {
        let store = SqliteSaveStore::open_in_memory(&test_config()).expect("open");
        let id = SaveId::new();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO game_saves (save_id, data, saved_at) VALUES (?1, ?2, '')",
                params![id.to_string(), b"{not json".to_vec()],
            )
            .expect("insert");
        assert!(store.list_all().expect("list").is_empty());
        assert!(matches!(store.get(&id), Err(LoreError::Serialization(_))));
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("saves.db");
        let id = SaveId::new();
        {
            let store = SqliteSaveStore::open(&path, &test_config()).expect("open");
            store.put(&id, &sample_state()).expect("put");
            assert!(store.integrity_check().expect("check"));
        }
        let store = SqliteSaveStore::open(&path, &test_config()).expect("reopen");
        assert_eq!(store.get(&id).expect("get").expect("Some").player.xp, 42);
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32_hex(b"123456789"), "cbf43926");
    }
}
