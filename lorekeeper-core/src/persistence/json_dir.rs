//! Directory-of-JSON-files save store.
//!
//! Layout: `<dir>/<save_id>.json`, pretty-printed. Writes go to a temporary
//! sibling first and are renamed into place so a crash never leaves a
//! half-written save behind.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{stamped, SaveStore, SaveSummary};
use crate::error::{LoreError, Result};
use crate::state::GameState;
use crate::types::SaveId;

/// Save store writing one JSON file per save.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Use `dir` as the save directory, creating it if missing.
    ///
    /// # Errors
    /// Returns [`LoreError::Io`] if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(path = %dir.display(), "JSON save directory opened");
        Ok(Self { dir })
    }

    fn path_for(&self, id: &SaveId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read(path: &Path) -> Result<GameState> {
        let data = fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| LoreError::Serialization(format!("{}: {e}", path.display())))
    }
}

impl SaveStore for JsonDirStore {
    fn get(&self, id: &SaveId) -> Result<Option<GameState>> {
        match Self::read(&self.path_for(id)) {
            Ok(state) => Ok(Some(state)),
            Err(LoreError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&self, id: &SaveId, state: &GameState) -> Result<GameState> {
        let stored = stamped(state);
        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| LoreError::Serialization(e.to_string()))?;
        let path = self.path_for(id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &path)?;
        debug!(save_id = %id, bytes = json.len(), "Saved game");
        Ok(stored)
    }

    fn delete(&self, id: &SaveId) -> Result<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_all(&self) -> Result<BTreeMap<SaveId, SaveSummary>> {
        let mut saves = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<SaveId>().ok())
            else {
                warn!(path = %path.display(), "Skipping file with invalid save id");
                continue;
            };
            match Self::read(&path) {
                Ok(state) => {
                    saves.insert(id, SaveSummary::from(&state));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Error loading save file"),
            }
        }
        Ok(saves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;

    fn state() -> GameState {
        GameState::new(Player::new("Aria"), "You wake up.", "start")
    }

    #[test]
    fn put_get_delete_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDirStore::open(dir.path()).expect("open");
        let id = SaveId::new();

        assert!(store.get(&id).expect("get").is_none());
        store.put(&id, &state()).expect("put");
        assert!(dir.path().join(format!("{id}.json")).exists());

        let loaded = store.get(&id).expect("get").expect("Some");
        assert!(loaded.same_progress(&state()));
        assert!(loaded.last_saved_at.is_some());

        assert!(store.delete(&id).expect("delete"));
        assert!(!store.delete(&id).expect("delete again"));
    }

    #[test]
    fn listing_skips_foreign_and_broken_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonDirStore::open(dir.path()).expect("open");
        let id = SaveId::new();
        store.put(&id, &state()).expect("put");

        fs::write(dir.path().join("notes.txt"), "hello").expect("write");
        fs::write(dir.path().join("not-a-uuid.json"), "{}").expect("write");
        fs::write(dir.path().join(format!("{}.json", SaveId::new())), "{broken").expect("write");

        let saves = store.list_all().expect("list");
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[&id].location, "start");
    }
}
