//! Last captured [`GitState`] per working directory (`git-state.json`).

use crate::{read_json_or_default, write_json_atomic, CacheDir, StorageError, GIT_STATE_FILE};
use memlink_core::GitState;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub struct GitStateStore {
    path: PathBuf,
}

impl GitStateStore {
    pub fn new(cache_dir: &CacheDir) -> Self {
        Self {
            path: cache_dir.path(GIT_STATE_FILE),
        }
    }

    pub fn load(&self, cwd: &str) -> Option<GitState> {
        self.load_all().remove(cwd)
    }

    pub fn save(&self, cwd: &str, state: &GitState) -> Result<(), StorageError> {
        let mut states = self.load_all();
        states.insert(cwd.to_string(), state.clone());
        write_json_atomic(&self.path, &states)
    }

    fn load_all(&self) -> BTreeMap<String, GitState> {
        read_json_or_default(&self.path)
    }
}
