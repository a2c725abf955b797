//! Durable identity → encoding store.
//!
//! The full mapping is persisted as a JSON blob on every mutation with a
//! write-temp-then-rename so a crash leaves either the old or the new
//! blob, never a torn one. A missing or corrupt blob degrades to an
//! empty store at load: availability wins, re-enrollment is cheap.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rollcall_core::Encoding;

use crate::error::{EngineError, Result};

pub struct EncodingStore {
    path: PathBuf,
    // BTreeMap keeps snapshot order stable (lexicographic by identity),
    // which pins the matcher's first-seen tie-break across runs.
    inner: Mutex<BTreeMap<String, Encoding>>,
}

impl EncodingStore {
    /// Open the store, restoring whatever blob exists at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = Mutex::new(load_blob(&path));
        Self { path, inner }
    }

    /// Insert or overwrite an identity's encoding and persist.
    pub fn put(&self, identity: &str, encoding: Encoding) -> Result<()> {
        let mut map = self.inner.lock().expect("store lock poisoned");
        map.insert(identity.to_string(), encoding);
        self.save(&map)
    }

    /// Atomically move an encoding from `old` to `new`.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let mut map = self.inner.lock().expect("store lock poisoned");
        if !map.contains_key(old) {
            return Err(EngineError::NotFound(old.to_string()));
        }
        if old == new {
            return Ok(());
        }
        if map.contains_key(new) {
            return Err(EngineError::Conflict(new.to_string()));
        }
        match map.remove(old) {
            Some(encoding) => {
                map.insert(new.to_string(), encoding);
                self.save(&map)
            }
            None => Err(EngineError::NotFound(old.to_string())),
        }
    }

    /// Remove an identity. Absent identities are a successful no-op.
    pub fn remove(&self, identity: &str) -> Result<()> {
        let mut map = self.inner.lock().expect("store lock poisoned");
        if map.remove(identity).is_none() {
            return Ok(());
        }
        self.save(&map)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .contains_key(identity)
    }

    /// Copy-on-read snapshot of the whole gallery; later mutations do not
    /// show through.
    pub fn all(&self) -> Vec<(String, Encoding)> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .iter()
            .map(|(name, enc)| (name.clone(), enc.clone()))
            .collect()
    }

    /// Enrolled identities in snapshot order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the full mapping to a sibling temp file, then rename over
    /// the blob. Called with the map lock held so saves are serialized.
    fn save(&self, map: &BTreeMap<String, Encoding>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = serde_json::to_vec(map)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn load_blob(path: &Path) -> BTreeMap<String, Encoding> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no encoding blob yet, starting empty");
            return BTreeMap::new();
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "encoding blob unreadable, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_slice::<BTreeMap<String, Encoding>>(&bytes) {
        Ok(map) => {
            tracing::info!(path = %path.display(), identities = map.len(), "encoding store loaded");
            map
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "encoding blob corrupt, starting empty");
            BTreeMap::new()
        }
    }
}
