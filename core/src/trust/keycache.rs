// Versioned public-key cache
//
// One entry per identity. An update is accepted only when it carries a
// strictly higher version than what is cached; stale or replayed updates
// are ignored. Every accepted update rewrites the backing file atomically
// while the write lock is held.

use super::TrustError;
use crate::store::atomic::write_atomic;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub version: u64,
    #[serde(with = "crate::hex_serde")]
    pub key: Vec<u8>,
}

pub struct KeyCache {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, KeyEntry>>,
}

impl KeyCache {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open a cache backed by `path`, loading it if it exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TrustError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(identities = entries.len(), path = %path.display(), "Key cache loaded");
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
        })
    }

    /// Public key for `identity`, if known
    pub fn get(&self, identity: &str) -> Option<Vec<u8>> {
        self.entries.read().get(identity).map(|e| e.key.clone())
    }

    pub fn entry(&self, identity: &str) -> Option<KeyEntry> {
        self.entries.read().get(identity).cloned()
    }

    /// Store `key` if `version` is newer than the cached one
    ///
    /// Returns `Ok(false)` for a stale version; that is not an error.
    pub fn update(&self, identity: &str, version: u64, key: &[u8]) -> Result<bool, TrustError> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(identity) {
            if existing.version >= version {
                tracing::debug!(
                    identity,
                    cached = existing.version,
                    offered = version,
                    "Ignoring stale key update"
                );
                return Ok(false);
            }
        }

        let previous = entries.insert(
            identity.to_string(),
            KeyEntry {
                version,
                key: key.to_vec(),
            },
        );
        if let Err(e) = self.save(&entries) {
            // Keep memory and disk in agreement
            match previous {
                Some(prev) => entries.insert(identity.to_string(), prev),
                None => entries.remove(identity),
            };
            return Err(e);
        }
        tracing::info!(identity, version, "Key cache updated");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn save(&self, entries: &BTreeMap<String, KeyEntry>) -> Result<(), TrustError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(entries)?;
        write_atomic(path, &json)?;
        Ok(())
    }
}
