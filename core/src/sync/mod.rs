//! Delta synchronization of forum threads and messages
//!
//! `pull` exports threads changed since a timestamp as a compressed package;
//! `push` merges a package into the local store. Merging is total:
//!
//! - a thread is inserted only if absent
//! - a message replaces an existing one only if its `updated_at` is strictly
//!   newer (ties keep the local copy)
//! - every imported message bumps its thread's `updated_at` when newer
//!
//! The package is fully parsed before the store is touched, so a truncated
//! or corrupt package imports nothing. Both operations write an audit entry
//! before doing any work.

pub mod package;

pub use package::{package_id, validate_thread_id, SyncPackage};

use crate::store::atomic::write_atomic;
use crate::store::messages::{MessageStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Package archive error: {0}")]
    Archive(String),

    #[error("Malformed package: {0}")]
    Malformed(String),

    #[error("Invalid thread id: {0:?}")]
    InvalidThreadId(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub threads_imported: usize,
    pub messages_imported: usize,
}

pub struct SyncEngine<S> {
    store: S,
}

impl<S: MessageStore> SyncEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Export threads matching `since` and/or `thread_ids` as a package
    ///
    /// Empty filters are treated as absent.
    pub fn pull(
        &self,
        since: Option<&str>,
        thread_ids: Option<&[String]>,
    ) -> Result<Vec<u8>, SyncError> {
        let since = since.filter(|s| !s.is_empty());
        let thread_ids = thread_ids.filter(|ids| !ids.is_empty());

        tracing::info!(?since, "Starting pull");
        self.store.append_audit_log(
            "pull",
            &format!("since={:?} threads={:?}", since, thread_ids),
        )?;

        let index = self.store.list_threads(since, thread_ids)?;
        let mut threads = BTreeMap::new();
        for thread in &index {
            validate_thread_id(&thread.id)?;
            let messages = self.store.list_messages(&thread.id, since)?;
            threads.insert(thread.id.clone(), messages);
        }

        let package = SyncPackage { index, threads };
        let bytes = package.pack()?;
        tracing::info!(
            threads = package.index.len(),
            messages = package.message_count(),
            bytes = bytes.len(),
            "Pull completed"
        );
        Ok(bytes)
    }

    /// Merge a package into the store
    pub fn push(&self, bytes: &[u8]) -> Result<SyncSummary, SyncError> {
        let id = package_id(bytes);
        tracing::info!(package = %id, "Starting push");
        self.store
            .append_audit_log("push", &format!("package={} bytes={}", id, bytes.len()))?;

        let package = SyncPackage::unpack(bytes)?;
        let summary = self.merge(&package)?;
        tracing::info!(
            threads = summary.threads_imported,
            messages = summary.messages_imported,
            "Push completed"
        );
        Ok(summary)
    }

    /// `pull` straight to a file, replaced atomically; returns the package id
    pub fn pull_to_file(
        &self,
        path: &Path,
        since: Option<&str>,
        thread_ids: Option<&[String]>,
    ) -> Result<String, SyncError> {
        let bytes = self.pull(since, thread_ids)?;
        write_atomic(path, &bytes)?;
        Ok(package_id(&bytes))
    }

    pub fn push_file(&self, path: &Path) -> Result<SyncSummary, SyncError> {
        let bytes = std::fs::read(path)?;
        self.push(&bytes)
    }

    fn merge(&self, package: &SyncPackage) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();

        for thread in &package.index {
            if self.store.get_thread(&thread.id)?.is_none() {
                self.store.upsert_thread(thread)?;
                summary.threads_imported += 1;
            }

            let messages = package.threads.get(&thread.id).map(Vec::as_slice).unwrap_or(&[]);
            for incoming in messages {
                let incoming_at = incoming.effective_updated_at();
                if let Some(existing) = self.store.get_message(&incoming.id)? {
                    if existing.effective_updated_at() >= incoming_at {
                        tracing::trace!(id = %incoming.id, "Keeping local message");
                        continue;
                    }
                }

                let record = incoming.clone().edited(incoming_at);
                self.store.upsert_message(&record)?;
                summary.messages_imported += 1;

                if let Some(mut local) = self.store.get_thread(&thread.id)? {
                    if local.updated_at.as_str() < incoming_at {
                        local.updated_at = incoming_at.to_string();
                        self.store.upsert_thread(&local)?;
                    }
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::messages::{MemoryMessageStore, MessageRecord, ThreadSummary};
    use tempfile::tempdir;

    fn thread(id: &str, updated: &str) -> ThreadSummary {
        ThreadSummary::new(id, "Thread", "2024-01-01T00:00:00").updated(updated)
    }

    fn message(id: &str, thread_id: &str, updated: &str, body: &str) -> MessageRecord {
        MessageRecord::new(id, thread_id, "2024-01-01T00:00:00", body)
            .by("alice")
            .edited(updated)
    }

    fn seeded() -> MemoryMessageStore {
        let store = MemoryMessageStore::new();
        store.upsert_thread(&thread("t1", "2024-01-05T00:00:00")).unwrap();
        store
            .upsert_message(&message("m1", "t1", "2024-01-01T00:00:00", "hello"))
            .unwrap();
        store
    }

    #[test]
    fn test_push_into_empty_store() {
        let remote = SyncEngine::new(seeded());
        let pkg = remote.pull(None, None).unwrap();

        let local = SyncEngine::new(MemoryMessageStore::new());
        let summary = local.push(&pkg).unwrap();
        assert_eq!(
            summary,
            SyncSummary {
                threads_imported: 1,
                messages_imported: 1
            }
        );

        // Pulling back reproduces the same records
        let again = SyncPackage::unpack(&local.pull(None, None).unwrap()).unwrap();
        assert_eq!(again, SyncPackage::unpack(&pkg).unwrap());
    }

    #[test]
    fn test_push_is_idempotent() {
        let pkg = SyncEngine::new(seeded()).pull(None, None).unwrap();
        let local = SyncEngine::new(MemoryMessageStore::new());
        local.push(&pkg).unwrap();
        assert_eq!(local.push(&pkg).unwrap(), SyncSummary::default());
    }

    #[test]
    fn test_last_writer_wins() {
        let local = SyncEngine::new(seeded());

        let remote_store = MemoryMessageStore::new();
        remote_store.upsert_thread(&thread("t1", "2024-01-01T00:00:00")).unwrap();
        remote_store
            .upsert_message(&message("m1", "t1", "2024-02-01T00:00:00", "edited"))
            .unwrap();
        let newer = SyncEngine::new(remote_store.clone()).pull(None, None).unwrap();

        let summary = local.push(&newer).unwrap();
        assert_eq!(summary.messages_imported, 1);
        assert_eq!(summary.threads_imported, 0);
        let m1 = local.store().get_message("m1").unwrap().unwrap();
        assert_eq!(m1.body, "edited");
        // Thread bumped to the message's time
        let t1 = local.store().get_thread("t1").unwrap().unwrap();
        assert_eq!(t1.updated_at, "2024-02-01T00:00:00");
    }

    #[test]
    fn test_tie_keeps_local() {
        let local = SyncEngine::new(seeded());

        let remote_store = MemoryMessageStore::new();
        remote_store.upsert_thread(&thread("t1", "2024-01-05T00:00:00")).unwrap();
        remote_store
            .upsert_message(&message("m1", "t1", "2024-01-01T00:00:00", "conflicting"))
            .unwrap();
        let pkg = SyncEngine::new(remote_store).pull(None, None).unwrap();

        assert_eq!(local.push(&pkg).unwrap().messages_imported, 0);
        assert_eq!(local.store().get_message("m1").unwrap().unwrap().body, "hello");
    }

    #[test]
    fn test_older_thread_not_bumped_backwards() {
        let local = SyncEngine::new(seeded());
        let remote_store = MemoryMessageStore::new();
        remote_store.upsert_thread(&thread("t1", "2023-01-01T00:00:00")).unwrap();
        remote_store
            .upsert_message(&message("m2", "t1", "2024-01-03T00:00:00", "new"))
            .unwrap();
        let pkg = SyncEngine::new(remote_store).pull(None, None).unwrap();

        assert_eq!(local.push(&pkg).unwrap().messages_imported, 1);
        let t1 = local.store().get_thread("t1").unwrap().unwrap();
        assert_eq!(t1.updated_at, "2024-01-05T00:00:00");
    }

    #[test]
    fn test_pull_filters() {
        let store = seeded();
        store.upsert_thread(&thread("t2", "2024-03-01T00:00:00")).unwrap();
        store
            .upsert_message(&message("m2", "t2", "2024-03-01T00:00:00", "later"))
            .unwrap();
        let engine = SyncEngine::new(store);

        let recent = SyncPackage::unpack(&engine.pull(Some("2024-02-01"), None).unwrap()).unwrap();
        assert_eq!(recent.index.len(), 1);
        assert_eq!(recent.index[0].id, "t2");

        let ids = vec!["t1".to_string()];
        let picked = SyncPackage::unpack(&engine.pull(None, Some(&ids)).unwrap()).unwrap();
        assert_eq!(picked.index.len(), 1);
        assert_eq!(picked.threads["t1"].len(), 1);

        // Empty filters mean everything
        let empty: Vec<String> = Vec::new();
        let all = SyncPackage::unpack(&engine.pull(Some(""), Some(&empty)).unwrap()).unwrap();
        assert_eq!(all.index.len(), 2);
    }

    #[test]
    fn test_since_filters_messages_too() {
        let store = seeded();
        store.upsert_thread(&thread("t1", "2024-06-01T00:00:00")).unwrap();
        store
            .upsert_message(&message("m9", "t1", "2024-06-01T00:00:00", "fresh"))
            .unwrap();
        let engine = SyncEngine::new(store);

        let pkg = SyncPackage::unpack(&engine.pull(Some("2024-05-01"), None).unwrap()).unwrap();
        let ids: Vec<&str> = pkg.threads["t1"].iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m9"]);
    }

    #[test]
    fn test_corrupt_package_imports_nothing() {
        let pkg = SyncEngine::new(seeded()).pull(None, None).unwrap();
        let store = MemoryMessageStore::new();
        let local = SyncEngine::new(store.clone());

        assert!(local.push(&pkg[..pkg.len() - 8]).is_err());
        assert_eq!(store.thread_count(), 0);
        assert_eq!(store.message_count(), 0);
        // Still audited
        assert_eq!(store.audit_log()[0].op, "push");
    }

    #[test]
    fn test_audit_entries() {
        let store = seeded();
        let engine = SyncEngine::new(store.clone());
        let pkg = engine.pull(Some("2024-01-01"), None).unwrap();
        engine.push(&pkg).unwrap();

        let log = store.audit_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].op, "pull");
        assert!(log[0].detail.contains("2024-01-01"));
        assert_eq!(log[1].op, "push");
        assert!(log[1].detail.contains(&package_id(&pkg)));
    }

    #[test]
    fn test_missing_updated_at_uses_timestamp() {
        let remote = MemoryMessageStore::new();
        remote.upsert_thread(&thread("t1", "2024-01-05T00:00:00")).unwrap();
        let legacy = MessageRecord::new("m1", "t1", "2024-01-02T00:00:00", "legacy");
        remote.upsert_message(&legacy).unwrap();
        let pkg = SyncEngine::new(remote).pull(None, None).unwrap();

        let local = SyncEngine::new(MemoryMessageStore::new());
        local.push(&pkg).unwrap();
        let stored = local.store().get_message("m1").unwrap().unwrap();
        assert_eq!(stored.updated_at.as_deref(), Some("2024-01-02T00:00:00"));
    }

    #[test]
    fn test_file_helpers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.tar.zst");
        let id = SyncEngine::new(seeded()).pull_to_file(&path, None, None).unwrap();
        assert_eq!(id, package_id(&std::fs::read(&path).unwrap()));

        let local = SyncEngine::new(MemoryMessageStore::new());
        assert_eq!(local.push_file(&path).unwrap().messages_imported, 1);
        assert!(matches!(
            local.push_file(&dir.path().join("absent")),
            Err(SyncError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_thread_id_in_store() {
        let store = MemoryMessageStore::new();
        store.upsert_thread(&thread("../escape", "2024-01-01T00:00:00")).unwrap();
        assert!(matches!(
            SyncEngine::new(store).pull(None, None),
            Err(SyncError::InvalidThreadId(_))
        ));
    }
}
