// Message store collaborator — the forum database as seen by sync
//
// The forum itself lives outside this crate. Sync only needs to read
// threads/messages changed since a timestamp and to write merged rows back.
// Timestamps are ISO-8601 UTC strings; they order lexicographically.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Store error: {0}")]
pub struct StoreError(pub String);

/// Thread row as carried in a package index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Message row as carried in `threads/<id>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub thread_id: String,
    pub timestamp: String,
    /// Older exports omit this; `timestamp` stands in
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    pub body: String,
}

impl ThreadSummary {
    /// Thread that has not been touched since it was created
    pub fn new(id: impl Into<String>, title: impl Into<String>, created_at: impl Into<String>) -> Self {
        let created_at = created_at.into();
        Self {
            id: id.into(),
            title: title.into(),
            updated_at: created_at.clone(),
            created_at,
        }
    }

    pub fn updated(mut self, at: impl Into<String>) -> Self {
        self.updated_at = at.into();
        self
    }
}

impl MessageRecord {
    /// Anonymous, never-edited message
    pub fn new(
        id: impl Into<String>,
        thread_id: impl Into<String>,
        timestamp: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            timestamp: timestamp.into(),
            updated_at: None,
            author: None,
            body: body.into(),
        }
    }

    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn edited(mut self, at: impl Into<String>) -> Self {
        self.updated_at = Some(at.into());
        self
    }

    /// Modification time used for filtering and last-writer-wins
    pub fn effective_updated_at(&self) -> &str {
        self.updated_at.as_deref().unwrap_or(&self.timestamp)
    }
}

/// One line of the sync audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub op: String,
    pub timestamp: u64,
    pub detail: String,
}

/// Store operations the sync engine depends on
pub trait MessageStore: Send + Sync {
    /// Threads with `updated_at >= since` and/or an id in `ids`
    fn list_threads(
        &self,
        since: Option<&str>,
        ids: Option<&[String]>,
    ) -> Result<Vec<ThreadSummary>, StoreError>;

    /// Messages of a thread with modification time `>= since`, oldest first
    fn list_messages(
        &self,
        thread_id: &str,
        since: Option<&str>,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    fn get_thread(&self, id: &str) -> Result<Option<ThreadSummary>, StoreError>;
    fn upsert_thread(&self, thread: &ThreadSummary) -> Result<(), StoreError>;

    fn get_message(&self, id: &str) -> Result<Option<MessageRecord>, StoreError>;
    fn upsert_message(&self, message: &MessageRecord) -> Result<(), StoreError>;

    fn append_audit_log(&self, op: &str, detail: &str) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Tables {
    threads: BTreeMap<String, ThreadSummary>,
    messages: BTreeMap<String, MessageRecord>,
    audit: Vec<AuditEntry>,
}

/// In-memory store for embedding and tests
#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread_count(&self) -> usize {
        self.tables.read().threads.len()
    }

    pub fn message_count(&self) -> usize {
        self.tables.read().messages.len()
    }

    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.tables.read().audit.clone()
    }

    /// Drop all threads and messages, keeping the audit trail
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.threads.clear();
        tables.messages.clear();
    }
}

impl MessageStore for MemoryMessageStore {
    fn list_threads(
        &self,
        since: Option<&str>,
        ids: Option<&[String]>,
    ) -> Result<Vec<ThreadSummary>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .threads
            .values()
            .filter(|t| since.map_or(true, |s| t.updated_at.as_str() >= s))
            .filter(|t| ids.map_or(true, |ids| ids.iter().any(|id| *id == t.id)))
            .cloned()
            .collect())
    }

    fn list_messages(
        &self,
        thread_id: &str,
        since: Option<&str>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let tables = self.tables.read();
        let mut messages: Vec<MessageRecord> = tables
            .messages
            .values()
            .filter(|m| m.thread_id == thread_id)
            .filter(|m| since.map_or(true, |s| m.effective_updated_at() >= s))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    fn get_thread(&self, id: &str) -> Result<Option<ThreadSummary>, StoreError> {
        Ok(self.tables.read().threads.get(id).cloned())
    }

    fn upsert_thread(&self, thread: &ThreadSummary) -> Result<(), StoreError> {
        self.tables
            .write()
            .threads
            .insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    fn get_message(&self, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        Ok(self.tables.read().messages.get(id).cloned())
    }

    fn upsert_message(&self, message: &MessageRecord) -> Result<(), StoreError> {
        self.tables
            .write()
            .messages
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    fn append_audit_log(&self, op: &str, detail: &str) -> Result<(), StoreError> {
        self.tables.write().audit.push(AuditEntry {
            op: op.to_string(),
            timestamp: crate::unix_secs(),
            detail: detail.to_string(),
        });
        Ok(())
    }
}
