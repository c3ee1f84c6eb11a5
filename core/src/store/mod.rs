// Store module — durable file writes and the message store seen by sync

pub mod atomic;
pub mod messages;

pub use atomic::write_atomic;
pub use messages::{AuditEntry, MemoryMessageStore, MessageRecord, MessageStore, StoreError, ThreadSummary};
