//! Sync integration tests
//!
//! Two stations exchange forum deltas through package files, then vouch
//! for the result with a signed Merkle checkpoint.
//!
//! Run with: cargo test --test integration_sync_cycle

use hambbs_core::store::{MemoryMessageStore, MessageRecord, MessageStore, ThreadSummary};
use hambbs_core::sync::{SyncEngine, SyncPackage, SyncSummary};
use hambbs_core::trust::{diff_indices, merkle_root, CheckpointSigner, KeyCache};
use tempfile::tempdir;

fn thread(id: &str, title: &str, updated: &str) -> ThreadSummary {
    ThreadSummary::new(id, title, "2024-01-01T00:00:00").updated(updated)
}

fn message(id: &str, thread_id: &str, at: &str, author: &str, body: &str) -> MessageRecord {
    MessageRecord::new(id, thread_id, at, body).by(author).edited(at)
}

/// Merkle leaves: message ids with their modification times, in id order
fn leaves(store: &MemoryMessageStore) -> Vec<String> {
    let mut leaves = Vec::new();
    for t in store.list_threads(None, None).unwrap() {
        for m in store.list_messages(&t.id, None).unwrap() {
            leaves.push(format!("{}@{}", m.id, m.effective_updated_at()));
        }
    }
    leaves.sort();
    leaves
}

#[test]
fn test_two_station_exchange() -> anyhow::Result<()> {
    let dir = tempdir()?;

    let north = MemoryMessageStore::new();
    north.upsert_thread(&thread("t1", "Thread", "2024-01-01T10:00:00"))?;
    north.upsert_message(&message("m1", "t1", "2024-01-01T10:00:00", "alice", "hello"))?;

    let south = MemoryMessageStore::new();
    south.upsert_thread(&thread("t2", "Nets", "2024-01-02T09:00:00"))?;
    south.upsert_message(&message("m2", "t2", "2024-01-02T09:00:00", "bob", "net tonight"))?;

    let north_sync = SyncEngine::new(north.clone());
    let south_sync = SyncEngine::new(south.clone());

    let to_south = dir.path().join("north.tar.zst");
    let to_north = dir.path().join("south.tar.zst");
    north_sync.pull_to_file(&to_south, None, None)?;
    south_sync.pull_to_file(&to_north, None, None)?;

    assert_eq!(
        south_sync.push_file(&to_south)?,
        SyncSummary {
            threads_imported: 1,
            messages_imported: 1
        }
    );
    assert_eq!(north_sync.push_file(&to_north)?.messages_imported, 1);

    assert_eq!(north.thread_count(), 2);
    assert_eq!(south.message_count(), 2);
    assert_eq!(merkle_root(&leaves(&north)), merkle_root(&leaves(&south)));
    Ok(())
}

#[test]
fn test_incremental_edit_propagates() -> anyhow::Result<()> {
    let origin = MemoryMessageStore::new();
    origin.upsert_thread(&thread("t1", "Thread", "2024-01-01T10:00:00"))?;
    origin.upsert_message(&message("m1", "t1", "2024-01-01T10:00:00", "alice", "hello"))?;
    let replica = MemoryMessageStore::new();

    let origin_sync = SyncEngine::new(origin.clone());
    let replica_sync = SyncEngine::new(replica.clone());
    replica_sync.push(&origin_sync.pull(None, None)?)?;

    // Edit on the origin, then ship only what changed since the last sync
    origin.upsert_message(&message("m1", "t1", "2024-03-01T08:00:00", "alice", "hello, edited"))?;
    origin.upsert_thread(&thread("t1", "Thread", "2024-03-01T08:00:00"))?;
    let delta = origin_sync.pull(Some("2024-02-01T00:00:00"), None)?;
    assert_eq!(SyncPackage::unpack(&delta)?.message_count(), 1);

    let before = leaves(&replica);
    let summary = replica_sync.push(&delta)?;
    assert_eq!(summary.threads_imported, 0);
    assert_eq!(summary.messages_imported, 1);

    let m1 = replica.get_message("m1")?.expect("m1 replicated");
    assert_eq!(m1.body, "hello, edited");
    let t1 = replica.get_thread("t1")?.expect("t1 replicated");
    assert_eq!(t1.updated_at, "2024-03-01T08:00:00");

    // The diff points at the one leaf that changed
    let after = leaves(&replica);
    assert_eq!(diff_indices(&before, &merkle_root(&after)), vec![0]);

    // Replaying the same delta changes nothing
    assert_eq!(replica_sync.push(&delta)?, SyncSummary::default());
    Ok(())
}

#[test]
fn test_checkpoint_vouches_for_synced_state() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = MemoryMessageStore::new();
    store.upsert_thread(&thread("t1", "Thread", "2024-01-01T10:00:00"))?;
    store.upsert_message(&message("m1", "t1", "2024-01-01T10:00:00", "alice", "hello"))?;

    let signer = CheckpointSigner::generate();
    let checkpoint = signer.checkpoint("K1ABC", merkle_root(&leaves(&store)));

    let keys = KeyCache::open(dir.path().join("keycache.json"))?;
    keys.update("K1ABC", 1, &signer.public_key())?;

    let replica = MemoryMessageStore::new();
    SyncEngine::new(replica.clone()).push(&SyncEngine::new(store).pull(None, None)?)?;

    let replayed = hambbs_core::trust::Checkpoint {
        root: merkle_root(&leaves(&replica)),
        ..checkpoint.clone()
    };
    assert!(replayed.verify_with(&keys));

    // A tampered replica no longer matches the signed root
    replica.upsert_message(&message("m1", "t1", "2024-05-01T00:00:00", "mallory", "spam"))?;
    let tampered = hambbs_core::trust::Checkpoint {
        root: merkle_root(&leaves(&replica)),
        ..checkpoint
    };
    assert!(!tampered.verify_with(&keys));
    Ok(())
}

#[test]
fn test_truncated_file_leaves_store_untouched() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let store = MemoryMessageStore::new();
    store.upsert_thread(&thread("t1", "Thread", "2024-01-01T10:00:00"))?;
    store.upsert_message(&message("m1", "t1", "2024-01-01T10:00:00", "alice", "hello"))?;

    let path = dir.path().join("partial.tar.zst");
    SyncEngine::new(store).pull_to_file(&path, None, None)?;
    let bytes = std::fs::read(&path)?;
    std::fs::write(&path, &bytes[..bytes.len() / 3])?;

    let target = MemoryMessageStore::new();
    assert!(SyncEngine::new(target.clone()).push_file(&path).is_err());
    assert_eq!(target.thread_count(), 0);
    assert_eq!(target.message_count(), 0);
    assert_eq!(target.audit_log().len(), 1);
    Ok(())
}
