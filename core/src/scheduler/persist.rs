// Queue persistence — JSON array replaced atomically, plus a sibling
// state file holding the last transmission time

use super::queue::{PriorityQueue, QueueItem};
use super::SchedulerError;
use crate::store::atomic::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pacing state that must outlive the process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingState {
    /// Unix ms of the last successful transmission
    #[serde(default)]
    pub last_tx_ms: Option<u64>,
}

/// `queue.json` → `queue.json.state`
pub fn state_path(queue_path: &Path) -> PathBuf {
    let mut name = queue_path.as_os_str().to_os_string();
    name.push(".state");
    PathBuf::from(name)
}

/// Load a persisted queue; a missing file is an empty queue
pub fn load(path: &Path) -> Result<PriorityQueue, SchedulerError> {
    if !path.exists() {
        return Ok(PriorityQueue::new());
    }
    let bytes = std::fs::read(path)?;
    let items: Vec<QueueItem> = serde_json::from_slice(&bytes)?;
    tracing::info!(items = items.len(), path = %path.display(), "Restored transmit queue");
    Ok(PriorityQueue::from_items(items))
}

/// Write the whole queue in service order
pub fn save(path: &Path, queue: &PriorityQueue) -> Result<(), SchedulerError> {
    let items: Vec<&QueueItem> = queue.iter().collect();
    let json = serde_json::to_vec_pretty(&items)?;
    write_atomic(path, &json)?;
    Ok(())
}

/// Load the pacing state stored next to the queue at `queue_path`
///
/// A queue written before the state file existed restores as "never sent".
pub fn load_state(queue_path: &Path) -> Result<PacingState, SchedulerError> {
    let path = state_path(queue_path);
    if !path.exists() {
        return Ok(PacingState::default());
    }
    let bytes = std::fs::read(&path)?;
    let state: PacingState = serde_json::from_slice(&bytes)?;
    tracing::debug!(last_tx_ms = ?state.last_tx_ms, "Restored pacing state");
    Ok(state)
}

pub fn save_state(queue_path: &Path, state: &PacingState) -> Result<(), SchedulerError> {
    let json = serde_json::to_vec_pretty(state)?;
    write_atomic(&state_path(queue_path), &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let q = load(&dir.path().join("queue.json")).unwrap();
        assert!(q.is_empty());
    }

    #[test]
    fn test_save_load_restores_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let mut q = PriorityQueue::new();
        q.push(b"bulk".to_vec(), 50);
        q.push(b"urgent".to_vec(), 1);
        let mut bulk = q.remove(0).unwrap();
        bulk.attempts = 3;
        bulk.next_attempt_ms = 1_700_000_000_000;
        q.requeue(bulk);
        save(&path, &q).unwrap();

        let restored = load(&path).unwrap();
        let items: Vec<&QueueItem> = restored.iter().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].payload, b"urgent");
        assert_eq!(items[1].payload, b"bulk");
        assert_eq!(items[1].attempts, 3);
        assert_eq!(items[1].next_attempt_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, b"[{\"priority\": 1").unwrap();
        assert!(matches!(load(&path), Err(SchedulerError::Serde(_))));
    }

    #[test]
    fn test_state_sits_beside_queue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        assert_eq!(state_path(&path), dir.path().join("queue.json.state"));

        assert_eq!(load_state(&path).unwrap(), PacingState::default());
        let state = PacingState {
            last_tx_ms: Some(1_700_000_000_000),
        };
        save_state(&path, &state).unwrap();
        assert_eq!(load_state(&path).unwrap(), state);
        // The queue file itself is untouched
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_state_without_timestamp_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(state_path(&path), b"{}").unwrap();
        assert_eq!(load_state(&path).unwrap().last_tx_ms, None);
    }
}
