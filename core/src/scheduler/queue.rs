// Transmit queue — priority order with retry metadata
//
// Items are ordered by (priority, insertion id); lower priority values go
// first. An item is only eligible once `next_attempt_ms` has passed, so a
// backed-off item never blocks the items behind it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default priority for ordinary traffic
pub const DEFAULT_PRIORITY: i32 = 10;

/// One queued transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Insertion order; reassigned from file order on reload
    #[serde(skip)]
    pub id: u64,
    pub priority: i32,
    #[serde(rename = "item", with = "crate::hex_serde")]
    pub payload: Vec<u8>,
    pub attempts: u32,
    /// Unix milliseconds; 0 means immediately
    #[serde(rename = "next_attempt")]
    pub next_attempt_ms: u64,
}

#[derive(Debug, Default)]
pub struct PriorityQueue {
    items: BTreeMap<(i32, u64), QueueItem>,
    next_id: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from items in their persisted order
    pub fn from_items(items: Vec<QueueItem>) -> Self {
        let mut queue = Self::new();
        for mut item in items {
            item.id = queue.next_id;
            queue.next_id += 1;
            queue.items.insert((item.priority, item.id), item);
        }
        queue
    }

    /// Enqueue a new payload, eligible immediately
    pub fn push(&mut self, payload: Vec<u8>, priority: i32) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.items.insert(
            (priority, id),
            QueueItem {
                id,
                priority,
                payload,
                attempts: 0,
                next_attempt_ms: 0,
            },
        );
        id
    }

    /// Put a popped item back, keeping its place among equal priorities
    pub fn requeue(&mut self, item: QueueItem) {
        self.items.insert((item.priority, item.id), item);
    }

    /// Remove the first item whose `next_attempt_ms` has passed
    pub fn pop_eligible(&mut self, now_ms: u64) -> Option<QueueItem> {
        let key = self
            .items
            .iter()
            .find(|(_, item)| item.next_attempt_ms <= now_ms)
            .map(|(key, _)| *key)?;
        self.items.remove(&key)
    }

    /// Remove an item by id regardless of eligibility
    pub fn remove(&mut self, id: u64) -> Option<QueueItem> {
        let key = self.items.keys().find(|(_, item_id)| *item_id == id).copied()?;
        self.items.remove(&key)
    }

    /// Earliest time any item becomes eligible
    pub fn next_eligible_ms(&self) -> Option<u64> {
        self.items.values().map(|item| item.next_attempt_ms).min()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in service order
    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.values()
    }
}
