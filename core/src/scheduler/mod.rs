// Transmission scheduler — duty-cycle pacing, busy deferral, retry backoff
//
// Cooperative: nothing here owns a thread. The caller drives `run_once`
// from its own loop or timer; each call makes at most one transmission.

pub mod persist;
pub mod queue;

pub use queue::{PriorityQueue, QueueItem, DEFAULT_PRIORITY};

use crate::config::SchedulerConfig;
use crate::transport::{ByteTransport, SharedTransport, TransportError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Transmit callback: hands one queued payload to the radio
pub type SendFn = Box<dyn FnMut(&[u8]) -> Result<(), TransportError> + Send>;
/// Channel-busy predicate
pub type BusyFn = Box<dyn Fn() -> bool + Send>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// What a single `run_once` step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was eligible
    Idle,
    /// Channel busy; item pushed back without counting an attempt
    Busy { retry_at_ms: u64 },
    /// Too soon after the previous transmission
    Paced { retry_at_ms: u64 },
    Sent { id: u64 },
    /// Send failed; item backed off
    Failed { attempts: u32, retry_at_ms: u64 },
}

pub struct LinkScheduler {
    config: SchedulerConfig,
    queue: PriorityQueue,
    send_fn: SendFn,
    busy_fn: Option<BusyFn>,
    last_tx_ms: Option<u64>,
    path: Option<PathBuf>,
}

impl LinkScheduler {
    /// In-memory scheduler
    pub fn new(config: SchedulerConfig, send_fn: SendFn, busy_fn: Option<BusyFn>) -> Self {
        Self {
            config,
            queue: PriorityQueue::new(),
            send_fn,
            busy_fn,
            last_tx_ms: None,
            path: None,
        }
    }

    /// Scheduler whose queue survives restarts
    ///
    /// Restores any queue already at `path` and rewrites it after every
    /// mutation. The last transmission time is kept in a sibling file so
    /// duty-cycle pacing holds across a restart.
    pub fn durable(
        path: impl AsRef<Path>,
        config: SchedulerConfig,
        send_fn: SendFn,
        busy_fn: Option<BusyFn>,
    ) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        let queue = persist::load(&path)?;
        let state = persist::load_state(&path)?;
        Ok(Self {
            config,
            queue,
            send_fn,
            busy_fn,
            last_tx_ms: state.last_tx_ms,
            path: Some(path),
        })
    }

    /// Scheduler transmitting on a shared transport, using its busy signal
    pub fn for_transport<T: ByteTransport + 'static>(
        config: SchedulerConfig,
        transport: SharedTransport<T>,
    ) -> Self {
        let mut tx = transport.clone();
        let send_fn: SendFn = Box::new(move |payload| tx.send(payload));
        let busy_fn: BusyFn = Box::new(move || transport.is_busy());
        Self::new(config, send_fn, Some(busy_fn))
    }

    /// Enqueue a payload; returns its queue id
    pub fn queue(&mut self, payload: Vec<u8>, priority: i32) -> Result<u64, SchedulerError> {
        let id = self.queue.push(payload, priority);
        tracing::debug!(id, priority, queued = self.queue.len(), "Queued transmission");
        self.persist()?;
        Ok(id)
    }

    /// Drop a queued item out-of-band
    pub fn remove(&mut self, id: u64) -> Result<Option<QueueItem>, SchedulerError> {
        let removed = self.queue.remove(id);
        if removed.is_some() {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Snapshot of queued items in service order
    pub fn pending(&self) -> Vec<QueueItem> {
        self.queue.iter().cloned().collect()
    }

    pub fn last_transmission_ms(&self) -> Option<u64> {
        self.last_tx_ms
    }

    pub fn run_once(&mut self) -> Result<RunOutcome, SchedulerError> {
        self.run_once_at(crate::unix_millis())
    }

    /// One scheduling step at an explicit clock reading
    pub fn run_once_at(&mut self, now_ms: u64) -> Result<RunOutcome, SchedulerError> {
        let Some(mut item) = self.queue.pop_eligible(now_ms) else {
            return Ok(RunOutcome::Idle);
        };

        let window_ms = self.config.duty_cycle_secs.saturating_mul(1_000);

        if self.busy_fn.as_ref().map_or(false, |busy| busy()) {
            let deferral_ms = self.config.busy_deferral_secs.saturating_mul(1_000).min(window_ms);
            item.next_attempt_ms = now_ms.saturating_add(deferral_ms);
            let retry_at_ms = item.next_attempt_ms;
            tracing::debug!(id = item.id, retry_at_ms, "Channel busy, deferring");
            self.queue.requeue(item);
            self.persist()?;
            return Ok(RunOutcome::Busy { retry_at_ms });
        }

        if let Some(last) = self.last_tx_ms {
            if now_ms.saturating_sub(last) < window_ms {
                item.next_attempt_ms = now_ms.saturating_add(window_ms);
                let retry_at_ms = item.next_attempt_ms;
                tracing::trace!(id = item.id, retry_at_ms, "Duty cycle, pacing");
                self.queue.requeue(item);
                self.persist()?;
                return Ok(RunOutcome::Paced { retry_at_ms });
            }
        }

        match (self.send_fn)(&item.payload) {
            Ok(()) => {
                self.last_tx_ms = Some(now_ms);
                tracing::info!(
                    id = item.id,
                    priority = item.priority,
                    len = item.payload.len(),
                    "Transmitted queued item"
                );
                self.persist_state()?;
                self.persist()?;
                Ok(RunOutcome::Sent { id: item.id })
            }
            Err(e) => {
                item.attempts += 1;
                let delay_ms = self.backoff_secs(item.attempts).saturating_mul(1_000);
                item.next_attempt_ms = now_ms.saturating_add(delay_ms);
                let attempts = item.attempts;
                let retry_at_ms = item.next_attempt_ms;
                tracing::warn!(
                    id = item.id,
                    attempts,
                    delay_ms,
                    error = %e,
                    "Transmission failed, backing off"
                );
                self.queue.requeue(item);
                self.persist()?;
                Ok(RunOutcome::Failed {
                    attempts,
                    retry_at_ms,
                })
            }
        }
    }

    /// min(base · 2^attempts, cap)
    fn backoff_secs(&self, attempts: u32) -> u64 {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        self.config
            .backoff_base_secs
            .saturating_mul(factor)
            .min(self.config.backoff_cap_secs)
    }

    fn persist(&self) -> Result<(), SchedulerError> {
        match &self.path {
            Some(path) => persist::save(path, &self.queue),
            None => Ok(()),
        }
    }

    fn persist_state(&self) -> Result<(), SchedulerError> {
        match &self.path {
            Some(path) => persist::save_state(
                path,
                &persist::PacingState {
                    last_tx_ms: self.last_tx_ms,
                },
            ),
            None => Ok(()),
        }
    }
}
