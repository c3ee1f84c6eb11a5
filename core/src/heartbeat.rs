//! Periodic keepalive transmission
//!
//! The only background thread in the crate. It is started explicitly,
//! stopped through an atomic flag that also interrupts its sleep, and
//! joined with a bounded wait. Dropping a running [`Heartbeat`] stops it.

use crate::config::HeartbeatConfig;
use crate::transport::ByteTransport;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeartbeatError {
    #[error("Heartbeat already running")]
    AlreadyRunning,

    #[error("Heartbeat thread did not exit within the join timeout")]
    JoinTimeout,

    #[error("Failed to spawn heartbeat thread: {0}")]
    Spawn(String),
}

#[derive(Default)]
struct Shared {
    stop: AtomicBool,
    /// Set by the worker on exit
    finished: Mutex<bool>,
    wake: Condvar,
    exited: Condvar,
    beats: AtomicU64,
}

struct Running {
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

pub struct Heartbeat {
    config: HeartbeatConfig,
    running: Option<Running>,
    beats: Arc<AtomicU64>,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            running: None,
            beats: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Keepalives sent over the lifetime of this heartbeat
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
            + self
                .running
                .as_ref()
                .map_or(0, |r| r.shared.beats.load(Ordering::SeqCst))
    }

    /// Spawn the keepalive thread, transmitting on `transport`
    pub fn start<T>(&mut self, mut transport: T) -> Result<(), HeartbeatError>
    where
        T: ByteTransport + 'static,
    {
        if self.running.is_some() {
            return Err(HeartbeatError::AlreadyRunning);
        }

        let shared = Arc::new(Shared::default());
        let worker = Arc::clone(&shared);
        let interval = self.config.interval();
        let payload = self.config.payload.clone();

        let handle = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || {
                loop {
                    if worker.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    match transport.send(&payload) {
                        Ok(()) => {
                            worker.beats.fetch_add(1, Ordering::SeqCst);
                            tracing::trace!("Heartbeat sent");
                        }
                        Err(e) => tracing::debug!(error = %e, "Heartbeat send failed"),
                    }

                    let mut finished = worker.finished.lock();
                    if !worker.stop.load(Ordering::SeqCst) {
                        worker.wake.wait_for(&mut finished, interval);
                    }
                }
                *worker.finished.lock() = true;
                worker.exited.notify_all();
            })
            .map_err(|e| HeartbeatError::Spawn(e.to_string()))?;

        tracing::info!(interval_ms = self.config.interval_ms, "Heartbeat started");
        self.running = Some(Running { shared, handle });
        Ok(())
    }

    /// Signal the thread to stop and wait up to the join timeout for it
    ///
    /// Stopping an idle heartbeat is a no-op. On `JoinTimeout` the heartbeat
    /// stays registered so `stop` can be retried.
    pub fn stop(&mut self) -> Result<(), HeartbeatError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.shared.stop.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + self.config.join_timeout();
        {
            let mut finished = running.shared.finished.lock();
            running.shared.wake.notify_all();
            while !*finished {
                if running
                    .shared
                    .exited
                    .wait_until(&mut finished, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            if !*finished {
                drop(finished);
                tracing::warn!("Heartbeat thread did not stop in time");
                self.running = Some(running);
                return Err(HeartbeatError::JoinTimeout);
            }
        }

        self.beats
            .fetch_add(running.shared.beats.load(Ordering::SeqCst), Ordering::SeqCst);
        if running.handle.join().is_err() {
            tracing::warn!("Heartbeat thread panicked");
        }
        tracing::info!("Heartbeat stopped");
        Ok(())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Heartbeat dropped while still running");
        }
    }
}
