// Simulated modem — in-process channel with fault injection
//
// Handles are cheap clones over shared state, so a test can keep one while
// the link layer owns another. `pair()` cross-wires two modems so that what
// one sends the other receives.

use super::{ByteTransport, TransportError, TransportType};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Faults {
    drop_sends: usize,
    corrupt_sends: usize,
    fail_sends: usize,
}

#[derive(Clone, Default)]
pub struct SimulatedModem {
    rx: Arc<Mutex<VecDeque<u8>>>,
    peer_rx: Option<Arc<Mutex<VecDeque<u8>>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    faults: Arc<Mutex<Faults>>,
    busy: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl SimulatedModem {
    /// A standalone modem; sends are only recorded
    pub fn new() -> Self {
        Self::default()
    }

    /// Two modems joined back to back
    pub fn pair() -> (Self, Self) {
        let mut a = Self::new();
        let mut b = Self::new();
        a.peer_rx = Some(Arc::clone(&b.rx));
        b.peer_rx = Some(Arc::clone(&a.rx));
        // Channel occupancy is shared by both ends
        b.busy = Arc::clone(&a.busy);
        (a, b)
    }

    /// Queue bytes as if they arrived over the air
    pub fn feed(&self, data: &[u8]) {
        self.rx.lock().extend(data.iter().copied());
    }

    /// Every buffer passed to `send`, including dropped ones
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    pub fn pending_rx(&self) -> usize {
        self.rx.lock().len()
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Subsequent receives report `Closed` once the buffer is drained
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Silently lose the next `n` transmissions
    pub fn drop_next_sends(&self, n: usize) {
        self.faults.lock().drop_sends += n;
    }

    /// Flip one byte in each of the next `n` transmissions
    pub fn corrupt_next_sends(&self, n: usize) {
        self.faults.lock().corrupt_sends += n;
    }

    /// Fail the next `n` sends with an I/O error
    pub fn fail_next_sends(&self, n: usize) {
        self.faults.lock().fail_sends += n;
    }
}

impl ByteTransport for SimulatedModem {
    fn transport_type(&self) -> TransportType {
        TransportType::Simulated
    }

    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut data = data.to_vec();
        {
            let mut faults = self.faults.lock();
            if faults.fail_sends > 0 {
                faults.fail_sends -= 1;
                return Err(TransportError::Io("simulated send failure".to_string()));
            }
            self.sent.lock().push(data.clone());
            if faults.drop_sends > 0 {
                faults.drop_sends -= 1;
                tracing::trace!("Simulated modem dropped {} bytes", data.len());
                return Ok(());
            }
            if faults.corrupt_sends > 0 && !data.is_empty() {
                faults.corrupt_sends -= 1;
                let mid = data.len() / 2;
                data[mid] ^= 0x5A;
            }
        }
        if let Some(peer) = &self.peer_rx {
            peer.lock().extend(data);
        }
        Ok(())
    }

    fn receive(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let mut rx = self.rx.lock();
        if rx.is_empty() && self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let n = rx.len().min(max);
        Ok(rx.drain(..n).collect())
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }
}
