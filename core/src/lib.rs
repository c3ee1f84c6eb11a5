// HamBBS Core — radio link transport and forum delta sync
//
// Everything a bulletin-board station needs between the modem and the
// message database: framing and error correction on the air, an ARQ link,
// a duty-cycle-aware transmit queue, offline sync packages, and the key
// material used to vouch for them.

pub mod config;
pub mod heartbeat;
pub mod hex_serde;
pub mod link;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod transport;
pub mod trust;

use std::time::{SystemTime, UNIX_EPOCH};

pub use config::{Config, ConfigError};
pub use heartbeat::{Heartbeat, HeartbeatError};
pub use link::{KissTnc, LinkError, PacketLink, ReliableLink, ResilienceCodec};
pub use scheduler::{LinkScheduler, RunOutcome, SchedulerError};
pub use store::{MemoryMessageStore, MessageRecord, MessageStore, ThreadSummary};
pub use sync::{SyncEngine, SyncError, SyncPackage, SyncSummary};
pub use transport::{ByteTransport, SerialModem, SharedTransport, TransportError, TransportType};
pub use trust::{Checkpoint, CheckpointSigner, KeyCache, TrustError};

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"info"`,
/// `"hambbs_core=debug"`) is used. Safe to call more than once.
pub fn init_logging(default_directive: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .try_init();
}

/// Wall-clock time in milliseconds since the Unix epoch
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Wall-clock time in seconds since the Unix epoch
pub fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
