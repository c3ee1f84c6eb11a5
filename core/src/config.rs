//! Link and sync configuration
//!
//! One `Config` value is built at startup and handed to every component
//! that needs it. Stored as JSON; a missing file yields defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors that can occur during config validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid MTU: must be > 0")]
    InvalidMtu,

    #[error("Invalid ARQ window: must be 1-64, got {0}")]
    InvalidWindow(usize),

    #[error("Invalid FEC parity: must be 1-254, got {0}")]
    InvalidParity(usize),

    #[error("Invalid backoff: base {base}s exceeds cap {cap}s")]
    InvalidBackoff { base: u64, cap: u64 },

    #[error("Invalid heartbeat interval: must be > 0")]
    InvalidHeartbeat,

    #[error("Invalid serial baud rate: must be > 0")]
    InvalidBaudRate,
}

// ============================================================================
// SECTIONS
// ============================================================================

/// Framing, FEC and ARQ parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Maximum payload bytes per ARQ segment
    pub mtu: usize,
    /// Maximum unacknowledged segments in flight
    pub window: usize,
    /// Bounded wait for an acknowledgment, in milliseconds
    pub ack_timeout_ms: u64,
    /// Retransmissions of an unacknowledged segment before giving up
    pub max_retransmits: u32,
    /// Reed–Solomon parity symbols per codeword
    pub fec_parity: usize,
    /// Interleaver row width; 0 or 1 disables interleaving
    pub interleave_depth: usize,
}

impl LinkConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mtu: 256,
            window: 4,
            ack_timeout_ms: 2_000,
            max_retransmits: 5,
            fec_parity: crate::link::DEFAULT_FEC_PARITY,
            interleave_depth: 1,
        }
    }
}

/// Duty-cycle pacing and retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum spacing between any two transmissions
    pub duty_cycle_secs: u64,
    /// Deferral when the channel reports busy (never longer than the duty cycle)
    pub busy_deferral_secs: u64,
    /// Backoff after the first failure; doubles per attempt
    pub backoff_base_secs: u64,
    /// Upper bound on backoff
    pub backoff_cap_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            duty_cycle_secs: 60,
            busy_deferral_secs: 5,
            backoff_base_secs: 60,
            backoff_cap_secs: 3_600,
        }
    }
}

/// Keepalive transmission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub join_timeout_ms: u64,
    pub payload: Vec<u8>,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            join_timeout_ms: 1_000,
            payload: vec![0x00],
        }
    }
}

/// VaraHF-style TCP modem endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl ModemConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8300,
            timeout_ms: 10_000,
        }
    }
}

/// Serial TNC or radio attached to a local port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// Rates tried in order by `SerialModem::negotiate_baud`, fastest first
    pub baud_candidates: Vec<u32>,
    pub timeout_ms: u64,
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 9_600,
            baud_candidates: vec![57_600, 38_400, 19_200, 9_600],
            timeout_ms: 1_000,
        }
    }
}

/// Durable state locations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Persisted transmit queue; `None` keeps the queue in memory
    pub queue_path: Option<PathBuf>,
    /// Persisted public-key cache; `None` keeps keys in memory
    pub keycache_path: Option<PathBuf>,
}

// ============================================================================
// ROOT CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub scheduler: SchedulerConfig,
    pub heartbeat: HeartbeatConfig,
    pub modem: ModemConfig,
    pub serial: SerialConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load config from a JSON file, falling back to defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        crate::store::atomic::write_atomic(path, &contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Reject combinations the link layer cannot run with
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.link.mtu == 0 {
            return Err(ConfigError::InvalidMtu);
        }
        if self.link.window == 0 || self.link.window > crate::link::arq::MAX_WINDOW {
            return Err(ConfigError::InvalidWindow(self.link.window));
        }
        if self.link.fec_parity == 0 || self.link.fec_parity >= crate::link::fec::CODEWORD_LEN {
            return Err(ConfigError::InvalidParity(self.link.fec_parity));
        }
        if self.scheduler.backoff_base_secs > self.scheduler.backoff_cap_secs {
            return Err(ConfigError::InvalidBackoff {
                base: self.scheduler.backoff_base_secs,
                cap: self.scheduler.backoff_cap_secs,
            });
        }
        if self.heartbeat.interval_ms == 0 {
            return Err(ConfigError::InvalidHeartbeat);
        }
        if self.serial.baud_rate == 0 || self.serial.baud_candidates.contains(&0) {
            return Err(ConfigError::InvalidBaudRate);
        }
        Ok(())
    }
}
