// Trust module — key cache, Merkle roots and signed checkpoints

pub mod checkpoint;
pub mod keycache;
pub mod merkle;

pub use checkpoint::{sign_checkpoint, verify_checkpoint, Checkpoint, CheckpointSigner};
pub use keycache::{KeyCache, KeyEntry};
pub use merkle::{diff_indices, merkle_root, Hash, EMPTY_ROOT};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("Key cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key cache serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}
