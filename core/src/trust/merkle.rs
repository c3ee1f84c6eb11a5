// Merkle root over SHA-256
//
// Leaves are hashed, then adjacent pairs are hashed level by level. An odd
// level duplicates its last node. The empty set has an all-zero root.

use sha2::{Digest, Sha256};

pub type Hash = [u8; 32];

/// Root of the empty leaf set
pub const EMPTY_ROOT: Hash = [0u8; 32];

fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

pub fn merkle_root<L: AsRef<[u8]>>(leaves: &[L]) -> Hash {
    let mut level: Vec<Hash> = leaves.iter().map(|leaf| sha256(leaf.as_ref())).collect();
    if level.is_empty() {
        return EMPTY_ROOT;
    }
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            if let Some(&last) = level.last() {
                level.push(last);
            }
        }
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Indices of local leaves whose single-leaf root differs from `remote_root`
///
/// Each leaf is compared on its own against the whole remote root, so an
/// index only ever matches when the remote side holds exactly that one leaf.
/// This is an equality check, not a subtree walk: for multi-leaf trees every
/// index is reported.
// TODO: replace with a child-hash exchange once the sync protocol carries
// interior nodes, so divergence can be localized per subtree.
pub fn diff_indices<L: AsRef<[u8]>>(local: &[L], remote_root: &Hash) -> Vec<usize> {
    local
        .iter()
        .enumerate()
        .filter(|(_, leaf)| merkle_root(std::slice::from_ref(*leaf)) != *remote_root)
        .map(|(i, _)| i)
        .collect()
}
