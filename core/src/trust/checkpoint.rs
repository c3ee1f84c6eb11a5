// Checkpoint signing — Ed25519 over a 32-byte Merkle root

use super::keycache::KeyCache;
use super::merkle::Hash;
use super::TrustError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

pub const SIGNATURE_LEN: usize = 64;

/// Sign `root` with a raw 32-byte Ed25519 secret key
pub fn sign_checkpoint(private_key: &[u8], root: &Hash) -> Result<[u8; SIGNATURE_LEN], TrustError> {
    let signer = CheckpointSigner::from_bytes(private_key)?;
    Ok(signer.sign_root(root))
}

/// Check a detached signature over `root`
///
/// Malformed keys or signatures are simply invalid, never an error.
pub fn verify_checkpoint(public_key: &[u8], root: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(root, &signature).is_ok()
}

/// Signing identity for checkpoints
#[derive(Clone)]
pub struct CheckpointSigner {
    signing_key: SigningKey,
}

impl CheckpointSigner {
    /// Generate a new random key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut secret_key_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut secret_key_bytes);
        let signing_key = SigningKey::from_bytes(&secret_key_bytes);
        secret_key_bytes.zeroize();
        Self { signing_key }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TrustError> {
        let mut secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| TrustError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len())))?;
        let signing_key = SigningKey::from_bytes(&secret);
        secret.zeroize();
        Ok(Self { signing_key })
    }

    /// Secret key bytes, wiped on drop
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.signing_key.to_bytes().to_vec())
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Blake3 fingerprint of the public key, hex encoded
    pub fn fingerprint(&self) -> String {
        hex::encode(blake3::hash(&self.public_key()).as_bytes())
    }

    pub fn sign_root(&self, root: &Hash) -> [u8; SIGNATURE_LEN] {
        self.signing_key.sign(root).to_bytes()
    }

    /// Signed checkpoint claiming `identity`
    pub fn checkpoint(&self, identity: &str, root: Hash) -> Checkpoint {
        Checkpoint {
            identity: identity.to_string(),
            root,
            signature: self.sign_root(&root).to_vec(),
        }
    }
}

/// A Merkle root asserted by an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub identity: String,
    #[serde(with = "crate::hex_serde")]
    pub root: Hash,
    #[serde(with = "crate::hex_serde")]
    pub signature: Vec<u8>,
}

impl Checkpoint {
    pub fn verify(&self, public_key: &[u8]) -> bool {
        verify_checkpoint(public_key, &self.root, &self.signature)
    }

    /// Verify against the cached key for the claimed identity
    pub fn verify_with(&self, cache: &KeyCache) -> bool {
        match cache.get(&self.identity) {
            Some(key) => self.verify(&key),
            None => {
                tracing::debug!(identity = %self.identity, "No cached key for checkpoint");
                false
            }
        }
    }
}
