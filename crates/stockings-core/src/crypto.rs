//! Sealing of identity secrets at rest using ChaCha20-Poly1305 AEAD
//!
//! The private key of a local identity never touches disk in the clear. It is
//! sealed under a key derived (HKDF-SHA256) from a random secret stored next
//! to it, mirroring the key + passphrase pair an identity is made of.
//!
//! # Wire Format
//!
//! Sealed data format: `[nonce (12 bytes)] + [ciphertext + auth_tag (16 bytes)]`

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::error::StockingsError;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Length of a freshly generated identity secret
pub const SECRET_SIZE: usize = 32;

const HKDF_SALT: &[u8] = b"stockings:identity:v1";
const HKDF_INFO: &[u8] = b"private-key-seal";

/// Cipher keyed from an identity secret.
///
/// ```
/// use stockings_core::crypto::SealingKey;
///
/// let secret = SealingKey::generate_secret();
/// let key = SealingKey::derive(&secret);
///
/// let sealed = key.seal(b"private key bytes").unwrap();
/// assert_eq!(key.open(&sealed).unwrap(), b"private key bytes");
/// ```
pub struct SealingKey {
    cipher: ChaCha20Poly1305,
}

impl SealingKey {
    /// Derive the sealing key from an identity secret.
    pub fn derive(secret: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret);
        let mut key = [0u8; 32];
        // 32 bytes is far below the HKDF-SHA256 output limit
        hk.expand(HKDF_INFO, &mut key)
            .unwrap_or_else(|_| unreachable!("32-byte HKDF output is always valid"));
        Self {
            cipher: ChaCha20Poly1305::new((&key).into()),
        }
    }

    /// Generate a new random identity secret.
    pub fn generate_secret() -> [u8; SECRET_SIZE] {
        let mut secret = [0u8; SECRET_SIZE];
        rand::rng().fill_bytes(&mut secret);
        secret
    }

    /// Seal data; a random nonce is prepended to the ciphertext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StockingsError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| StockingsError::Identity(format!("Sealing failed: {}", e)))?;

        let mut result = nonce_bytes.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Open sealed data (wrong secret, tampering and truncation all fail).
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, StockingsError> {
        if sealed.len() < NONCE_SIZE {
            return Err(StockingsError::Identity(
                "Sealed data too short to contain nonce".to_string(),
            ));
        }

        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &sealed[NONCE_SIZE..])
            .map_err(|e| StockingsError::Identity(format!("Unsealing failed: {}", e)))
    }
}
