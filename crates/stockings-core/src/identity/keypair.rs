//! Ed25519 keypair and its PEM-encoded public half
//!
//! Public keys travel as SPKI PEM text, so the key type here keeps the text
//! itself and only parses it when a signature has to be checked.

use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePublicKey, EncodePublicKey};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::identity::signature::Signature;
use crate::StockingsError;

/// Ed25519 keypair used to sign locally authored archives.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Result<Self, StockingsError> {
        // getrandom directly to avoid rand_core version conflicts with ed25519-dalek
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)
            .map_err(|e| StockingsError::Identity(format!("Failed to get random bytes: {}", e)))?;
        Ok(Self::from_seed(&seed))
    }

    /// Rebuild a keypair from its 32-byte secret seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// The 32-byte secret seed (sealed before it touches disk)
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// PEM-encoded public key for this keypair
    pub fn public_key(&self) -> Result<PublisherKey, StockingsError> {
        let pem = self
            .signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| StockingsError::Identity(format!("PEM encoding failed: {}", e)))?;
        Ok(PublisherKey::from_pem(pem))
    }

    /// Sign raw content bytes. Ed25519 is deterministic: the same content
    /// always yields the same signature.
    pub fn sign(&self, content: &[u8]) -> Signature {
        Signature::from_bytes(&self.signing.sign(content).to_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field(
                "public",
                &hex::encode(self.signing.verifying_key().as_bytes()),
            )
            .finish_non_exhaustive()
    }
}

/// Public key of an archive publisher, as SPKI PEM text.
///
/// Line endings and surrounding whitespace are normalized on construction so
/// that two encodings of the same PEM compare equal: a PEM received off the
/// wire still carries the newline that preceded the field delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PublisherKey(String);

impl PublisherKey {
    pub fn from_pem(pem: impl AsRef<str>) -> Self {
        Self(pem.as_ref().replace("\r\n", "\n").trim().to_string())
    }

    pub fn as_pem(&self) -> &str {
        &self.0
    }

    /// Verify `signature` over `content`.
    ///
    /// Returns false for anything malformed (unparseable PEM, non-Ed25519
    /// key, bad base64, wrong signature length) rather than erroring.
    pub fn verify(&self, content: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_public_key_pem(&self.0) else {
            return false;
        };
        let Some(bytes) = signature.decode() else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        key.verify(content, &signature).is_ok()
    }

    /// Short hex fingerprint for log lines
    pub fn fingerprint(&self) -> String {
        match VerifyingKey::from_public_key_pem(&self.0) {
            Ok(key) => hex::encode(&key.as_bytes()[..8]),
            Err(_) => "invalid".to_string(),
        }
    }
}

impl From<String> for PublisherKey {
    fn from(pem: String) -> Self {
        Self::from_pem(pem)
    }
}

impl From<PublisherKey> for String {
    fn from(key: PublisherKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for PublisherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
