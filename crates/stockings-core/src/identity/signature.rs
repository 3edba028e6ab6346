//! Signature over an archive's content blob, kept in its wire encoding

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Length of a raw Ed25519 signature
pub const SIGNATURE_LENGTH: usize = 64;

/// Base64 (standard alphabet, padded) text of an Ed25519 signature.
///
/// The text form is what gets stored, announced and compared, so decoding
/// only happens at verification time and a malformed value simply fails to
/// verify.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Signature(String);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    /// Wrap signature text as received
    pub fn from_base64(text: impl AsRef<str>) -> Self {
        Self(text.as_ref().trim().to_string())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Decode into raw signature bytes; `None` unless the text is valid
    /// base64 of exactly [`SIGNATURE_LENGTH`] bytes.
    pub fn decode(&self) -> Option<[u8; SIGNATURE_LENGTH]> {
        let bytes = STANDARD.decode(&self.0).ok()?;
        bytes.try_into().ok()
    }
}

impl From<String> for Signature {
    fn from(text: String) -> Self {
        Self::from_base64(text)
    }
}

impl From<Signature> for String {
    fn from(signature: Signature) -> Self {
        signature.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
