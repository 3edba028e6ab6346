//! Identity module for Stockings
//!
//! Signing and verification of archive content with Ed25519.
//!
//! ## Overview
//!
//! - **Keypair**: the local signing key, stored sealed on disk by [`IdentityStore`]
//! - **PublisherKey**: SPKI PEM public key, the value an archive name is pinned to
//! - **Signature**: base64 text of the Ed25519 signature over the packed content
//!
//! ## Example
//!
//! ```rust
//! use stockings_core::identity::{sign, verify, Keypair};
//!
//! let keypair = Keypair::generate().unwrap();
//! let public_key = keypair.public_key().unwrap();
//!
//! let content = b"packed archive bytes";
//! let signature = sign(content, &keypair);
//! assert!(verify(content, &public_key, &signature));
//! assert!(!verify(b"tampered", &public_key, &signature));
//! ```

mod keypair;
mod signature;
mod store;

pub use keypair::{Keypair, PublisherKey};
pub use signature::{Signature, SIGNATURE_LENGTH};
pub use store::{Identity, IdentityStore, DEFAULT_IDENTITY};

/// Sign raw content with the local keypair.
pub fn sign(content: &[u8], keypair: &Keypair) -> Signature {
    keypair.sign(content)
}

/// Pure verification predicate; malformed input yields `false`.
pub fn verify(content: &[u8], key: &PublisherKey, signature: &Signature) -> bool {
    key.verify(content, signature)
}
