//! Stockings Core Library
//!
//! Replication of named, versioned, signed archives between nodes that only
//! share a passive relay.
//!
//! ## Overview
//!
//! Each node owns a set of directories ("archives"). It signs the archives it
//! authors and publishes them through the relay; archives authored by others
//! are verified, version-gated and stored locally. The relay only forwards
//! messages and plays no part in trust.
//!
//! ## Core Principles
//!
//! - **Trust on first use**: the first publisher key seen for a name is the
//!   only one accepted for it until the archive is removed locally
//! - **Monotonic versions**: an update is applied only if its version is
//!   strictly greater than the stored one
//! - **Whole-tuple replacement**: version, key, signature and content of an
//!   archive change together or not at all
//!
//! ## Quick Start
//!
//! ```ignore
//! use stockings_core::{Node, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = Node::open(NodeConfig::new("/home/me/.stockings"))?;
//!     node.init_identity("id")?;
//!     node.add("/home/me/photos", "1", "id").await?;
//!
//!     for name in node.list()? {
//!         println!("{} {}", name, node.get_version(name.as_str())?);
//!     }
//!
//!     node.run(std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod identity;
pub mod reconcile;
pub mod storage;
pub mod sync;
pub mod trust;

// Re-exports
pub use archive::{Archive, ArchiveName, Version};
pub use codec::{ArchiveCodec, TarCodec};
pub use config::{NodeConfig, SessionConfig, DEFAULT_BROKER, DEFAULT_HEARTBEAT};
pub use engine::Node;
pub use error::{StockingsError, StockingsResult};
pub use identity::{Identity, IdentityStore, Keypair, PublisherKey, Signature, DEFAULT_IDENTITY};
pub use reconcile::{Accepted, Reconciler};
pub use storage::ArchiveStore;
pub use sync::{
    Frame, MemoryRelay, RelayConnection, RelayConnector, SessionEvent, SessionState, SyncSession,
    WsConnector,
};
pub use trust::{PinOutcome, TrustStore};
