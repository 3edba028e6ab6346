//! Relay synchronization layer
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncSession (one task, one relay connection at a time)         │
//! │  ├── RelayConnector / RelayConnection (transport seam)          │
//! │  │   ├── WsConnector: WebSocket broker                          │
//! │  │   └── MemoryRelay: in-process hub                            │
//! │  ├── Frame (keepalive / announcement / update wire codec)       │
//! │  ├── Reconciler (accept or reject inbound updates)              │
//! │  └── SessionEvent broadcast for observers                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let connector = Arc::new(WsConnector::new(broker_url));
//! let session = SyncSession::new(connector, reconciler, SessionConfig::default());
//! let mut events = session.subscribe();
//! tokio::spawn(session.run());
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod events;
pub mod memory;
pub mod protocol;
pub mod relay;
pub mod session;

pub use events::{SessionEvent, SessionState};
pub use memory::MemoryRelay;
pub use protocol::{Frame, ANNOUNCE_PREFIX, DELIMITER, KEEPALIVE};
pub use relay::{RelayConnection, RelayConnector, WsConnector};
pub use session::SyncSession;
