//! Session state and event types
//!
//! ```text
//! ┌──────────────┐  connect   ┌────────────┐  manifest  ┌────────────┐
//! │ Disconnected │ ─────────► │ Connecting │ ─────────► │ Announcing │
//! └──────────────┘            └────────────┘            └────────────┘
//!        ▲                                                     │ publish all
//!        │            relay error / close                      ▼
//!        └──────────────────────────────────────────────  ┌───────────┐
//!                                                         │ Streaming │
//!                                                         └───────────┘
//! ```

use std::fmt;

use crate::archive::{ArchiveName, Version};

/// Connection state of a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Announcing,
    Streaming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Announcing => "announcing",
            SessionState::Streaming => "streaming",
        };
        f.write_str(s)
    }
}

/// Notification about session activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// An inbound update was applied
    ArchiveAccepted {
        name: ArchiveName,
        version: Version,
        newly_pinned: bool,
    },
    /// An inbound frame was dropped
    ArchiveRejected {
        /// Archive name, when the frame decoded far enough to have one
        name: Option<ArchiveName>,
        reason: String,
    },
}
