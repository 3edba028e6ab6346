//! Node configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Broker used when none is configured
pub const DEFAULT_BROKER: &str = "wss://stockings-server.herokuapp.com";

/// Interval between keepalives on an idle connection
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(8);

/// Name of the directory holding stored archives
pub const ARCHIVES_DIR: &str = "archives";

/// Name of the directory holding local identities
pub const IDS_DIR: &str = "ids";

/// Default broker URL
pub fn default_broker() -> Url {
    Url::parse(DEFAULT_BROKER).expect("default broker URL is valid")
}

/// Sync session tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Keepalive period while streaming
    pub heartbeat_interval: Duration,
    /// First reconnect delay
    pub initial_backoff: Duration,
    /// Upper bound for reconnect delays
    pub max_backoff: Duration,
    /// Periodically publish archives not yet sent on the current connection
    pub rescan_interval: Option<Duration>,
    /// Publish local archives missing from a peer's announcement
    pub answer_announcements: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            rescan_interval: None,
            answer_announcements: true,
        }
    }
}

/// Configuration of a local node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root for archives and identities
    pub data_dir: PathBuf,
    /// Relay to connect to when running
    pub broker: Url,
    pub session: SessionConfig,
}

impl NodeConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            broker: default_broker(),
            session: SessionConfig::default(),
        }
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.data_dir.join(ARCHIVES_DIR)
    }

    pub fn ids_dir(&self) -> PathBuf {
        self.data_dir.join(IDS_DIR)
    }
}
