//! Node - the primary entry point for Stockings
//!
//! A [`Node`] binds a data directory to the archive store, the identity
//! store, the archive codec and the reconciler, and runs the sync session
//! against a relay.
//!
//! # Example
//!
//! ```ignore
//! use stockings_core::{Node, NodeConfig};
//!
//! let node = Node::open(NodeConfig::new("/home/me/.stockings"))?;
//! node.init_identity("id")?;
//!
//! // Author an archive from a directory
//! node.add("photos", "1", "id").await?;
//! assert_eq!(node.get_version("photos")?.as_str(), "1");
//!
//! // Replicate through the configured broker
//! node.run(tokio::signal::ctrl_c().map(|_| ())).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::archive::{Archive, ArchiveName, Version};
use crate::codec::{ArchiveCodec, TarCodec};
use crate::config::NodeConfig;
use crate::error::StockingsError;
use crate::identity::{sign, Identity, IdentityStore};
use crate::reconcile::{Accepted, Reconciler};
use crate::storage::ArchiveStore;
use crate::sync::{RelayConnector, SyncSession, WsConnector};

/// A local Stockings node
pub struct Node {
    config: NodeConfig,
    identities: IdentityStore,
    codec: Arc<dyn ArchiveCodec>,
    reconciler: Arc<Reconciler>,
}

impl Node {
    /// Open the node, creating the store directories if needed.
    pub fn open(config: NodeConfig) -> Result<Self, StockingsError> {
        Self::with_codec(config, Arc::new(TarCodec))
    }

    pub fn with_codec(
        config: NodeConfig,
        codec: Arc<dyn ArchiveCodec>,
    ) -> Result<Self, StockingsError> {
        let store = ArchiveStore::open(config.archives_dir())?;
        let identities = IdentityStore::new(config.ids_dir());
        let reconciler = Arc::new(Reconciler::new(store, codec.clone()));
        Ok(Self {
            config,
            identities,
            codec,
            reconciler,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &ArchiveStore {
        self.reconciler.store()
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        self.reconciler.clone()
    }

    /// Create the identity if absent. Returns it and whether it was created.
    pub fn init_identity(&self, id: &str) -> Result<(Identity, bool), StockingsError> {
        self.identities.init(id)
    }

    pub fn load_identity(&self, id: &str) -> Result<Identity, StockingsError> {
        self.identities.load(id)
    }

    /// Pack `dir`, sign it with identity `id` and store it under the
    /// directory's name at `version`.
    pub async fn add(
        &self,
        dir: impl AsRef<Path>,
        version: &str,
        id: &str,
    ) -> Result<Accepted, StockingsError> {
        let dir = dir.as_ref();
        let name = ArchiveName::from_dir(dir)?;
        let version = Version::new(version)?;
        let identity = self.identities.load(id)?;

        let content = self.codec.pack(dir).await?;
        let signature = sign(&content, &identity.keypair);
        let archive = Archive {
            name,
            version,
            publisher_key: identity.public_key,
            signature,
            content,
        };
        self.reconciler.apply_local(archive).await
    }

    /// Remove an archive and release its pin.
    pub fn remove(&self, name: &str) -> Result<(), StockingsError> {
        let name = ArchiveName::new(name)?;
        if !self.store().remove(&name)? {
            return Err(StockingsError::ArchiveNotFound(name.to_string()));
        }
        info!(name = %name, "Removed archive");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ArchiveName>, StockingsError> {
        self.store().list()
    }

    pub fn get_version(&self, name: &str) -> Result<Version, StockingsError> {
        let name = ArchiveName::new(name)?;
        self.store()
            .current_version(&name)?
            .ok_or_else(|| StockingsError::ArchiveNotFound(name.to_string()))
    }

    /// Clean up after a crash and re-extract trees whose record survived.
    /// Returns the number of archives repaired.
    pub async fn recover(&self) -> Result<usize, StockingsError> {
        let missing = self.store().recover()?;
        let mut repaired = 0;
        for name in missing {
            match self.reconciler.reextract(&name).await {
                Ok(()) => repaired += 1,
                Err(e) => warn!(name = %name, error = %e, "Failed to re-extract archive"),
            }
        }
        Ok(repaired)
    }

    /// Build a sync session against the configured broker.
    pub fn session(&self) -> SyncSession {
        self.session_with(Arc::new(WsConnector::new(self.config.broker.clone())))
    }

    /// Build a sync session against any relay.
    pub fn session_with(&self, connector: Arc<dyn RelayConnector>) -> SyncSession {
        SyncSession::new(connector, self.reconciler.clone(), self.config.session.clone())
    }

    /// Recover, then replicate through the configured broker until
    /// `shutdown` completes.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), StockingsError> {
        let repaired = self.recover().await?;
        if repaired > 0 {
            info!(repaired, "Re-extracted archives");
        }
        info!(broker = %self.config.broker, "Starting sync session");
        self.session().run_until(shutdown).await;
        Ok(())
    }
}
