//! Reconciler: accept or reject archive updates and apply accepted ones
//!
//! ## Acceptance
//!
//! ```text
//! update ─► pin(name, key) ── Conflict ──────────────► KeyMismatch
//!              │
//!              ▼
//!           verify(content, key, sig) ── false ──────► BadSignature
//!              │
//!              ▼
//!           version > stored? ── no ─────────────────► StaleVersion
//!              │
//!              ▼
//!           unpack to staging ── error ──────────────► Storage
//!              │
//!              ▼
//!           put(record)  ─►  install tree  ─►  Accepted
//! ```
//!
//! Nothing is written before the last check passes, so a rejected update
//! leaves the store exactly as it was.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::archive::{Archive, ArchiveName, Version};
use crate::codec::ArchiveCodec;
use crate::error::StockingsError;
use crate::storage::ArchiveStore;
use crate::trust::{PinOutcome, TrustStore};

/// An update that was applied to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub name: ArchiveName,
    pub version: Version,
    /// The name was unbound and is now pinned to the update's key
    pub newly_pinned: bool,
}

/// Applies inbound and locally authored archives to the store
pub struct Reconciler {
    store: ArchiveStore,
    trust: TrustStore,
    codec: Arc<dyn ArchiveCodec>,
    // Check-then-commit must not interleave within one process
    commit_lock: Mutex<()>,
}

impl Reconciler {
    pub fn new(store: ArchiveStore, codec: Arc<dyn ArchiveCodec>) -> Self {
        Self {
            trust: TrustStore::new(store.clone()),
            store,
            codec,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// Run an inbound update through the acceptance checks and apply it.
    ///
    /// Rejections come back as `KeyMismatch`, `BadSignature` or
    /// `StaleVersion`; a failure to unpack or persist is `Storage`.
    pub async fn reconcile(&self, update: Archive) -> Result<Accepted, StockingsError> {
        let _guard = self.commit_lock.lock().await;

        let outcome = self.trust.pin(&update.name, &update.publisher_key)?;
        if let PinOutcome::Conflict { pinned } = &outcome {
            warn!(
                name = %update.name,
                pinned = %pinned.fingerprint(),
                received = %update.publisher_key.fingerprint(),
                "Rejecting update signed by a different publisher"
            );
            return Err(StockingsError::KeyMismatch(update.name.to_string()));
        }

        if !update.verify() {
            warn!(name = %update.name, version = %update.version, "Rejecting update with bad signature");
            return Err(StockingsError::BadSignature(update.name.to_string()));
        }

        if let Some(stored) = self.store.current_version(&update.name)? {
            if update.version <= stored {
                debug!(
                    name = %update.name,
                    received = %update.version,
                    stored = %stored,
                    "Discarding stale update"
                );
                return Err(StockingsError::StaleVersion {
                    name: update.name.to_string(),
                    received: update.version.to_string(),
                    stored: stored.to_string(),
                });
            }
        }

        let newly_pinned = outcome == PinOutcome::Bound;
        self.commit(&update).await?;
        info!(
            name = %update.name,
            version = %update.version,
            publisher = %update.publisher_key.fingerprint(),
            newly_pinned,
            "Accepted archive"
        );
        Ok(Accepted {
            name: update.name,
            version: update.version,
            newly_pinned,
        })
    }

    /// Store a locally authored archive.
    ///
    /// Signature and version checks are skipped; the caller signed the
    /// content and chose the version. The pin still applies.
    pub async fn apply_local(&self, archive: Archive) -> Result<Accepted, StockingsError> {
        let _guard = self.commit_lock.lock().await;

        let outcome = self.trust.pin(&archive.name, &archive.publisher_key)?;
        if outcome.is_conflict() {
            return Err(StockingsError::KeyMismatch(archive.name.to_string()));
        }

        self.commit(&archive).await?;
        info!(name = %archive.name, version = %archive.version, "Stored local archive");
        Ok(Accepted {
            name: archive.name,
            version: archive.version,
            newly_pinned: outcome == PinOutcome::Bound,
        })
    }

    /// Re-extract the tree of a stored archive from its record.
    pub async fn reextract(&self, name: &ArchiveName) -> Result<(), StockingsError> {
        let _guard = self.commit_lock.lock().await;
        let archive = self
            .store
            .get(name)?
            .ok_or_else(|| StockingsError::ArchiveNotFound(name.to_string()))?;
        let staged = self.store.stage_tree(name)?;
        self.codec.unpack(&archive.content, staged.path()).await?;
        self.store.install_tree(name, staged)?;
        info!(name = %name, "Re-extracted archive content");
        Ok(())
    }

    async fn commit(&self, archive: &Archive) -> Result<(), StockingsError> {
        let staged = self.store.stage_tree(&archive.name)?;
        self.codec
            .unpack(&archive.content, staged.path())
            .await
            .map_err(|e| match e {
                StockingsError::Storage(_) => e,
                other => StockingsError::Storage(other.to_string()),
            })?;
        self.store.put(archive)?;
        self.store.install_tree(&archive.name, staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TarCodec;
    use crate::identity::Keypair;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = ArchiveStore::open(dir.path().join("archives")).unwrap();
        Fixture {
            reconciler: Reconciler::new(store, Arc::new(TarCodec)),
            _dir: dir,
        }
    }

    async fn packed(files: &[(&str, &[u8])]) -> Vec<u8> {
        let src = TempDir::new().unwrap();
        for (path, data) in files {
            std::fs::write(src.path().join(path), data).unwrap();
        }
        TarCodec.pack(src.path()).await.unwrap()
    }

    fn update(name: &str, version: &str, keypair: &Keypair, content: Vec<u8>) -> Archive {
        Archive {
            name: ArchiveName::new(name).unwrap(),
            version: Version::new(version).unwrap(),
            publisher_key: keypair.public_key().unwrap(),
            signature: keypair.sign(&content),
            content,
        }
    }

    #[tokio::test]
    async fn test_first_update_binds_and_extracts() {
        let f = fixture();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let content = packed(&[("hello.txt", b"hi")]).await;

        let accepted = f
            .reconciler
            .reconcile(update("foo", "1", &alice, content))
            .await
            .unwrap();
        assert!(accepted.newly_pinned);

        let dir = f.reconciler.store().content_dir(&accepted.name);
        assert_eq!(std::fs::read(dir.join("hello.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_bad_signature_does_not_pin() {
        let f = fixture();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let content = packed(&[("a", b"a")]).await;

        let mut forged = update("foo", "1", &alice, content.clone());
        forged.signature = bob.sign(&content);
        let result = f.reconciler.reconcile(forged).await;
        assert!(matches!(result, Err(StockingsError::BadSignature(_))));

        // Name still free for anyone
        f.reconciler
            .reconcile(update("foo", "1", &bob, content))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_key_mismatch_checked_before_signature() {
        let f = fixture();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let content = packed(&[("a", b"a")]).await;

        f.reconciler
            .reconcile(update("foo", "1", &alice, content.clone()))
            .await
            .unwrap();

        let mut forged = update("foo", "2", &bob, content);
        forged.signature = alice.sign(b"unrelated");
        let result = f.reconciler.reconcile(forged).await;
        assert!(matches!(result, Err(StockingsError::KeyMismatch(_))));
    }

    #[tokio::test]
    async fn test_stale_version_leaves_store_untouched() {
        let f = fixture();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let v2 = packed(&[("v", b"2")]).await;
        let v1 = packed(&[("v", b"1")]).await;

        f.reconciler
            .reconcile(update("foo", "2", &alice, v2.clone()))
            .await
            .unwrap();
        let result = f.reconciler.reconcile(update("foo", "1", &alice, v1)).await;
        assert!(matches!(result, Err(StockingsError::StaleVersion { .. })));

        let name = ArchiveName::new("foo").unwrap();
        assert_eq!(f.reconciler.store().get(&name).unwrap().unwrap().content, v2);
        let dir = f.reconciler.store().content_dir(&name);
        assert_eq!(std::fs::read(dir.join("v")).unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_unpack_failure_is_storage_rejection() {
        let f = fixture();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let garbage = vec![0x42u8; 1024];

        let result = f
            .reconciler
            .reconcile(update("foo", "1", &alice, garbage))
            .await;
        assert!(matches!(result, Err(StockingsError::Storage(_))));
        assert!(f.reconciler.store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_local_skips_version_check_but_honors_pin() {
        let f = fixture();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let bob = Keypair::from_seed(&[2u8; 32]);
        let content = packed(&[("a", b"a")]).await;

        f.reconciler
            .apply_local(update("foo", "5", &alice, content.clone()))
            .await
            .unwrap();
        // Same or lower version is the caller's call for local adds
        f.reconciler
            .apply_local(update("foo", "5", &alice, content.clone()))
            .await
            .unwrap();

        let result = f
            .reconciler
            .apply_local(update("foo", "6", &bob, content))
            .await;
        assert!(matches!(result, Err(StockingsError::KeyMismatch(_))));
    }

    #[tokio::test]
    async fn test_reextract_restores_missing_tree() {
        let f = fixture();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let content = packed(&[("file", b"data")]).await;
        let accepted = f
            .reconciler
            .reconcile(update("foo", "1", &alice, content))
            .await
            .unwrap();

        let dir = f.reconciler.store().content_dir(&accepted.name);
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(f.reconciler.store().recover().unwrap(), vec![accepted.name.clone()]);

        f.reconciler.reextract(&accepted.name).await.unwrap();
        assert_eq!(std::fs::read(dir.join("file")).unwrap(), b"data");
    }
}
