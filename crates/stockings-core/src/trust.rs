//! Trust-on-first-use pinning of archive names to publisher keys
//!
//! The first publisher key seen for a name becomes the only key accepted for
//! it until the archive is removed locally. The pin lives in the stored
//! archive record, so [`TrustStore::pin`] only decides; the binding takes
//! effect when the reconciler commits the archive that carries the key.

use tracing::debug;

use crate::archive::ArchiveName;
use crate::error::StockingsError;
use crate::identity::PublisherKey;
use crate::storage::ArchiveStore;

/// Result of checking a publisher key against the pin for a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinOutcome {
    /// Name was unbound; committing the archive binds it to this key
    Bound,
    /// Key equals the existing pin
    Accepted,
    /// Name is pinned to a different key
    Conflict { pinned: PublisherKey },
}

impl PinOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, PinOutcome::Conflict { .. })
    }
}

/// Pin lookups backed by the archive store
#[derive(Debug, Clone)]
pub struct TrustStore {
    store: ArchiveStore,
}

impl TrustStore {
    pub fn new(store: ArchiveStore) -> Self {
        Self { store }
    }

    /// Key currently pinned for `name`
    pub fn pinned_key(&self, name: &ArchiveName) -> Result<Option<PublisherKey>, StockingsError> {
        Ok(self.store.get(name)?.map(|archive| archive.publisher_key))
    }

    /// Check `key` against the pin for `name`.
    pub fn pin(&self, name: &ArchiveName, key: &PublisherKey) -> Result<PinOutcome, StockingsError> {
        let outcome = match self.pinned_key(name)? {
            None => PinOutcome::Bound,
            Some(pinned) if &pinned == key => PinOutcome::Accepted,
            Some(pinned) => PinOutcome::Conflict { pinned },
        };
        debug!(name = %name, key = %key.fingerprint(), ?outcome, "Checked pin");
        Ok(outcome)
    }

    /// Drop the pin for `name` together with its stored archive.
    pub fn unpin(&self, name: &ArchiveName) -> Result<bool, StockingsError> {
        self.store.remove(name)
    }
}
