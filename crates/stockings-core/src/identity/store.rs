//! On-disk identity store
//!
//! An identity named `id` is three files under the identity directory:
//! `id.pub` (PEM public key), `id.key` (sealed private seed) and `id.pass`
//! (hex secret that unseals the seed). Identities are created by an explicit
//! [`IdentityStore::init`] and are never regenerated once present.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::crypto::SealingKey;
use crate::identity::{Keypair, PublisherKey};
use crate::StockingsError;

/// Identity name used when none is given
pub const DEFAULT_IDENTITY: &str = "id";

/// A loaded local identity
#[derive(Debug)]
pub struct Identity {
    pub name: String,
    pub keypair: Keypair,
    pub public_key: PublisherKey,
}

/// Directory of local identities
#[derive(Debug, Clone)]
pub struct IdentityStore {
    dir: PathBuf,
}

impl IdentityStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, name: &str) -> Result<[PathBuf; 3], StockingsError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(StockingsError::Identity(format!(
                "Invalid identity name: {:?}",
                name
            )));
        }
        Ok([
            self.dir.join(format!("{}.pub", name)),
            self.dir.join(format!("{}.key", name)),
            self.dir.join(format!("{}.pass", name)),
        ])
    }

    /// Whether all files of the identity are present
    pub fn exists(&self, name: &str) -> Result<bool, StockingsError> {
        Ok(self.paths(name)?.iter().all(|p| p.exists()))
    }

    /// Load the identity, generating it first if it does not exist yet.
    ///
    /// Returns `(identity, created)`. A partially written identity (some but
    /// not all files present) is an error, never silently replaced.
    pub fn init(&self, name: &str) -> Result<(Identity, bool), StockingsError> {
        let paths = self.paths(name)?;
        let present = paths.iter().filter(|p| p.exists()).count();
        match present {
            3 => return Ok((self.load(name)?, false)),
            0 => {}
            _ => {
                return Err(StockingsError::Identity(format!(
                    "Identity {} is incomplete in {}; refusing to overwrite it",
                    name,
                    self.dir.display()
                )))
            }
        }

        info!(identity = %name, "Generating new identity");
        fs::create_dir_all(&self.dir)?;

        let keypair = Keypair::generate()?;
        let public_key = keypair.public_key()?;
        let secret = SealingKey::generate_secret();
        let sealed = SealingKey::derive(&secret).seal(&keypair.seed())?;

        let [pub_path, key_path, pass_path] = paths;
        // Public key last: `exists` only reports true once all three are written.
        write_private(&pass_path, hex::encode(secret).as_bytes())?;
        write_private(&key_path, &sealed)?;
        write_atomic(&pub_path, format!("{}\n", public_key.as_pem()).as_bytes())?;

        Ok((
            Identity {
                name: name.to_string(),
                keypair,
                public_key,
            },
            true,
        ))
    }

    /// Load an existing identity.
    pub fn load(&self, name: &str) -> Result<Identity, StockingsError> {
        let [pub_path, key_path, pass_path] = self.paths(name)?;
        if !(pub_path.exists() && key_path.exists() && pass_path.exists()) {
            return Err(StockingsError::IdentityNotFound(name.to_string()));
        }

        let secret = hex::decode(fs::read_to_string(&pass_path)?.trim())
            .map_err(|e| StockingsError::Identity(format!("Invalid secret file: {}", e)))?;
        let seed = SealingKey::derive(&secret).open(&fs::read(&key_path)?)?;
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| StockingsError::Identity("Sealed seed has wrong length".to_string()))?;
        let keypair = Keypair::from_seed(&seed);

        let public_key = keypair.public_key()?;
        let stored = PublisherKey::from_pem(fs::read_to_string(&pub_path)?);
        if stored != public_key {
            return Err(StockingsError::Identity(format!(
                "Public key file of identity {} does not match its private key",
                name
            )));
        }

        Ok(Identity {
            name: name.to_string(),
            keypair,
            public_key,
        })
    }
}

/// Write a file through a temporary sibling and rename it into place.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StockingsError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StockingsError::Io(e.error))?;
    Ok(())
}

/// Like [`write_atomic`], readable by the owner only on unix.
fn write_private(path: &Path, data: &[u8]) -> Result<(), StockingsError> {
    write_atomic(path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
