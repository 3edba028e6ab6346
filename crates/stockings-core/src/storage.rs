//! Archive store: persisted archives on the local filesystem.
//!
//! Layout under the store root:
//!
//! ```text
//! archives/
//! ├── <name>.archive     record: version, publisher key, signature, packed content
//! ├── <name>/            extracted content tree
//! ├── .staging/          in-progress record writes and unpacked trees
//! └── .trash/            trees displaced by a swap, deleted right after
//! ```
//!
//! The record is the unit of atomicity. It is serialized with postcard into a
//! temporary file in `.staging/` and renamed over `<name>.archive`, so a
//! concurrent reader (another process) sees either the previous record or
//! the new one, never a mix. The publisher key inside the record is the pin
//! for the name; it cannot be lost independently of the archive.
//!
//! This is not compatible with the older layout of one sibling file per field
//! (`<name>.pub`, `<name>.sign`, `<name>.ver`). Those files are neither read
//! nor written, and a data directory in that layout starts out empty.
//!
//! The extracted tree is derived from the record's content and is swapped in
//! by rename after the record commits. A crash in between leaves a record
//! without a tree, which [`ArchiveStore::recover`] reports for re-extraction.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::archive::{Archive, ArchiveName, Version};
use crate::error::StockingsError;

/// Extension of record files
const RECORD_EXTENSION: &str = "archive";
const STAGING_DIR: &str = ".staging";
const TRASH_DIR: &str = ".trash";

/// Current on-disk record format
const RECORD_FORMAT: u8 = 1;

/// Staging entries older than this are considered abandoned by a crashed
/// writer. Younger ones may belong to a concurrent `add`.
const STALE_STAGING_AGE: Duration = Duration::from_secs(600);

#[derive(Serialize, Deserialize)]
struct RecordFile {
    format: u8,
    archive: Archive,
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> StockingsError {
    StockingsError::Storage(format!("{} {}: {}", action, path.display(), err))
}

/// Filesystem-backed archive store
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StockingsError> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.clone(), root.join(STAGING_DIR), root.join(TRASH_DIR)] {
            fs::create_dir_all(&dir).map_err(|e| storage_error("create", &dir, e))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, name: &ArchiveName) -> PathBuf {
        self.root.join(format!("{}.{}", name, RECORD_EXTENSION))
    }

    /// Directory holding the extracted content of `name`
    pub fn content_dir(&self, name: &ArchiveName) -> PathBuf {
        self.root.join(name.as_str())
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Load the archive stored under `name`, if any.
    pub fn get(&self, name: &ArchiveName) -> Result<Option<Archive>, StockingsError> {
        let path = self.record_path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("read", &path, e)),
        };

        let record: RecordFile = postcard::from_bytes(&bytes).map_err(|e| {
            StockingsError::Storage(format!("corrupt record {}: {}", path.display(), e))
        })?;
        if record.format != RECORD_FORMAT {
            return Err(StockingsError::Storage(format!(
                "unsupported record format {} in {}",
                record.format,
                path.display()
            )));
        }
        if &record.archive.name != name {
            return Err(StockingsError::Storage(format!(
                "record {} holds archive {}",
                path.display(),
                record.archive.name
            )));
        }
        Ok(Some(record.archive))
    }

    /// Stored version of `name`, if any.
    pub fn current_version(&self, name: &ArchiveName) -> Result<Option<Version>, StockingsError> {
        Ok(self.get(name)?.map(|archive| archive.version))
    }

    /// Atomically replace the record for `archive.name`.
    pub fn put(&self, archive: &Archive) -> Result<(), StockingsError> {
        let record = RecordFile {
            format: RECORD_FORMAT,
            archive: archive.clone(),
        };
        let bytes = postcard::to_allocvec(&record)?;

        let staging = self.staging_root();
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{}.", archive.name))
            .suffix(".record")
            .tempfile_in(&staging)
            .map_err(|e| storage_error("stage record in", &staging, e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| storage_error("write", tmp.path(), e))?;

        let target = self.record_path(&archive.name);
        tmp.persist(&target)
            .map_err(|e| storage_error("commit", &target, e.error))?;

        debug!(name = %archive.name, version = %archive.version, "Committed archive record");
        Ok(())
    }

    /// Fresh empty directory to unpack content into before
    /// [`ArchiveStore::install_tree`]. Dropping it without installing
    /// removes it.
    pub fn stage_tree(&self, name: &ArchiveName) -> Result<TempDir, StockingsError> {
        let staging = self.staging_root();
        tempfile::Builder::new()
            .prefix(&format!("{}.", name))
            .suffix(".tree")
            .tempdir_in(&staging)
            .map_err(|e| storage_error("stage tree in", &staging, e))
    }

    /// Replace the extracted tree of `name` with a fully unpacked staging
    /// directory.
    pub fn install_tree(&self, name: &ArchiveName, staged: TempDir) -> Result<(), StockingsError> {
        let target = self.content_dir(name);

        let displaced = if target.exists() {
            let trash = self
                .root
                .join(TRASH_DIR)
                .join(format!("{}.{}", name, ulid::Ulid::new()));
            fs::rename(&target, &trash).map_err(|e| storage_error("displace", &target, e))?;
            Some(trash)
        } else {
            None
        };

        fs::rename(staged.path(), &target).map_err(|e| storage_error("install", &target, e))?;
        // `staged` now points at a moved path; dropping it is a no-op.
        drop(staged);

        if let Some(trash) = displaced {
            if let Err(e) = fs::remove_dir_all(&trash) {
                warn!(path = %trash.display(), error = %e, "Failed to delete displaced tree");
            }
        }
        Ok(())
    }

    /// Delete the record and the extracted tree of `name`.
    ///
    /// Best-effort: a missing artifact does not stop removal of the other,
    /// and a failure to delete the tree is logged, not returned. Only a
    /// record that could not be deleted is an error, since that would keep
    /// the name pinned. Returns whether a record existed.
    pub fn remove(&self, name: &ArchiveName) -> Result<bool, StockingsError> {
        let record = self.record_path(name);
        let existed = match fs::remove_file(&record) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(storage_error("delete", &record, e)),
        };

        let tree = self.content_dir(name);
        match fs::remove_dir_all(&tree) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %tree.display(), error = %e, "Failed to delete content tree"),
        }

        debug!(name = %name, existed, "Removed archive");
        Ok(existed)
    }

    /// Names of all stored archives, sorted.
    pub fn list(&self) -> Result<Vec<ArchiveName>, StockingsError> {
        let entries = fs::read_dir(&self.root).map_err(|e| storage_error("list", &self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| storage_error("list", &self.root, e))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match ArchiveName::new(stem) {
                Ok(name) => names.push(name),
                Err(_) => warn!(path = %path.display(), "Ignoring record with invalid name"),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Clean up after crashed writers.
    ///
    /// Deletes abandoned staging entries and leftover displaced trees, and
    /// returns the names whose record exists but whose tree is missing.
    pub fn recover(&self) -> Result<Vec<ArchiveName>, StockingsError> {
        let now = SystemTime::now();
        for (dir, min_age) in [
            (self.staging_root(), STALE_STAGING_AGE),
            (self.root.join(TRASH_DIR), Duration::ZERO),
        ] {
            let entries = fs::read_dir(&dir).map_err(|e| storage_error("scan", &dir, e))?;
            for entry in entries.flatten() {
                let path = entry.path();
                let age = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or(Duration::ZERO);
                if age < min_age {
                    continue;
                }
                let result = if path.is_dir() {
                    fs::remove_dir_all(&path)
                } else {
                    fs::remove_file(&path)
                };
                match result {
                    Ok(()) => debug!(path = %path.display(), "Removed leftover entry"),
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove leftover entry"),
                }
            }
        }

        Ok(self
            .list()?
            .into_iter()
            .filter(|name| !self.content_dir(name).is_dir())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Keypair;

    fn archive(name: &str, version: &str, keypair: &Keypair, content: &[u8]) -> Archive {
        Archive {
            name: ArchiveName::new(name).unwrap(),
            version: Version::new(version).unwrap(),
            publisher_key: keypair.public_key().unwrap(),
            signature: keypair.sign(content),
            content: content.to_vec(),
        }
    }

    fn name(s: &str) -> ArchiveName {
        ArchiveName::new(s).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let keypair = Keypair::from_seed(&[1u8; 32]);

        let stored = archive("foo", "1", &keypair, b"content");
        store.put(&stored).unwrap();

        assert_eq!(store.get(&name("foo")).unwrap(), Some(stored));
        assert_eq!(
            store.current_version(&name("foo")).unwrap().unwrap().as_str(),
            "1"
        );
    }

    #[test]
    fn test_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&name("foo")).unwrap(), None);
        assert_eq!(store.current_version(&name("foo")).unwrap(), None);
    }

    #[test]
    fn test_put_replaces_whole_tuple() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let keypair = Keypair::from_seed(&[1u8; 32]);

        store.put(&archive("foo", "1", &keypair, b"one")).unwrap();
        let second = archive("foo", "2", &keypair, b"two");
        store.put(&second).unwrap();

        assert_eq!(store.get(&name("foo")).unwrap(), Some(second));
        // No temporary files left behind
        assert_eq!(fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let keypair = Keypair::from_seed(&[1u8; 32]);

        assert!(store.list().unwrap().is_empty());
        store.put(&archive("zeta", "1", &keypair, b"z")).unwrap();
        store.put(&archive("alpha", "1", &keypair, b"a")).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not a record").unwrap();

        assert_eq!(store.list().unwrap(), vec![name("alpha"), name("zeta")]);
    }

    #[test]
    fn test_per_field_files_are_not_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        for ext in ["pub", "sign", "ver"] {
            fs::write(dir.path().join(format!("foo.{}", ext)), b"legacy").unwrap();
        }
        fs::create_dir(dir.path().join("foo")).unwrap();

        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.get(&name("foo")).unwrap(), None);
        assert_eq!(store.current_version(&name("foo")).unwrap(), None);
    }

    #[test]
    fn test_remove_deletes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let keypair = Keypair::from_seed(&[1u8; 32]);

        store.put(&archive("foo", "1", &keypair, b"x")).unwrap();
        fs::create_dir_all(store.content_dir(&name("foo")).join("nested")).unwrap();

        assert!(store.remove(&name("foo")).unwrap());
        assert_eq!(store.get(&name("foo")).unwrap(), None);
        assert!(!store.content_dir(&name("foo")).exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_remove_tolerates_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let keypair = Keypair::from_seed(&[1u8; 32]);

        // Record without tree
        store.put(&archive("foo", "1", &keypair, b"x")).unwrap();
        assert!(store.remove(&name("foo")).unwrap());

        // Tree without record
        fs::create_dir_all(store.content_dir(&name("bar"))).unwrap();
        assert!(!store.remove(&name("bar")).unwrap());
        assert!(!store.content_dir(&name("bar")).exists());

        // Nothing at all
        assert!(!store.remove(&name("baz")).unwrap());
    }

    #[test]
    fn test_install_tree_swaps_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let foo = name("foo");

        let staged = store.stage_tree(&foo).unwrap();
        fs::write(staged.path().join("v1.txt"), b"1").unwrap();
        store.install_tree(&foo, staged).unwrap();
        assert!(store.content_dir(&foo).join("v1.txt").exists());

        let staged = store.stage_tree(&foo).unwrap();
        fs::write(staged.path().join("v2.txt"), b"2").unwrap();
        store.install_tree(&foo, staged).unwrap();
        assert!(store.content_dir(&foo).join("v2.txt").exists());
        assert!(!store.content_dir(&foo).join("v1.txt").exists());

        assert_eq!(fs::read_dir(dir.path().join(TRASH_DIR)).unwrap().count(), 0);
        assert_eq!(fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_dropped_stage_is_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let staged = store.stage_tree(&name("foo")).unwrap();
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_record_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("foo.archive"), b"\xff\xff\xff").unwrap();
        assert!(matches!(
            store.get(&name("foo")),
            Err(StockingsError::Storage(_))
        ));
    }

    #[test]
    fn test_recover_reports_missing_trees() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArchiveStore::open(dir.path()).unwrap();
        let keypair = Keypair::from_seed(&[1u8; 32]);

        store.put(&archive("foo", "1", &keypair, b"x")).unwrap();
        store.put(&archive("bar", "1", &keypair, b"y")).unwrap();
        fs::create_dir_all(store.content_dir(&name("bar"))).unwrap();
        fs::create_dir_all(dir.path().join(TRASH_DIR).join("bar.old")).unwrap();

        assert_eq!(store.recover().unwrap(), vec![name("foo")]);
        assert_eq!(fs::read_dir(dir.path().join(TRASH_DIR)).unwrap().count(), 0);
    }
}
