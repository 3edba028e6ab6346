//! Archive content codec: packing a directory into bytes and back
//!
//! The packed bytes are what gets signed, stored and transmitted, so packing
//! must be deterministic: the same directory content always yields the same
//! bytes. [`TarCodec`] gets there by sorting entries by name and normalizing
//! every header (mtime 0, uid/gid 0, no user names, mode 0644/0755).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tar::{ArchiveBuilder, Builder, EntryType, Header};
use tracing::{debug, warn};

use crate::error::StockingsError;

/// Pack/unpack pair for archive content.
#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Pack a directory into a byte blob.
    async fn pack(&self, dir: &Path) -> Result<Vec<u8>, StockingsError>;

    /// Unpack a blob produced by [`ArchiveCodec::pack`] into `dest`, which
    /// must exist and be empty.
    async fn unpack(&self, content: &[u8], dest: &Path) -> Result<(), StockingsError>;
}

/// Deterministic tar codec
#[derive(Debug, Clone, Copy, Default)]
pub struct TarCodec;

enum PackEntry {
    Dir(String),
    File {
        path: String,
        source: PathBuf,
        executable: bool,
    },
}

/// Walk `dir` depth-first in name order.
fn collect_entries(dir: &Path, prefix: &str, out: &mut Vec<PackEntry>) -> std::io::Result<()> {
    let mut children = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let name = child.file_name().into_string().map_err(|name| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("non UTF-8 file name {:?}", name),
            )
        })?;
        let path = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        let file_type = child.file_type()?;

        if file_type.is_dir() {
            out.push(PackEntry::Dir(path.clone()));
            collect_entries(&child.path(), &path, out)?;
        } else if file_type.is_file() {
            out.push(PackEntry::File {
                path,
                source: child.path(),
                executable: is_executable(&child.metadata()?),
            });
        } else {
            warn!(path = %path, "Skipping entry that is neither file nor directory");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

fn normalized_header(entry_type: EntryType, size: u64, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[async_trait]
impl ArchiveCodec for TarCodec {
    async fn pack(&self, dir: &Path) -> Result<Vec<u8>, StockingsError> {
        if !dir.is_dir() {
            return Err(StockingsError::Storage(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut entries = Vec::new();
        collect_entries(dir, "", &mut entries)?;

        let mut builder = Builder::new(Vec::new());
        for entry in &entries {
            match entry {
                PackEntry::Dir(path) => {
                    let mut header = normalized_header(EntryType::Directory, 0, 0o755);
                    builder
                        .append_data(&mut header, path, tokio::io::empty())
                        .await?;
                }
                PackEntry::File {
                    path,
                    source,
                    executable,
                } => {
                    let data = tokio::fs::read(source).await?;
                    let mode = if *executable { 0o755 } else { 0o644 };
                    let mut header =
                        normalized_header(EntryType::Regular, data.len() as u64, mode);
                    builder.append_data(&mut header, path, data.as_slice()).await?;
                }
            }
        }

        let packed = builder.into_inner().await?;
        debug!(dir = %dir.display(), entries = entries.len(), bytes = packed.len(), "Packed directory");
        Ok(packed)
    }

    async fn unpack(&self, content: &[u8], dest: &Path) -> Result<(), StockingsError> {
        // Mode bits beyond 0o777 (setuid, setgid, sticky) are dropped
        let mut archive = ArchiveBuilder::new(content)
            .set_preserve_permissions(false)
            .set_preserve_mtime(false)
            .build();
        let mut entries = archive.entries().map_err(unpack_error)?;

        // Only what `pack` emits is accepted: regular files and directories
        while let Some(entry) = entries.next().await {
            let mut entry = entry.map_err(unpack_error)?;
            let entry_type = entry.header().entry_type();
            let path = entry
                .path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|_| "<invalid path>".to_string());
            if !(entry_type.is_file() || entry_type.is_dir()) {
                return Err(StockingsError::Storage(format!(
                    "Archive entry {} is neither file nor directory ({:?})",
                    path, entry_type
                )));
            }
            if !entry.unpack_in(dest).await.map_err(unpack_error)? {
                return Err(StockingsError::Storage(format!(
                    "Archive entry {} escapes the destination",
                    path
                )));
            }
        }
        Ok(())
    }
}

fn unpack_error(e: std::io::Error) -> StockingsError {
    StockingsError::Storage(format!("Failed to unpack archive: {}", e))
}
