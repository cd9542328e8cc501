// SPDX-License-Identifier: Apache-2.0

//! File identity based on device + inode.
//!
//! Two handles refer to the same underlying file exactly when their ids are
//! equal, which is how a follower notices that the file at its path was
//! replaced by log rotation.

use std::fs::Metadata;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    // Without inodes the best available identity is the creation time.
    #[cfg(not(unix))]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self { dev: 0, ino: created }
    }

    /// Identity of an open tokio file handle.
    pub async fn from_file(file: &tokio::fs::File) -> io::Result<Self> {
        let metadata = file.metadata().await?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Identity of whatever file currently lives at `path` (symlinks followed).
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        Ok(Self::from_metadata(&metadata))
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}
