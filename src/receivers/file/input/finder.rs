// SPDX-License-Identifier: Apache-2.0

use glob::glob;
use std::path::PathBuf;
use tracing::warn;

use crate::receivers::file::error::{Error, Result};

/// Expands a source's glob pattern into the files it currently matches.
#[derive(Debug, Clone)]
pub struct GlobFileFinder {
    pattern: String,
}

impl GlobFileFinder {
    /// Fails if the pattern does not parse.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        glob::Pattern::new(&pattern).map_err(|e| Error::InvalidGlob(format!("{pattern}: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Regular files matching the pattern, in glob order (sorted).
    ///
    /// Entries that cannot be read (e.g. permission denied on a directory)
    /// are logged and skipped.
    pub fn find_files(&self) -> Result<Vec<PathBuf>> {
        let matches =
            glob(&self.pattern).map_err(|e| Error::InvalidGlob(format!("{}: {e}", self.pattern)))?;

        let mut paths = Vec::new();
        for entry in matches {
            match entry {
                Ok(path) if path.is_dir() => {}
                Ok(path) => paths.push(path),
                Err(e) => {
                    warn!(pattern = %self.pattern, error = %e, "Skipping unreadable glob entry");
                }
            }
        }

        Ok(paths)
    }
}
