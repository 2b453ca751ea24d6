//! Work directory path management
//!
//! This module provides the `WorkPaths` struct which manages all filesystem
//! paths for one synchronization run:
//!
//! ```text
//! ~/.cache/crate-mirror/
//! ├── downloads/
//! │   └── <name>-<version>.crate    # Archive fetched from the registry
//! ├── source/                       # Archive content, wrapper dir stripped
//! └── repo/                         # Working tree of the mirror repository
//!     └── .git/
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::types::Release;

/// Manages all filesystem paths for the work directory layout
#[derive(Debug, Clone)]
pub struct WorkPaths {
    root: PathBuf,
}

impl WorkPaths {
    /// Creates a new WorkPaths with the specified root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root work directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the downloads directory path: `{root}/downloads`
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    /// Returns the archive path for a release: `{root}/downloads/{name}-{version}.crate`
    pub fn archive_path(&self, release: &Release) -> PathBuf {
        self.downloads_dir()
            .join(format!("{}.crate", release.archive_root()))
    }

    /// Returns the materialized content directory: `{root}/source`
    pub fn source_dir(&self) -> PathBuf {
        self.root.join("source")
    }

    /// Returns the repository working tree: `{root}/repo`
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join("repo")
    }

    /// Empties the scratch areas left by a previous run.
    ///
    /// The repository working tree is left alone; each sync strategy decides
    /// how to (re)establish it.
    pub fn reset_scratch(&self) -> io::Result<()> {
        for dir in [self.downloads_dir(), self.source_dir()] {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        std::fs::create_dir_all(self.downloads_dir())
    }
}

impl Default for WorkPaths {
    /// Creates a WorkPaths using the system cache directory + "crate-mirror"
    ///
    /// Uses `dirs::cache_dir()` which resolves to:
    /// - Linux: `~/.cache`
    /// - macOS: `~/Library/Caches`
    /// - Windows: `C:\Users\<user>\AppData\Local`
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        Self::new(cache_dir.join("crate-mirror"))
    }
}
