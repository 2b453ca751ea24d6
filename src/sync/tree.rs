//! Working tree content replacement.
//!
//! The working tree is split into version-control metadata (`.git`) and
//! tracked content. Replacement deletes all tracked content and copies the
//! materialized archive in; `.git` is never opened, moved or rewritten.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::RepositoryError;

/// Name of the metadata entry at the root of a working tree.
pub const METADATA_DIR: &str = ".git";

fn content_error(path: &Path) -> impl Fn(io::Error) -> RepositoryError + '_ {
    move |source| RepositoryError::Content {
        path: path.to_path_buf(),
        source,
    }
}

/// Remove `path` recursively, ignoring a missing path.
pub fn remove_if_exists(path: &Path) -> Result<(), RepositoryError> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path).map_err(content_error(path)),
        Ok(_) => std::fs::remove_file(path).map_err(content_error(path)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(content_error(path)(e)),
    }
}

/// Delete every top-level entry of `work_tree` except the metadata directory.
///
/// Returns the number of entries removed.
pub fn clear_tracked(work_tree: &Path) -> Result<usize, RepositoryError> {
    let mut removed = 0;
    for entry in std::fs::read_dir(work_tree).map_err(content_error(work_tree))? {
        let entry = entry.map_err(content_error(work_tree))?;
        if entry.file_name() == METADATA_DIR {
            continue;
        }
        remove_if_exists(&entry.path())?;
        removed += 1;
    }
    Ok(removed)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::copy(src, dst).map(|_| ())
}

/// Copy the tree under `src` into `dst`, keeping symlinks as symlinks.
///
/// A top-level `.git` in `src` is skipped so content can never overwrite
/// repository metadata. Returns the number of files and links copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize, RepositoryError> {
    let mut copied = 0;
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == METADATA_DIR));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            RepositoryError::Content {
                path,
                source: e.into(),
            }
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| RepositoryError::Content {
                path: entry.path().to_path_buf(),
                source: io::Error::other(e),
            })?;
        let target: PathBuf = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(content_error(&target))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target).map_err(content_error(&target))?;
            copied += 1;
        } else {
            std::fs::copy(entry.path(), &target).map_err(content_error(&target))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Replace all tracked content of `work_tree` with the tree under `content`.
pub fn replace_tracked(work_tree: &Path, content: &Path) -> Result<usize, RepositoryError> {
    let removed = clear_tracked(work_tree)?;
    let copied = copy_tree(content, work_tree)?;
    log::info!(
        "Replaced working tree content ({} old entries removed, {} files copied)",
        removed,
        copied
    );
    Ok(copied)
}
