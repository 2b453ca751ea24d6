//! Archive Materializer: unpack a release archive without its wrapper directory.
//!
//! Release archives hold a single `{name}-{version}/` root. Every entry path
//! loses its first component, so `pkg-0.5.0/src/lib.rs` lands at
//! `{dest}/src/lib.rs`. Entries that are only the wrapper are skipped.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors returned while extracting an archive.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Reading the archive or writing the destination failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The archive stream could not be decoded.
    #[error("malformed archive: {0}")]
    Malformed(String),
    /// An entry path would land outside the destination.
    #[error("archive entry escapes destination: {0}")]
    UnsafePath(String),
}

fn io_error(path: &Path) -> impl Fn(io::Error) -> ExtractionError + '_ {
    move |source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Drop the first normal component of an archive path.
///
/// Returns `None` for the wrapper entry itself. Leading `./` segments are
/// ignored; `..`, absolute and prefixed paths are rejected.
fn strip_wrapper(path: &Path) -> Result<Option<PathBuf>, ExtractionError> {
    let mut stripped = PathBuf::new();
    let mut seen_wrapper = false;

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                if seen_wrapper {
                    stripped.push(part);
                } else {
                    seen_wrapper = true;
                }
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractionError::UnsafePath(path.display().to_string()));
            }
        }
    }

    if stripped.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(stripped))
    }
}

/// Reject `relative` if any existing ancestor under `dest` is a symlink.
///
/// Writing through such a parent (or reading through it for a hard link)
/// would reach outside `dest`. Missing ancestors are fine; they are created
/// as plain directories.
fn check_ancestors(dest: &Path, relative: &Path) -> Result<(), ExtractionError> {
    let mut current = dest.to_path_buf();
    let mut components = relative.components().peekable();

    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ExtractionError::UnsafePath(relative.display().to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(&current)(e)),
        }
    }
    Ok(())
}

/// Remove a symlink left at `target` by an earlier entry so the new entry
/// replaces the link instead of writing through it.
fn clear_link(target: &Path) -> Result<(), ExtractionError> {
    match std::fs::symlink_metadata(target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::remove_file(target).map_err(io_error(target))
        }
        _ => Ok(()),
    }
}

/// Open `archive`, transparently decompressing gzip input.
fn open_stream(archive: &Path) -> Result<Box<dyn Read>, ExtractionError> {
    let file = File::open(archive).map_err(io_error(archive))?;
    let mut reader = BufReader::new(file);
    let is_gzip = reader
        .fill_buf()
        .map_err(io_error(archive))?
        .starts_with(&GZIP_MAGIC);

    if is_gzip {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Recreate `dest` as an empty directory.
fn fresh_dir(dest: &Path) -> Result<(), ExtractionError> {
    match std::fs::remove_dir_all(dest) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error(dest)(e)),
    }
    std::fs::create_dir_all(dest).map_err(io_error(dest))
}

/// Extract `archive` into a fresh `dest`, stripping the wrapper directory.
///
/// Returns the number of entries written.
pub fn extract_stripped(archive: &Path, dest: &Path) -> Result<usize, ExtractionError> {
    log::info!("Extracting {} into {}", archive.display(), dest.display());

    let stream = open_stream(archive)?;
    fresh_dir(dest)?;

    let mut tar = Archive::new(stream);
    tar.set_overwrite(true);

    let malformed = |e: io::Error| ExtractionError::Malformed(e.to_string());
    let mut written = 0usize;

    for entry in tar.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let kind = entry.header().entry_type();

        if kind.is_pax_global_extensions()
            || kind.is_pax_local_extensions()
            || kind.is_gnu_longname()
            || kind.is_gnu_longlink()
        {
            continue;
        }

        let raw_path = entry.path().map_err(malformed)?.into_owned();
        let Some(relative) = strip_wrapper(&raw_path)? else {
            continue;
        };
        check_ancestors(dest, &relative)?;
        let target = dest.join(&relative);
        clear_link(&target)?;

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        if kind == EntryType::Link {
            // Hard link names are archive paths too; resolve them the same way.
            let link_name = entry
                .link_name()
                .map_err(malformed)?
                .ok_or_else(|| {
                    ExtractionError::Malformed(format!(
                        "hard link without target: {}",
                        raw_path.display()
                    ))
                })?
                .into_owned();
            let link_relative = strip_wrapper(&link_name)?
                .ok_or_else(|| ExtractionError::UnsafePath(link_name.display().to_string()))?;
            check_ancestors(dest, &link_relative)?;
            let source = dest.join(&link_relative);
            let is_symlink = std::fs::symlink_metadata(&source)
                .map(|meta| meta.file_type().is_symlink())
                .unwrap_or(false);
            if is_symlink {
                return Err(ExtractionError::UnsafePath(link_name.display().to_string()));
            }
            std::fs::copy(&source, &target).map_err(io_error(&target))?;
        } else {
            entry.unpack(&target).map_err(io_error(&target))?;
        }

        written += 1;
    }

    log::info!("Extraction complete ({} entries)", written);
    Ok(written)
}
