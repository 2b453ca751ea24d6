//! Archive Fetcher: stream a release `.crate` to the scratch area.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{RegistryClient, describe_error};
use crate::types::Release;

/// Errors returned while downloading a release archive.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The download request failed before a response arrived.
    #[error("download of {url} failed: {reason}")]
    Request { url: String, reason: String },
    /// The server answered with a non-success status.
    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    /// Writing the archive to disk failed.
    #[error("failed to write archive {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RegistryClient {
    /// URL of the `.crate` archive for a release.
    pub fn archive_url(&self, release: &Release) -> String {
        format!(
            "{}/crates/{}/{}.crate",
            self.download_base,
            release.name,
            release.archive_root()
        )
    }

    /// Download the archive for `release` into `dest`.
    ///
    /// Returns the number of bytes written. A partially written file is
    /// removed on failure.
    pub fn download_archive(&self, release: &Release, dest: &Path) -> Result<u64, FetchError> {
        let url = self.archive_url(release);
        log::info!("Downloading from {}", url);

        let response = self.agent.get(&url).call().map_err(|e| match describe_error(e) {
            (Some(status), _) => FetchError::Status {
                url: url.clone(),
                status,
            },
            (None, reason) => FetchError::Request {
                url: url.clone(),
                reason,
            },
        })?;

        let io_err = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = File::create(dest).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        let copied = io::copy(&mut response.into_reader(), &mut writer).and_then(|n| {
            writer.flush()?;
            Ok(n)
        });

        match copied {
            Ok(bytes) => {
                log::info!("Download complete ({} bytes)", bytes);
                Ok(bytes)
            }
            Err(e) => {
                drop(writer);
                let _ = std::fs::remove_file(dest);
                // A body cut short is a network failure, not a disk one.
                if e.kind() == io::ErrorKind::UnexpectedEof
                    || e.kind() == io::ErrorKind::ConnectionReset
                {
                    Err(FetchError::Request {
                        url,
                        reason: e.to_string(),
                    })
                } else {
                    Err(io_err(e))
                }
            }
        }
    }
}
