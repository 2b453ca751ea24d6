//! Version Resolver: latest stable (or latest) version of a crate.

use std::io::Read;

use serde::Deserialize;
use thiserror::Error;

use super::{RegistryClient, describe_error};
use crate::types::{PackageName, ParseError, Version};

/// Errors returned while resolving the version to mirror.
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// The registry could not be reached.
    #[error("registry request to {url} failed: {reason}")]
    Unreachable { url: String, reason: String },
    /// The registry answered with a non-success status.
    #[error("registry returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    /// The body was not the expected JSON document.
    #[error("malformed registry response: {0}")]
    Malformed(String),
    /// Neither `max_stable_version` nor `max_version` was present.
    #[error("registry lists no version for crate {0}")]
    NoVersion(String),
    /// The registry returned a version we refuse to put in paths and tags.
    #[error("registry returned unusable version '{version}': {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: ParseError,
    },
}

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateSummary,
}

#[derive(Debug, Deserialize)]
struct CrateSummary {
    #[serde(default)]
    max_stable_version: Option<String>,
    #[serde(default)]
    max_version: Option<String>,
}

impl CrateSummary {
    /// Prefer the latest stable release, fall back to the latest of any kind.
    fn preferred_version(&self) -> Option<&str> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().filter(|s| !s.trim().is_empty())
        }
        non_empty(&self.max_stable_version).or_else(|| non_empty(&self.max_version))
    }
}

/// Pick the version to mirror from a raw `/crates/{name}` response body.
fn select_version(name: &PackageName, body: &[u8]) -> Result<Version, ResolutionError> {
    let response: CrateResponse =
        serde_json::from_slice(body).map_err(|e| ResolutionError::Malformed(e.to_string()))?;

    let raw = response
        .krate
        .preferred_version()
        .ok_or_else(|| ResolutionError::NoVersion(name.to_string()))?;

    raw.parse::<Version>()
        .map_err(|source| ResolutionError::InvalidVersion {
            version: raw.to_string(),
            source,
        })
}

impl RegistryClient {
    /// URL of the metadata document for `name`.
    pub fn crate_url(&self, name: &PackageName) -> String {
        format!("{}/crates/{}", self.api_base, name)
    }

    /// Resolve the version of `name` to mirror.
    pub fn latest_version(&self, name: &PackageName) -> Result<Version, ResolutionError> {
        let url = self.crate_url(name);
        log::info!("Fetching latest version for crate {}", name);

        let response = self.agent.get(&url).call().map_err(|e| match describe_error(e) {
            (Some(status), _) => ResolutionError::Status {
                url: url.clone(),
                status,
            },
            (None, reason) => ResolutionError::Unreachable {
                url: url.clone(),
                reason,
            },
        })?;

        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| ResolutionError::Unreachable {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let version = select_version(name, &body)?;
        log::info!("Found latest version: {}", version);
        Ok(version)
    }
}
