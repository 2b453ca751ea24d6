//! crates.io client: version lookup and archive download.
//!
//! Both operations are plain blocking `GET`s through one `ureq` agent. No
//! timeout is configured; the job relies on transport defaults and the
//! scheduler re-running it.

mod download;
mod resolve;

pub use download::FetchError;
pub use resolve::ResolutionError;

/// Default API base for metadata queries.
pub const DEFAULT_API_BASE: &str = "https://crates.io/api/v1";

/// Default base for `.crate` downloads.
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://static.crates.io";

/// crates.io asks API clients to identify themselves.
const USER_AGENT: &str = concat!(
    "crate-mirror/",
    env!("CARGO_PKG_VERSION"),
    " (release mirroring job)"
);

/// Blocking registry client.
pub struct RegistryClient {
    agent: ureq::Agent,
    api_base: String,
    download_base: String,
}

impl RegistryClient {
    /// Create a client against the given API and download bases.
    ///
    /// Trailing slashes are trimmed so URL joining stays predictable.
    pub fn new(api_base: &str, download_base: &str) -> Self {
        Self {
            agent: ureq::builder().user_agent(USER_AGENT).build(),
            api_base: api_base.trim_end_matches('/').to_string(),
            download_base: download_base.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_DOWNLOAD_BASE)
    }
}

/// Describe a transport-level failure without the response body.
fn describe_error(err: ureq::Error) -> (Option<u16>, String) {
    match err {
        ureq::Error::Status(code, _) => (Some(code), format!("HTTP {}", code)),
        ureq::Error::Transport(e) => (None, format!("transport error: {}", e)),
    }
}
