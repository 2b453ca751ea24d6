//! Push/clone remote with a transient credential.

use std::fmt;

use crate::types::{AccessToken, Owner, Repo};

/// Username GitHub expects when a token is used as the URL credential.
const TOKEN_USERNAME: &str = "x-access-token";

/// A git remote plus the credential used to reach it.
///
/// The public URL is what gets stored in `.git/config` and logs. The
/// authenticated URL is built on demand and only ever handed to a single
/// `git clone` / `git push` invocation.
#[derive(Clone)]
pub struct Remote {
    public_url: String,
    token: Option<AccessToken>,
}

impl Remote {
    /// `{base}/{owner}/{repo}.git` authenticated with `token`.
    pub fn hosted(base: &str, owner: &Owner, repo: &Repo, token: AccessToken) -> Self {
        let repo = repo.as_str();
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        Self {
            public_url: format!("{}/{}/{}.git", base.trim_end_matches('/'), owner, repo),
            token: Some(token),
        }
    }

    /// A remote reachable without credentials, e.g. a local bare repository.
    pub fn anonymous(url: impl Into<String>) -> Self {
        Self {
            public_url: url.into(),
            token: None,
        }
    }

    /// URL without credentials.
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// URL carrying the token as userinfo, for HTTP(S) remotes only.
    ///
    /// Other transports (local paths, `file://`, ssh) are returned as-is.
    pub(crate) fn authenticated_url(&self) -> String {
        let Some(token) = &self.token else {
            return self.public_url.clone();
        };

        for scheme in ["https://", "http://"] {
            if let Some(rest) = self.public_url.strip_prefix(scheme) {
                return format!(
                    "{}{}:{}@{}",
                    scheme,
                    TOKEN_USERNAME,
                    token.expose(),
                    rest
                );
            }
        }

        self.public_url.clone()
    }

    /// Replace every occurrence of the token in `text`.
    pub(crate) fn redact(&self, text: &str) -> String {
        match &self.token {
            Some(token) if !token.expose().is_empty() => text.replace(token.expose(), "****"),
            _ => text.to_string(),
        }
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("public_url", &self.public_url)
            .field("token", &self.token)
            .finish()
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.public_url)
    }
}
