//! Command-line and environment configuration.
//!
//! Every flag is also readable from an environment variable so the binary can
//! run unattended from a scheduled CI job. `Config::from_args` is the only
//! place raw strings become typed values.

use std::fmt;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::git::{Identity, Remote};
use crate::paths::WorkPaths;
use crate::registry::{DEFAULT_API_BASE, DEFAULT_DOWNLOAD_BASE};
use crate::types::{AccessToken, Owner, PackageName, ParseError, Repo};

/// Errors returned while validating configuration.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// One or more required settings were absent or empty.
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    /// A setting was present but not a valid value.
    #[error("invalid {name} '{value}': {source}")]
    Invalid {
        name: &'static str,
        value: String,
        #[source]
        source: ParseError,
    },
}

/// How the mirror repository is produced.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// New single-commit history every run, force-pushed.
    Fresh,
    /// Append to the existing remote history.
    Persistent,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Fresh => write!(f, "fresh"),
            Mode::Persistent => write!(f, "persistent"),
        }
    }
}

#[derive(Parser)]
#[command(
    name = "crate-mirror",
    version,
    about = "Mirror the latest crates.io release of a package into a git repository"
)]
pub struct Args {
    /// Package to mirror
    #[arg(long, env = "CRATE_NAME", default_value = "novel-cli")]
    pub crate_name: String,

    /// Owner of the mirror repository
    #[arg(long, env = "GH_USER")]
    pub owner: Option<String>,

    /// Name of the mirror repository
    #[arg(long, env = "REPO_NAME")]
    pub repo: Option<String>,

    /// Access token with push rights on the mirror repository
    #[arg(long, env = "GH_PAT", hide_env_values = true)]
    pub token: Option<String>,

    /// Synchronization mode
    #[arg(long, env = "MIRROR_MODE", value_enum, default_value_t = Mode::Persistent)]
    pub mode: Mode,

    /// Branch that receives the mirrored content
    #[arg(long, env = "MIRROR_BRANCH", default_value = "main")]
    pub branch: String,

    /// Prefix prepended to the version to form the tag name
    #[arg(long, env = "MIRROR_TAG_PREFIX", default_value = "v")]
    pub tag_prefix: String,

    /// Scratch directory for downloads and the working tree
    #[arg(long, env = "MIRROR_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Registry API base URL
    #[arg(long, env = "REGISTRY_API", default_value = DEFAULT_API_BASE)]
    pub registry_api: String,

    /// Registry download base URL
    #[arg(long, env = "REGISTRY_DOWNLOAD", default_value = DEFAULT_DOWNLOAD_BASE)]
    pub registry_download: String,

    /// Base URL (or local path) of the git host
    #[arg(long, env = "MIRROR_REMOTE_BASE", default_value = "https://github.com")]
    pub remote_base: String,

    /// Commit author name
    #[arg(long, env = "MIRROR_AUTHOR_NAME", default_value = "GitHub Action")]
    pub author_name: String,

    /// Commit author email
    #[arg(long, env = "MIRROR_AUTHOR_EMAIL", default_value = "action@github.com")]
    pub author_email: String,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub package: PackageName,
    pub owner: Owner,
    pub repo: Repo,
    pub token: AccessToken,
    pub mode: Mode,
    pub branch: String,
    pub tag_prefix: String,
    pub paths: WorkPaths,
    pub registry_api: String,
    pub registry_download: String,
    pub remote_base: String,
    pub identity: Identity,
}

/// Treat unset and blank values the same way.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse<T>(name: &'static str, value: String) -> Result<T, ConfigurationError>
where
    T: std::str::FromStr<Err = ParseError>,
{
    value
        .parse()
        .map_err(|source| ConfigurationError::Invalid {
            name,
            value,
            source,
        })
}

impl Config {
    /// Validate parsed arguments.
    ///
    /// All missing credentials are reported together so a misconfigured job
    /// can be fixed in one pass.
    pub fn from_args(args: Args) -> Result<Self, ConfigurationError> {
        let owner = present(args.owner);
        let repo = present(args.repo);
        let token = present(args.token);

        let mut missing = Vec::new();
        if owner.is_none() {
            missing.push("GH_USER");
        }
        if repo.is_none() {
            missing.push("REPO_NAME");
        }
        if token.is_none() {
            missing.push("GH_PAT");
        }

        let (Some(owner), Some(repo), Some(token)) = (owner, repo, token) else {
            return Err(ConfigurationError::Missing(missing));
        };

        let paths = match args.work_dir {
            Some(dir) => WorkPaths::new(dir),
            None => WorkPaths::default(),
        };

        Ok(Self {
            package: parse("CRATE_NAME", args.crate_name)?,
            owner: parse("GH_USER", owner)?,
            repo: parse("REPO_NAME", repo)?,
            token: AccessToken::new(token),
            mode: args.mode,
            branch: args.branch,
            tag_prefix: args.tag_prefix,
            paths,
            registry_api: args.registry_api,
            registry_download: args.registry_download,
            remote_base: args.remote_base,
            identity: Identity {
                name: args.author_name,
                email: args.author_email,
            },
        })
    }

    /// The mirror repository remote, authenticated with the configured token.
    pub fn remote(&self) -> Remote {
        Remote::hosted(
            &self.remote_base,
            &self.owner,
            &self.repo,
            self.token.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            crate_name: "novel-cli".into(),
            owner: Some("octocat".into()),
            repo: Some("novel-cli-mirror".into()),
            token: Some("ghp_secret".into()),
            mode: Mode::Persistent,
            branch: "main".into(),
            tag_prefix: "v".into(),
            work_dir: Some(PathBuf::from("/tmp/crate-mirror-test")),
            registry_api: DEFAULT_API_BASE.into(),
            registry_download: DEFAULT_DOWNLOAD_BASE.into(),
            remote_base: "https://github.com".into(),
            author_name: "GitHub Action".into(),
            author_email: "action@github.com".into(),
        }
    }

    #[test]
    fn valid_args_produce_config() {
        let config = Config::from_args(args()).unwrap();

        assert_eq!(config.package.as_str(), "novel-cli");
        assert_eq!(config.owner.as_str(), "octocat");
        assert_eq!(config.repo.as_str(), "novel-cli-mirror");
        assert_eq!(config.token.expose(), "ghp_secret");
        assert_eq!(config.mode, Mode::Persistent);
        assert_eq!(
            config.paths.root(),
            std::path::Path::new("/tmp/crate-mirror-test")
        );
        assert_eq!(
            config.remote().public_url(),
            "https://github.com/octocat/novel-cli-mirror.git"
        );
    }

    #[test]
    fn all_missing_credentials_reported_together() {
        let mut args = args();
        args.owner = None;
        args.repo = Some("   ".into());
        args.token = None;

        match Config::from_args(args) {
            Err(ConfigurationError::Missing(names)) => {
                assert_eq!(names, vec!["GH_USER", "REPO_NAME", "GH_PAT"]);
            }
            other => panic!("Expected Missing error, got: {:?}", other),
        }
    }

    #[test]
    fn missing_token_alone_is_reported() {
        let mut args = args();
        args.token = Some(String::new());

        let err = Config::from_args(args).unwrap_err();

        assert_eq!(err.to_string(), "missing required configuration: GH_PAT");
    }

    #[test]
    fn invalid_owner_is_rejected() {
        let mut args = args();
        args.owner = Some("-bad".into());

        match Config::from_args(args) {
            Err(ConfigurationError::Invalid { name, value, .. }) => {
                assert_eq!(name, "GH_USER");
                assert_eq!(value, "-bad");
            }
            other => panic!("Expected Invalid error, got: {:?}", other),
        }
    }

    #[test]
    fn invalid_package_name_is_rejected() {
        let mut args = args();
        args.crate_name = "9lives".into();

        assert!(matches!(
            Config::from_args(args),
            Err(ConfigurationError::Invalid {
                name: "CRATE_NAME",
                ..
            })
        ));
    }

    #[test]
    fn config_debug_hides_token() {
        let config = Config::from_args(args()).unwrap();
        assert!(!format!("{:?}", config).contains("ghp_secret"));
    }

    #[test]
    fn flags_parse_into_args() {
        let args = Args::try_parse_from([
            "crate-mirror",
            "--crate-name",
            "serde",
            "--owner",
            "octocat",
            "--repo",
            "serde-mirror",
            "--token",
            "t",
            "--mode",
            "fresh",
            "--branch",
            "release",
            "--tag-prefix",
            "serde-v",
        ])
        .unwrap();

        assert_eq!(args.crate_name, "serde");
        assert_eq!(args.mode, Mode::Fresh);
        assert_eq!(args.branch, "release");
        assert_eq!(args.tag_prefix, "serde-v");
    }

    #[test]
    fn author_identity_env_does_not_collide_with_git() {
        use clap::CommandFactory;

        let command = Args::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(|env| env.to_string_lossy().into_owned())
        };

        assert_eq!(env_of("author_name").as_deref(), Some("MIRROR_AUTHOR_NAME"));
        assert_eq!(env_of("author_email").as_deref(), Some("MIRROR_AUTHOR_EMAIL"));
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        assert!(Args::try_parse_from(["crate-mirror", "--mode", "mirror"]).is_err());
    }

    #[test]
    fn mode_display_matches_flag_values() {
        assert_eq!(Mode::Fresh.to_string(), "fresh");
        assert_eq!(Mode::Persistent.to_string(), "persistent");
    }
}
