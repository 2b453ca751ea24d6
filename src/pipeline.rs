//! One mirroring run: resolve, fetch, extract, synchronize.
//!
//! Stages run strictly in order and the first failure ends the run. Nothing
//! is retried or rolled back; the next scheduled run starts over.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::archive::{self, ExtractionError};
use crate::config::{Args, Config, ConfigurationError};
use crate::git::GitCli;
use crate::registry::{FetchError, RegistryClient, ResolutionError};
use crate::sync::{RepositoryError, SyncOutcome, Synchronizer, strategy_for};
use crate::types::Release;

/// A fatal run failure, named after the stage that produced it.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("version resolution failed: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("archive download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("archive extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("repository synchronization failed: {0}")]
    Repository(#[from] RepositoryError),
    #[error("failed to prepare work directory {}: {source}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub release: Release,
    pub outcome: SyncOutcome,
}

/// Validate `args` and run the mirror job.
///
/// Configuration is checked before any network access.
pub fn execute(args: Args) -> Result<RunReport, RunError> {
    let config = Config::from_args(args)?;
    run(&config)
}

/// Run the mirror job for a validated configuration.
pub fn run(config: &Config) -> Result<RunReport, RunError> {
    log::info!(
        "Mirroring {} into {}/{} ({} mode, branch {})",
        config.package,
        config.owner,
        config.repo,
        config.mode,
        config.branch
    );

    let paths = &config.paths;
    paths.reset_scratch().map_err(|source| RunError::WorkDir {
        path: paths.root().to_path_buf(),
        source,
    })?;

    let registry = RegistryClient::new(&config.registry_api, &config.registry_download);
    let version = registry.latest_version(&config.package)?;
    let release = Release::new(config.package.clone(), version);

    let archive_path = paths.archive_path(&release);
    registry.download_archive(&release, &archive_path)?;

    let source_dir = paths.source_dir();
    archive::extract_stripped(&archive_path, &source_dir)?;

    let synchronizer = Synchronizer::new(
        GitCli::new(config.identity.clone()),
        strategy_for(config.mode),
        config.remote(),
        config.branch.as_str(),
        config.tag_prefix.as_str(),
    );
    let outcome = synchronizer.synchronize(&paths.repo_dir(), &source_dir, &release)?;

    Ok(RunReport { release, outcome })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::sync::TagOutcome;
    use crate::testutil::{
        HttpFixture, bare_remote, commit_count, crate_tarball, head_message, list_files, tag_names,
    };
    use std::path::Path;
    use tempfile::tempdir;

    const METADATA: &[u8] = br#"{"crate":{"max_stable_version":"0.5.0","max_version":"0.6.0-rc.1"}}"#;

    fn registry() -> HttpFixture {
        HttpFixture::serve(vec![
            ("/api/v1/crates/pkg", 200, METADATA.to_vec()),
            (
                "/crates/pkg/pkg-0.5.0.crate",
                200,
                crate_tarball(&[("pkg-0.5.0/a.txt", "alpha"), ("pkg-0.5.0/sub/b.txt", "beta")]),
            ),
        ])
    }

    fn args(root: &Path, fixture: &HttpFixture, mode: Mode) -> Args {
        Args {
            crate_name: "pkg".into(),
            owner: Some("octocat".into()),
            repo: Some("mirror".into()),
            token: Some("ghp_secret".into()),
            mode,
            branch: "main".into(),
            tag_prefix: "v".into(),
            work_dir: Some(root.join("work")),
            registry_api: fixture.url("/api/v1"),
            registry_download: fixture.url(""),
            remote_base: root.join("remotes").to_str().unwrap().to_string(),
            author_name: "GitHub Action".into(),
            author_email: "action@github.com".into(),
        }
    }

    #[test]
    fn end_to_end_publishes_release() {
        let temp_dir = tempdir().unwrap();
        let remote = bare_remote(&temp_dir.path().join("remotes/octocat/mirror.git"));
        let fixture = registry();

        let report = execute(args(temp_dir.path(), &fixture, Mode::Persistent)).unwrap();

        assert_eq!(report.release.to_string(), "pkg@0.5.0");
        assert!(matches!(
            report.outcome,
            SyncOutcome::Published { tag: TagOutcome::Created(_), .. }
        ));
        let repo_dir = temp_dir.path().join("work/repo");
        assert_eq!(list_files(&repo_dir), vec!["a.txt", "sub/b.txt"]);
        assert_eq!(commit_count(&remote, "main"), 1);
        assert_eq!(tag_names(&remote), vec!["v0.5.0"]);
        assert!(head_message(&remote, "main").contains("0.5.0"));
        assert_eq!(
            fixture.requests(),
            vec!["/api/v1/crates/pkg", "/crates/pkg/pkg-0.5.0.crate"]
        );
    }

    #[test]
    fn second_run_is_up_to_date() {
        let temp_dir = tempdir().unwrap();
        let remote = bare_remote(&temp_dir.path().join("remotes/octocat/mirror.git"));
        let fixture = registry();

        execute(args(temp_dir.path(), &fixture, Mode::Persistent)).unwrap();
        let report = execute(args(temp_dir.path(), &fixture, Mode::Persistent)).unwrap();

        assert_eq!(report.outcome, SyncOutcome::UpToDate);
        assert_eq!(commit_count(&remote, "main"), 1);
        assert_eq!(tag_names(&remote), vec!["v0.5.0"]);
    }

    #[test]
    fn fresh_mode_keeps_single_commit() {
        let temp_dir = tempdir().unwrap();
        let remote = bare_remote(&temp_dir.path().join("remotes/octocat/mirror.git"));
        let fixture = registry();

        execute(args(temp_dir.path(), &fixture, Mode::Fresh)).unwrap();
        let report = execute(args(temp_dir.path(), &fixture, Mode::Fresh)).unwrap();

        assert!(matches!(report.outcome, SyncOutcome::Published { .. }));
        assert_eq!(commit_count(&remote, "main"), 1);
        assert_eq!(tag_names(&remote), vec!["v0.5.0"]);
    }

    fn assert_fails_before_network(mode: Mode) {
        let temp_dir = tempdir().unwrap();
        let remote = bare_remote(&temp_dir.path().join("remotes/octocat/mirror.git"));
        let fixture = registry();
        let mut args = args(temp_dir.path(), &fixture, mode);
        args.token = None;

        let result = execute(args);

        match result {
            Err(RunError::Configuration(ConfigurationError::Missing(names))) => {
                assert_eq!(names, vec!["GH_PAT"]);
            }
            other => panic!("Expected missing configuration, got: {:?}", other),
        }
        assert!(fixture.requests().is_empty());
        assert!(!temp_dir.path().join("work").exists());
        assert_eq!(commit_count(&remote, "main"), 0);
    }

    #[test]
    fn missing_credentials_fail_before_network_persistent() {
        assert_fails_before_network(Mode::Persistent);
    }

    #[test]
    fn missing_credentials_fail_before_network_fresh() {
        assert_fails_before_network(Mode::Fresh);
    }

    #[test]
    fn registry_failure_stops_before_git() {
        let temp_dir = tempdir().unwrap();
        let fixture = HttpFixture::serve(vec![]);

        let result = execute(args(temp_dir.path(), &fixture, Mode::Persistent));

        assert!(matches!(
            result,
            Err(RunError::Resolution(ResolutionError::Status { status: 404, .. }))
        ));
        assert!(!temp_dir.path().join("work/repo").exists());
    }

    #[test]
    fn missing_archive_is_fetch_error() {
        let temp_dir = tempdir().unwrap();
        let fixture = HttpFixture::serve(vec![("/api/v1/crates/pkg", 200, METADATA.to_vec())]);

        let result = execute(args(temp_dir.path(), &fixture, Mode::Persistent));

        assert!(matches!(
            result,
            Err(RunError::Fetch(FetchError::Status { status: 404, .. }))
        ));
    }

    #[test]
    fn run_error_names_stage() {
        let err = RunError::from(ConfigurationError::Missing(vec!["GH_PAT"]));
        assert_eq!(
            err.to_string(),
            "configuration error: missing required configuration: GH_PAT"
        );
    }
}
