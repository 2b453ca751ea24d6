//! Repository Synchronizer
//!
//! Converges a mirror repository to the content of one release. Both
//! strategies share the same algorithm:
//!
//! 1. establish the working tree (`SyncStrategy::prepare`)
//! 2. replace tracked content, keeping `.git`
//! 3. stage everything and ask git whether anything changed
//! 4. commit (only on change for `CommitPolicy::WhenChanged`)
//! 5. tag `{prefix}{version}`; failure is a warning, never fatal
//! 6. push (`SyncStrategy::publish`)

mod fresh;
mod persistent;
mod tree;

pub use fresh::FreshStrategy;
pub use persistent::PersistentStrategy;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Mode;
use crate::git::{GitCli, GitError, Remote, head_commit, open_repository, tag_exists};
use crate::types::{Release, TagName};

/// Errors returned by repository synchronization.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),
    /// Replacing working tree content failed.
    #[error("failed to update working tree at {}: {source}", path.display())]
    Content {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A commit was recorded but HEAD does not resolve to it.
    #[error("HEAD does not point at a commit after committing")]
    MissingHead,
}

/// Result of the best-effort tag step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// The tag was created at the new commit.
    Created(TagName),
    /// The tag could not be created (usually because it already exists).
    Conflict { tag: TagName, reason: String },
}

impl TagOutcome {
    /// The tag name this outcome refers to.
    pub fn tag(&self) -> &TagName {
        match self {
            TagOutcome::Created(tag) => tag,
            TagOutcome::Conflict { tag, .. } => tag,
        }
    }
}

/// Observable result of one synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The mirror already holds this content; nothing was committed or pushed.
    UpToDate,
    /// A commit was created and pushed.
    Published { commit: String, tag: TagOutcome },
}

/// When the shared algorithm records a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Commit even if the tree is unchanged.
    Always,
    /// Commit only if staging reports a change.
    WhenChanged,
}

/// Everything a strategy needs to prepare or publish a working tree.
pub struct SyncContext<'a> {
    pub git: &'a GitCli,
    pub work_tree: &'a Path,
    pub remote: &'a Remote,
    pub branch: &'a str,
}

/// How the working tree is established and how results reach the remote.
pub trait SyncStrategy {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn commit_policy(&self) -> CommitPolicy;

    /// Leave a repository at `ctx.work_tree` with HEAD on `ctx.branch`.
    fn prepare(&self, ctx: &SyncContext<'_>) -> Result<(), RepositoryError>;

    /// Push the new commit (and tag, when created) to `ctx.remote`.
    fn publish(&self, ctx: &SyncContext<'_>, tag: &TagOutcome) -> Result<(), RepositoryError>;
}

/// Select the strategy implementing `mode`.
pub fn strategy_for(mode: Mode) -> Box<dyn SyncStrategy> {
    match mode {
        Mode::Fresh => Box::new(FreshStrategy),
        Mode::Persistent => Box::new(PersistentStrategy),
    }
}

fn short_sha(sha: &str) -> &str {
    if sha.len() > 12 { &sha[..12] } else { sha }
}

/// Drives one strategy through the shared convergence algorithm.
pub struct Synchronizer {
    git: GitCli,
    strategy: Box<dyn SyncStrategy>,
    remote: Remote,
    branch: String,
    tag_prefix: String,
}

impl Synchronizer {
    /// Create a synchronizer pushing to `branch` of `remote`.
    pub fn new(
        git: GitCli,
        strategy: Box<dyn SyncStrategy>,
        remote: Remote,
        branch: impl Into<String>,
        tag_prefix: impl Into<String>,
    ) -> Self {
        Self {
            git,
            strategy,
            remote,
            branch: branch.into(),
            tag_prefix: tag_prefix.into(),
        }
    }

    /// Make the mirror at `work_tree` hold exactly `content` for `release`.
    pub fn synchronize(
        &self,
        work_tree: &Path,
        content: &Path,
        release: &Release,
    ) -> Result<SyncOutcome, RepositoryError> {
        let ctx = SyncContext {
            git: &self.git,
            work_tree,
            remote: &self.remote,
            branch: &self.branch,
        };

        log::info!(
            "Preparing {} working tree for {} ({} strategy)",
            self.branch,
            self.remote,
            self.strategy.name()
        );
        self.strategy.prepare(&ctx)?;

        tree::replace_tracked(work_tree, content)?;
        self.git.add_all(work_tree)?;
        let changed = self.git.has_changes(work_tree)?;

        if !changed && self.strategy.commit_policy() == CommitPolicy::WhenChanged {
            log::info!("{} is already up to date, nothing to commit", release);
            return Ok(SyncOutcome::UpToDate);
        }

        self.git
            .commit(work_tree, &release.commit_message(), !changed)?;
        let repo = open_repository(work_tree)?;
        let commit = head_commit(&repo)?.ok_or(RepositoryError::MissingHead)?;
        log::info!("Committed {} as {}", release, short_sha(&commit));

        let tag = self.create_tag(work_tree, release);

        log::info!("Pushing to {}", self.remote);
        self.strategy.publish(&ctx, &tag)?;

        Ok(SyncOutcome::Published { commit, tag })
    }

    fn create_tag(&self, work_tree: &Path, release: &Release) -> TagOutcome {
        let tag = TagName::for_version(&self.tag_prefix, &release.version);

        match self.git.tag(work_tree, tag.as_str()) {
            Ok(()) => {
                log::info!("Created tag {}", tag);
                TagOutcome::Created(tag)
            }
            Err(err) => {
                let reason = match open_repository(work_tree) {
                    Ok(repo) if tag_exists(&repo, tag.as_str()) => "tag already exists".to_string(),
                    _ => err.to_string(),
                };
                log::warn!("Could not create tag {}: {}", tag, reason);
                TagOutcome::Conflict { tag, reason }
            }
        }
    }
}
