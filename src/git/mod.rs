//! Git operations using a hybrid CLI + libgit2 approach.
//!
//! **CLI (with hardening) for every operation that writes or talks to a remote:**
//! - `init`, `clone`, `checkout`, `add`, `commit`, `tag`, `push`
//! - credentials travel only inside the URL argument of `clone`/`push`
//!
//! **libgit2 for read operations:**
//! - `open_repository` - clean API for opening existing repos
//! - `head_commit` - efficient ref/commit reading
//! - `tag_exists`, `remote_branch_exists` - ref lookups

mod remote;

pub use remote::Remote;

use git2::Repository;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use thiserror::Error;

/// Errors returned by git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// Repository path does not contain a git repo.
    #[error("repository not found at {0}")]
    NotFound(String),
    /// Clone failed.
    #[error("clone failed: {0}")]
    CloneError(String),
    /// Branch checkout failed.
    #[error("checkout failed: {0}")]
    CheckoutError(String),
    /// Commit failed.
    #[error("commit failed: {0}")]
    CommitError(String),
    /// Tag creation failed.
    #[error("tag creation failed: {0}")]
    TagError(String),
    /// Push failed.
    #[error("push failed: {0}")]
    PushError(String),
    /// Any other git invocation failed.
    #[error("git {command} failed: {stderr}")]
    CommandError { command: String, stderr: String },
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid inputs were provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Validate that a git ref (branch or tag name) does not contain dangerous patterns.
///
/// Rejects:
/// - Empty strings
/// - Strings containing `..` (path traversal)
/// - Strings starting with `-` (could be interpreted as flags)
/// - Strings containing null bytes, control characters or spaces
fn validate_git_ref(value: &str, name: &str) -> Result<(), GitError> {
    if value.is_empty() {
        return Err(GitError::InvalidInput(format!("{} cannot be empty", name)));
    }
    if value.contains("..") {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain '..'",
            name
        )));
    }
    if value.starts_with('-') {
        return Err(GitError::InvalidInput(format!(
            "{} cannot start with '-'",
            name
        )));
    }
    if value.bytes().any(|b| b <= 0x20 || b == 0x7f) {
        return Err(GitError::InvalidInput(format!(
            "{} cannot contain whitespace, null or control characters",
            name
        )));
    }
    Ok(())
}

/// Author/committer identity passed per invocation.
///
/// Passed with `-c user.name=… -c user.email=…` so nothing is written to the
/// global or repository config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: "GitHub Action".into(),
            email: "action@github.com".into(),
        }
    }
}

/// Environment variables that take precedence over `user.name`/`user.email`.
const IDENTITY_ENV: [&str; 4] = [
    "GIT_AUTHOR_NAME",
    "GIT_AUTHOR_EMAIL",
    "GIT_COMMITTER_NAME",
    "GIT_COMMITTER_EMAIL",
];

fn path_str<'a>(path: &'a Path, what: &str) -> Result<&'a str, GitError> {
    path.to_str()
        .ok_or_else(|| GitError::InvalidInput(format!("{} path is not valid UTF-8", what)))
}

/// Git CLI wrapper with security hardening.
pub struct GitCli {
    git_path: String,
    identity: Identity,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(Identity::default())
    }
}

impl GitCli {
    /// Create a new GitCli instance using the system git.
    pub fn new(identity: Identity) -> Self {
        Self {
            git_path: "git".into(),
            identity,
        }
    }

    /// Use another git executable.
    #[cfg(test)]
    fn with_git_path(mut self, git_path: impl Into<String>) -> Self {
        self.git_path = git_path.into();
        self
    }

    /// Create a hardened Command with security settings.
    ///
    /// Applies:
    /// - `GIT_LFS_SKIP_SMUDGE=1` - skip LFS file downloads
    /// - `GIT_TERMINAL_PROMPT=0` - disable interactive prompts
    /// - `core.hooksPath=` - disable hooks execution
    /// - `commit.gpgsign=false`, `tag.gpgsign=false` - never block on a signing agent
    /// - `user.name`/`user.email` - the configured identity, with git's own
    ///   `GIT_AUTHOR_*`/`GIT_COMMITTER_*` overrides removed from the environment
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git_path);
        cmd.env("GIT_LFS_SKIP_SMUDGE", "1");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        for var in IDENTITY_ENV {
            cmd.env_remove(var);
        }
        cmd.args(["-c", "core.hooksPath="]);
        cmd.args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"]);
        cmd.arg("-c")
            .arg(format!("user.name={}", self.identity.name));
        cmd.arg("-c")
            .arg(format!("user.email={}", self.identity.email));
        cmd.stdin(Stdio::null());
        cmd
    }

    /// Run `git [-C dir] args…`, returning the output on success and the
    /// (redacted) stderr on failure.
    fn run(
        &self,
        dir: Option<&Path>,
        args: &[&str],
        remote: Option<&Remote>,
    ) -> Result<Output, String> {
        let redact = |text: &str| match remote {
            Some(remote) => remote.redact(text),
            None => text.to_string(),
        };
        log::debug!("git {}", redact(&args.join(" ")));

        let mut cmd = self.command();
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        let output = cmd.args(args).output().map_err(|e| e.to_string())?;

        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(redact(stderr.trim()))
        }
    }

    /// Initialize an empty repository at `dir` with HEAD on `branch`.
    pub fn init(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;
        std::fs::create_dir_all(dir)?;

        self.run(Some(dir), &["init", "--quiet"], None)
            .map_err(|stderr| GitError::CommandError {
                command: "init".into(),
                stderr,
            })?;
        self.set_unborn_branch(dir, branch)
    }

    /// Clone `remote` into `dest` without checking anything out.
    ///
    /// The stored `origin` URL is reset to the credential-free URL before
    /// returning, so the token never persists in `.git/config`.
    pub fn clone(&self, remote: &Remote, dest: &Path) -> Result<(), GitError> {
        let dest_existed = dest.exists();

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = remote.authenticated_url();
        let dest_str = path_str(dest, "destination")?;

        let discard = || {
            if !dest_existed {
                let _ = std::fs::remove_dir_all(dest);
            }
        };

        if let Err(stderr) = self.run(
            None,
            &["clone", "--quiet", "--no-checkout", url.as_str(), dest_str],
            Some(remote),
        ) {
            discard();
            return Err(GitError::CloneError(stderr));
        }

        // A clone still holding the credential in `.git/config` is never kept.
        if let Err(stderr) = self.run(
            Some(dest),
            &["remote", "set-url", "origin", remote.public_url()],
            Some(remote),
        ) {
            discard();
            return Err(GitError::CommandError {
                command: "remote set-url".into(),
                stderr,
            });
        }

        Ok(())
    }

    /// Point HEAD at `refs/heads/{branch}` without creating the branch.
    pub fn set_unborn_branch(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;
        let target = format!("refs/heads/{}", branch);
        self.run(Some(dir), &["symbolic-ref", "HEAD", target.as_str()], None)
            .map_err(GitError::CheckoutError)?;
        Ok(())
    }

    /// Create or reset `branch` at `start_point` and check it out.
    pub fn checkout_branch(
        &self,
        dir: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;
        validate_git_ref(start_point, "start point")?;
        self.run(
            Some(dir),
            &["checkout", "--quiet", "-B", branch, start_point],
            None,
        )
        .map_err(GitError::CheckoutError)?;
        Ok(())
    }

    /// Stage every change in the working tree, including deletions.
    ///
    /// `--force` stages files matched by `.gitignore` or `core.excludesFile`
    /// too; mirrored content is committed exactly as released.
    pub fn add_all(&self, dir: &Path) -> Result<(), GitError> {
        self.run(Some(dir), &["add", "--all", "--force"], None)
            .map_err(|stderr| GitError::CommandError {
                command: "add".into(),
                stderr,
            })?;
        Ok(())
    }

    /// Whether `git status --porcelain` reports anything.
    pub fn has_changes(&self, dir: &Path) -> Result<bool, GitError> {
        let output = self
            .run(Some(dir), &["status", "--porcelain"], None)
            .map_err(|stderr| GitError::CommandError {
                command: "status".into(),
                stderr,
            })?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    /// Commit the staged changes.
    pub fn commit(&self, dir: &Path, message: &str, allow_empty: bool) -> Result<(), GitError> {
        let mut args = vec!["commit", "--quiet", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run(Some(dir), &args, None)
            .map_err(GitError::CommitError)?;
        Ok(())
    }

    /// Create a lightweight tag at HEAD.
    pub fn tag(&self, dir: &Path, tag: &str) -> Result<(), GitError> {
        validate_git_ref(tag, "tag")?;
        self.run(Some(dir), &["tag", tag], None)
            .map_err(GitError::TagError)?;
        Ok(())
    }

    /// Push HEAD to `refs/heads/{branch}` on `remote`.
    pub fn push_branch(
        &self,
        dir: &Path,
        remote: &Remote,
        branch: &str,
        force: bool,
    ) -> Result<(), GitError> {
        validate_git_ref(branch, "branch")?;
        let url = remote.authenticated_url();
        let refspec = format!("HEAD:refs/heads/{}", branch);

        let mut args = vec!["push", "--quiet"];
        if force {
            args.push("--force");
        }
        args.push(&url);
        args.push(&refspec);

        self.run(Some(dir), &args, Some(remote))
            .map_err(GitError::PushError)?;
        Ok(())
    }

    /// Push a single tag to `remote`.
    pub fn push_tag(
        &self,
        dir: &Path,
        remote: &Remote,
        tag: &str,
        force: bool,
    ) -> Result<(), GitError> {
        validate_git_ref(tag, "tag")?;
        let url = remote.authenticated_url();
        let refspec = format!("refs/tags/{0}:refs/tags/{0}", tag);

        let mut args = vec!["push", "--quiet"];
        if force {
            args.push("--force");
        }
        args.push(&url);
        args.push(&refspec);

        self.run(Some(dir), &args, Some(remote))
            .map_err(GitError::PushError)?;
        Ok(())
    }

    /// Push every local tag to `remote`.
    pub fn push_tags(&self, dir: &Path, remote: &Remote) -> Result<(), GitError> {
        let url = remote.authenticated_url();
        self.run(Some(dir), &["push", "--quiet", url.as_str(), "--tags"], Some(remote))
            .map_err(GitError::PushError)?;
        Ok(())
    }
}

/// Open an existing repository at the given path.
pub fn open_repository(path: &Path) -> Result<Repository, GitError> {
    let repo = Repository::open(path).map_err(|e| {
        if e.code() == git2::ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })?;
    Ok(repo)
}

/// Resolve the HEAD commit SHA, or `None` on an unborn branch.
pub fn head_commit(repo: &Repository) -> Result<Option<String>, GitError> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?.id().to_string())),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(GitError::Git(e)),
    }
}

/// Check whether `refs/tags/{tag}` exists.
pub fn tag_exists(repo: &Repository, tag: &str) -> bool {
    repo.find_reference(&format!("refs/tags/{}", tag)).is_ok()
}

/// Check whether the clone has `refs/remotes/origin/{branch}`.
pub fn remote_branch_exists(repo: &Repository, branch: &str) -> bool {
    repo.find_reference(&format!("refs/remotes/origin/{}", branch))
        .is_ok()
}
