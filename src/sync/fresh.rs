//! Mode A: rebuild the mirror from an empty repository on every run.

use super::{CommitPolicy, RepositoryError, SyncContext, SyncStrategy, TagOutcome, tree};

/// Starts from `git init` and force-pushes, so the remote branch always
/// holds exactly one commit.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreshStrategy;

impl SyncStrategy for FreshStrategy {
    fn name(&self) -> &'static str {
        "fresh"
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::Always
    }

    fn prepare(&self, ctx: &SyncContext<'_>) -> Result<(), RepositoryError> {
        tree::remove_if_exists(ctx.work_tree)?;
        ctx.git.init(ctx.work_tree, ctx.branch)?;
        Ok(())
    }

    fn publish(&self, ctx: &SyncContext<'_>, tag: &TagOutcome) -> Result<(), RepositoryError> {
        ctx.git
            .push_branch(ctx.work_tree, ctx.remote, ctx.branch, true)?;
        if let TagOutcome::Created(tag) = tag {
            ctx.git
                .push_tag(ctx.work_tree, ctx.remote, tag.as_str(), true)?;
        }
        Ok(())
    }
}
