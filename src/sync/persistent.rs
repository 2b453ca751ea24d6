//! Mode B: keep the remote history and append one commit per release.

use crate::git::{open_repository, remote_branch_exists};

use super::{CommitPolicy, RepositoryError, SyncContext, SyncStrategy, TagOutcome, tree};

/// Clones the remote, continues its branch and pushes without force.
#[derive(Debug, Default, Clone, Copy)]
pub struct PersistentStrategy;

impl SyncStrategy for PersistentStrategy {
    fn name(&self) -> &'static str {
        "persistent"
    }

    fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::WhenChanged
    }

    fn prepare(&self, ctx: &SyncContext<'_>) -> Result<(), RepositoryError> {
        tree::remove_if_exists(ctx.work_tree)?;
        ctx.git.clone(ctx.remote, ctx.work_tree)?;

        let repo = open_repository(ctx.work_tree)?;
        if remote_branch_exists(&repo, ctx.branch) {
            let upstream = format!("origin/{}", ctx.branch);
            ctx.git
                .checkout_branch(ctx.work_tree, ctx.branch, &upstream)?;
        } else {
            log::info!(
                "Remote has no {} branch yet, starting a new history",
                ctx.branch
            );
            ctx.git.set_unborn_branch(ctx.work_tree, ctx.branch)?;
        }
        Ok(())
    }

    fn publish(&self, ctx: &SyncContext<'_>, _tag: &TagOutcome) -> Result<(), RepositoryError> {
        ctx.git
            .push_branch(ctx.work_tree, ctx.remote, ctx.branch, false)?;
        ctx.git.push_tags(ctx.work_tree, ctx.remote)?;
        Ok(())
    }
}
