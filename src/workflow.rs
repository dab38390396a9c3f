//! Issue to pull request: sync the workspace, branch, commit the generated
//! changes, push, open the PR, then report back.

use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::git::process::CallContext;
use crate::git::GitError;
use crate::notify::Notifier;
use crate::remote::RemoteError;
use crate::scm::{CommentPoster, FileChange, GitWorkspace, PullRequest, PullRequestOpener};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("sync workspace: {0}")]
    Sync(#[source] GitError),

    #[error(transparent)]
    Branch(GitError),

    #[error("commit and push: {0}")]
    Commit(#[source] GitError),

    #[error("open pull request: {0}")]
    PullRequest(#[source] RemoteError),
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub owner: String,
    pub repo: String,
    pub issue_number: u64,
    pub base: String,
    pub branch: String,
    pub changes: Vec<FileChange>,
    pub commit_message: String,
    pub title: String,
    pub body: String,
}

/// Everything `publish` needs from the source-control side.
pub trait Scm: GitWorkspace + PullRequestOpener + CommentPoster {}

impl<T: GitWorkspace + PullRequestOpener + CommentPoster> Scm for T {}

/// Run the whole issue-to-PR sequence.
///
/// An existing workspace is switched back to `base` before syncing, since
/// the previous run left it on its pushed feature branch.
///
/// Steps up to and including PR creation abort on failure. The progress
/// comment and notification run after the PR exists, so their failures are
/// logged and the PR is still returned.
pub async fn publish(
    scm: &dyn Scm,
    notifier: &dyn Notifier,
    ctx: &CallContext,
    request: &PublishRequest,
) -> Result<PullRequest, WorkflowError> {
    let span = info_span!(
        "publish",
        repo = %format!("{}/{}", request.owner, request.repo),
        issue = request.issue_number,
        branch = %request.branch,
    );

    async {
        if scm.is_cloned() {
            scm.checkout(ctx, &request.base)
                .await
                .map_err(WorkflowError::Sync)?;
        }
        info!("syncing workspace");
        scm.clone_or_pull(ctx).await.map_err(WorkflowError::Sync)?;

        scm.create_branch(ctx, &request.branch)
            .await
            .map_err(WorkflowError::Branch)?;

        info!(changes = request.changes.len(), "committing changes");
        scm.commit_and_push(ctx, &request.changes, &request.commit_message)
            .await
            .map_err(WorkflowError::Commit)?;

        let pr = scm
            .create_pr(&request.base, &request.branch, &request.title, &request.body)
            .await
            .map_err(WorkflowError::PullRequest)?;
        info!(pr = pr.number, url = %pr.url, "pull request opened");

        let comment = format!("Opened pull request #{}: {}", pr.number, pr.url);
        if let Err(e) = scm
            .post_comment(&request.owner, &request.repo, request.issue_number, &comment)
            .await
        {
            warn!(error = %e, "failed to post progress comment");
        }

        let summary = format!(
            "{}/{}#{} -> PR #{} \"{}\" ({})",
            request.owner, request.repo, request.issue_number, pr.number, pr.title, pr.url
        );
        if let Err(e) = notifier.notify(&summary).await {
            warn!(error = %e, "failed to send notification");
        }

        Ok(pr)
    }
    .instrument(span)
    .await
}
