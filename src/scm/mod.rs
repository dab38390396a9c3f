//! Capability traits consumed by the publish workflow.
//!
//! Each trait covers one need so callers can be handed a narrow fake in tests
//! instead of the full [`crate::adapter::SourceAdapter`].

pub mod types;

pub use types::{FileAction, FileChange, Issue, PullRequest};

use async_trait::async_trait;

use crate::git::process::CallContext;
use crate::git::GitError;
use crate::remote::RemoteError;
use crate::webhook::WebhookError;

/// Turns a raw inbound event into an [`Issue`].
pub trait WebhookSource: Send + Sync {
    fn parse_webhook(&self, body: &[u8], signature: &str) -> Result<Issue, WebhookError>;
}

#[async_trait]
pub trait IssueReader: Send + Sync {
    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, RemoteError>;
}

#[async_trait]
pub trait CommentPoster: Send + Sync {
    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait PullRequestOpener: Send + Sync {
    /// `head` must already be pushed; the remote validates the pair.
    async fn create_pr(
        &self,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, RemoteError>;
}

/// The local checkout. Implementations assume one caller at a time.
#[async_trait]
pub trait GitWorkspace: Send + Sync {
    /// Whether the workspace already holds a checkout.
    fn is_cloned(&self) -> bool;

    async fn checkout(&self, ctx: &CallContext, name: &str) -> Result<(), GitError>;

    async fn clone_or_pull(&self, ctx: &CallContext) -> Result<(), GitError>;

    async fn create_branch(&self, ctx: &CallContext, name: &str) -> Result<(), GitError>;

    async fn commit_and_push(
        &self,
        ctx: &CallContext,
        changes: &[FileChange],
        message: &str,
    ) -> Result<(), GitError>;
}
