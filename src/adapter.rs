//! One capability surface over webhook parsing, the GitHub API and the local
//! workspace of a single repository.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;
use crate::git::process::{CallContext, WorkspaceProcess};
use crate::git::{GitError, LocalGitOps};
use crate::remote::{GitHubClient, RemoteError};
use crate::scm::{
    CommentPoster, FileChange, GitWorkspace, Issue, IssueReader, PullRequest, PullRequestOpener,
    WebhookSource,
};
use crate::webhook::{WebhookError, WebhookParser};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("GitHub token not found in config or environment")]
    MissingToken,
}

/// Bound to exactly one `owner/repo`, one workspace directory and one token.
/// Build one per repository; nothing is shared between instances.
#[derive(Debug, Clone)]
pub struct SourceAdapter {
    webhook: WebhookParser,
    remote: GitHubClient,
    git: LocalGitOps,
    owner: String,
    repo: String,
    token: String,
    git_timeout: std::time::Duration,
}

impl SourceAdapter {
    pub fn from_config(config: &Config, owner: &str, repo: &str) -> Result<Self, AdapterError> {
        let token = config.github_token().ok_or(AdapterError::MissingToken)?;

        let mut process = WorkspaceProcess::git(config.workspace_dir(owner, repo));
        if let Some(name) = &config.workspace.author_name {
            process = process
                .env("GIT_AUTHOR_NAME", name)
                .env("GIT_COMMITTER_NAME", name);
        }
        if let Some(email) = &config.workspace.author_email {
            process = process
                .env("GIT_AUTHOR_EMAIL", email)
                .env("GIT_COMMITTER_EMAIL", email);
        }

        Ok(Self {
            webhook: WebhookParser::new(config.webhook_secret()),
            remote: GitHubClient::new(config.api_url(), token.clone(), owner, repo),
            git: LocalGitOps::new(process, config.host()),
            owner: owner.to_string(),
            repo: repo.to_string(),
            token,
            git_timeout: config.git_timeout(),
        })
    }

    #[cfg(test)]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[cfg(test)]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn workspace(&self) -> &std::path::Path {
        self.git.workspace()
    }

    /// Caller's context, tightened by the configured per-call git timeout.
    fn git_ctx(&self, ctx: &CallContext) -> CallContext {
        ctx.child().timeout(self.git_timeout)
    }
}

impl WebhookSource for SourceAdapter {
    fn parse_webhook(&self, body: &[u8], signature: &str) -> Result<Issue, WebhookError> {
        self.webhook.parse(body, signature)
    }
}

#[async_trait]
impl IssueReader for SourceAdapter {
    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, RemoteError> {
        self.remote.get_issue(owner, repo, number).await
    }
}

#[async_trait]
impl CommentPoster for SourceAdapter {
    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), RemoteError> {
        self.remote.post_comment(owner, repo, number, body).await
    }
}

#[async_trait]
impl PullRequestOpener for SourceAdapter {
    async fn create_pr(
        &self,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, RemoteError> {
        self.remote.create_pr(base, head, title, body).await
    }
}

#[async_trait]
impl GitWorkspace for SourceAdapter {
    fn is_cloned(&self) -> bool {
        self.git.is_cloned()
    }

    async fn checkout(&self, ctx: &CallContext, name: &str) -> Result<(), GitError> {
        self.git.checkout(&self.git_ctx(ctx), name).await
    }

    async fn clone_or_pull(&self, ctx: &CallContext) -> Result<(), GitError> {
        self.git
            .clone_or_pull(&self.git_ctx(ctx), &self.owner, &self.repo, &self.token)
            .await
    }

    async fn create_branch(&self, ctx: &CallContext, name: &str) -> Result<(), GitError> {
        self.git.create_branch(&self.git_ctx(ctx), name).await
    }

    async fn commit_and_push(
        &self,
        ctx: &CallContext,
        changes: &[FileChange],
        message: &str,
    ) -> Result<(), GitError> {
        self.git
            .commit_and_push(&self.git_ctx(ctx), changes, message)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::signature;
    use std::path::PathBuf;

    fn config() -> Config {
        let mut config = Config::default();
        config.github.token = Some("tok".to_string());
        config.webhook.secret = Some("hook".to_string());
        config.workspace.root = Some(PathBuf::from("/srv/ws"));
        config
    }

    #[test]
    fn test_requires_token() {
        let err = SourceAdapter::from_config(&Config::default(), "org", "repo").unwrap_err();
        assert!(matches!(err, AdapterError::MissingToken));
    }

    #[test]
    fn test_binds_one_workspace_per_repository() {
        let config = config();
        let a = SourceAdapter::from_config(&config, "org", "one").unwrap();
        let b = SourceAdapter::from_config(&config, "org", "two").unwrap();
        assert_eq!(a.workspace(), PathBuf::from("/srv/ws/github.com/org/one"));
        assert_ne!(a.workspace(), b.workspace());
        assert_eq!((a.owner(), a.repo()), ("org", "one"));
    }

    #[test]
    fn test_parse_webhook_uses_configured_secret() {
        let adapter = SourceAdapter::from_config(&config(), "org", "repo").unwrap();
        let body = br#"{"issue":{"id":1,"number":3,"title":"t","user":{"login":"u"},"labels":[]}}"#;
        let issue = adapter
            .parse_webhook(body, &signature::sign(body, "hook"))
            .unwrap();
        assert_eq!(issue.number, 3);
        assert!(adapter.parse_webhook(body, "").is_err());
    }
}
