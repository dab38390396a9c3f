use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::remote::RemoteError;
use crate::scm::CommentPoster;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(#[from] RemoteError),
}

/// Outbound channel for a single formatted message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Writes the message to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        info!(target: "scm_bridge::notify", "{}", message);
        Ok(())
    }
}

/// Posts the message as a comment on one issue.
pub struct IssueCommentNotifier<'a> {
    poster: &'a dyn CommentPoster,
    owner: String,
    repo: String,
    number: u64,
}

impl<'a> IssueCommentNotifier<'a> {
    pub fn new(poster: &'a dyn CommentPoster, owner: &str, repo: &str, number: u64) -> Self {
        Self {
            poster,
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        }
    }
}

#[async_trait]
impl<'a> Notifier for IssueCommentNotifier<'a> {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        self.poster
            .post_comment(&self.owner, &self.repo, self.number, message)
            .await?;
        Ok(())
    }
}
