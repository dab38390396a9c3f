pub mod signature;

pub use signature::SignatureError;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::scm::types::IssuePayload;
use crate::scm::{Issue, WebhookSource};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("parse payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("payload does not contain an issue")]
    NotAnIssue,
}

/// The slice of a webhook envelope this adapter reads.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    issue: Option<IssuePayload>,
}

/// Verifies and normalizes inbound issue events using one shared secret.
#[derive(Clone)]
pub struct WebhookParser {
    secret: String,
}

impl WebhookParser {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify `signature` over the raw bytes, then extract the issue.
    ///
    /// Non-issue events (push, ping, ...) are rejected by the missing or zero
    /// `issue.number` rather than by an event-type header.
    #[instrument(skip_all, fields(body_bytes = body.len()))]
    pub fn parse(&self, body: &[u8], signature: &str) -> Result<Issue, WebhookError> {
        signature::verify(body, signature, &self.secret)?;

        let envelope: Envelope = serde_json::from_slice(body)?;
        let payload = envelope
            .issue
            .filter(|issue| issue.number != 0)
            .ok_or(WebhookError::NotAnIssue)?;

        let issue = Issue::from(payload);
        debug!(number = issue.number, author = %issue.author, labels = issue.labels.len(), "parsed issue webhook");
        Ok(issue)
    }
}

impl std::fmt::Debug for WebhookParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookParser")
            .field("verifies", &!self.secret.is_empty())
            .finish()
    }
}

impl WebhookSource for WebhookParser {
    fn parse_webhook(&self, body: &[u8], signature: &str) -> Result<Issue, WebhookError> {
        self.parse(body, signature)
    }
}
