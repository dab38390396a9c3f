use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::scm::types::IssuePayload;
use crate::scm::{CommentPoster, Issue, IssueReader, PullRequest, PullRequestOpener};

const USER_AGENT: &str = "scm-bridge";

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation}: request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: GitHub returned {status}: {body}")]
    Status {
        operation: String,
        status: StatusCode,
        body: String,
    },

    #[error("{operation}: rejected by GitHub: {body}")]
    Validation { operation: String, body: String },
}

#[cfg(test)]
impl RemoteError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            RemoteError::Validation { .. } => Some(StatusCode::UNPROCESSABLE_ENTITY),
            RemoteError::Transport { source, .. } => source.status(),
        }
    }
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    title: String,
}

/// GitHub REST client. Issue calls name their repository; pull requests are
/// opened against the repository the client was built for.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, RemoteError> {
        let operation = format!("get issue #{number} in {owner}/{repo}");
        let url = format!("{}/repos/{}/{}/issues/{}", self.api_url, owner, repo, number);

        debug!("fetching issue");
        let response = self.send(&operation, self.http.get(&url)).await?;
        let payload: IssuePayload = response
            .json()
            .await
            .map_err(|source| RemoteError::Transport { operation, source })?;
        Ok(Issue::from(payload))
    }

    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), RemoteError> {
        let operation = format!("comment on #{number} in {owner}/{repo}");
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_url, owner, repo, number
        );

        debug!("posting comment");
        self.send(
            &operation,
            self.http.post(&url).json(&serde_json::json!({ "body": body })),
        )
        .await?;
        Ok(())
    }

    /// Open a PR from `head` into `base`. Identical or unknown branches are
    /// left for GitHub to reject.
    #[instrument(skip(self, body), fields(owner = %self.owner, repo = %self.repo))]
    pub async fn create_pr(
        &self,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, RemoteError> {
        let operation = format!(
            "create pull request {head} -> {base} in {}/{}",
            self.owner, self.repo
        );
        let url = format!("{}/repos/{}/{}/pulls", self.api_url, self.owner, self.repo);
        let payload = serde_json::json!({
            "title": title,
            "head": head,
            "base": base,
            "body": body,
        });

        debug!("creating pull request");
        let response = self.send(&operation, self.http.post(&url).json(&payload)).await?;
        let created: PullResponse = response
            .json()
            .await
            .map_err(|source| RemoteError::Transport { operation, source })?;
        debug!(number = created.number, "pull request created");

        Ok(PullRequest {
            number: created.number,
            url: created.html_url,
            title: created.title,
        })
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = request
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                operation: operation.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            Err(RemoteError::Validation {
                operation: operation.to_string(),
                body,
            })
        } else {
            Err(RemoteError::Status {
                operation: operation.to_string(),
                status,
                body,
            })
        }
    }
}

#[async_trait]
impl IssueReader for GitHubClient {
    async fn get_issue(&self, owner: &str, repo: &str, number: u64) -> Result<Issue, RemoteError> {
        GitHubClient::get_issue(self, owner, repo, number).await
    }
}

#[async_trait]
impl CommentPoster for GitHubClient {
    async fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<(), RemoteError> {
        GitHubClient::post_comment(self, owner, repo, number, body).await
    }
}

#[async_trait]
impl PullRequestOpener for GitHubClient {
    async fn create_pr(
        &self,
        base: &str,
        head: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest, RemoteError> {
        GitHubClient::create_pr(self, base, head, title, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(server.uri(), "test-token", "org", "repo")
    }

    #[tokio::test]
    async fn test_get_issue_maps_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/issues/7"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1001,
                "number": 7,
                "title": "New feature request",
                "body": "Please add dark mode",
                "created_at": "2024-01-15T10:30:00Z",
                "user": {"login": "contributor"},
                "labels": [{"name": "enhancement"}, {"name": "ui"}],
                "state": "open"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let issue = client(&server).get_issue("org", "repo", 7).await.unwrap();
        assert_eq!(issue.id, "1001");
        assert_eq!(issue.number, 7);
        assert_eq!(issue.author, "contributor");
        assert_eq!(issue.labels, vec!["enhancement", "ui"]);
    }

    #[tokio::test]
    async fn test_get_issue_not_found_names_the_issue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/issues/404"))
            .respond_with(ResponseTemplate::new(404).set_body_string("{\"message\":\"Not Found\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .get_issue("org", "repo", 404)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert!(err.to_string().contains("#404"));
    }

    #[tokio::test]
    async fn test_post_comment_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/org/repo/issues/7/comments"))
            .and(body_json(serde_json::json!({"body": "Working on it"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .post_comment("org", "repo", 7, "Working on it")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_post_comment_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/org/repo/issues/7/comments"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .post_comment("org", "repo", 7, "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Status { status, .. } if status == StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn test_create_pr_returns_result_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/org/repo/pulls"))
            .and(body_json(serde_json::json!({
                "title": "Fix #7",
                "head": "bot/issue-7",
                "base": "main",
                "body": "Closes #7"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "number": 12,
                "html_url": "https://github.com/org/repo/pull/12",
                "title": "Fix #7"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pr = client(&server)
            .create_pr("main", "bot/issue-7", "Fix #7", "Closes #7")
            .await
            .unwrap();
        assert_eq!(
            pr,
            PullRequest {
                number: 12,
                url: "https://github.com/org/repo/pull/12".to_string(),
                title: "Fix #7".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_create_pr_identical_branches_rejected_by_remote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/org/repo/pulls"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "Validation Failed",
                "errors": [{"message": "No commits between main and main"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server)
            .create_pr("main", "main", "t", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Validation { .. }));
        let message = err.to_string();
        assert!(message.contains("main -> main"));
        assert!(message.contains("No commits between"));
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_immediately() {
        // Nothing listens on the discard port
        let client = GitHubClient::new("http://127.0.0.1:9", "t", "org", "repo");
        let err = client.get_issue("org", "repo", 1).await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport { .. }));
        assert!(err.to_string().contains("#1"));
    }
}
