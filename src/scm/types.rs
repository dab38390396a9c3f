use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of an issue, produced fresh by every webhook parse or API fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Platform-assigned id, stringified from the numeric id
    pub id: String,
    /// Issue number, unique within a repository
    pub number: u64,
    pub title: String,
    pub body: String,
    /// Author's login
    pub author: String,
    /// Label names in the order the platform sent them
    pub labels: Vec<String>,
    /// None when the platform timestamp was missing or unparseable
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub title: String,
}

/// What to do with a single path in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileAction {
    Create,
    Update,
    Delete,
    /// Anything else coming off the wire; rejected when the batch is applied.
    Other(String),
}

impl From<String> for FileAction {
    fn from(action: String) -> Self {
        match action.as_str() {
            "create" => FileAction::Create,
            "update" => FileAction::Update,
            "delete" => FileAction::Delete,
            _ => FileAction::Other(action),
        }
    }
}

impl From<FileAction> for String {
    fn from(action: FileAction) -> Self {
        action.to_string()
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileAction::Create => write!(f, "create"),
            FileAction::Update => write!(f, "update"),
            FileAction::Delete => write!(f, "delete"),
            FileAction::Other(action) => write!(f, "{}", action),
        }
    }
}

/// One mutation in a commit batch. `path` is relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub action: FileAction,
}

#[cfg(test)]
impl FileChange {
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            action: FileAction::Create,
        }
    }

    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            action: FileAction::Update,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            action: FileAction::Delete,
        }
    }
}

/// The `issue` object shared by webhook envelopes and the REST issue endpoint.
/// Every field defaults so that partial or foreign payloads still decode and
/// can be rejected on `number == 0`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuePayload {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub labels: Vec<LabelPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub login: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelPayload {
    #[serde(default)]
    pub name: String,
}

impl From<IssuePayload> for Issue {
    fn from(payload: IssuePayload) -> Self {
        // Timestamp is metadata only; a bad value must not sink the whole issue.
        let created_at = payload
            .created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Issue {
            id: payload.id.to_string(),
            number: payload.number,
            title: payload.title,
            body: payload.body.unwrap_or_default(),
            author: payload.user.map(|u| u.login).unwrap_or_default(),
            labels: payload.labels.into_iter().map(|l| l.name).collect(),
            created_at,
        }
    }
}
