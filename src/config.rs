use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = ".scm-bridge.toml";
const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_HOST: &str = "github.com";
const DEFAULT_WORKSPACE_ROOT: &str = "./workspaces";
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .scm-bridge.toml.
/// All fields are optional; secrets usually arrive through the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// REST API base URL (override for GitHub Enterprise or tests)
    pub api_url: Option<String>,
    /// Git host used to build clone URLs
    pub host: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Shared HMAC secret. Empty or missing disables signature checks.
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory under which one checkout per repository is kept
    pub root: Option<PathBuf>,
    /// Upper bound for a single git invocation
    pub git_timeout_secs: Option<u64>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Config {
    /// Load configuration from .scm-bridge.toml in the current directory.
    /// Returns default config if the file doesn't exist, then fills unset
    /// secrets from GITHUB_TOKEN and WEBHOOK_SECRET.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }
        if config.webhook.secret.is_none() {
            if let Ok(secret) = std::env::var("WEBHOOK_SECRET") {
                config.webhook.secret = Some(secret);
            }
        }

        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .filter(|token| !token.is_empty())
    }

    pub fn webhook_secret(&self) -> String {
        self.webhook.secret.clone().unwrap_or_default()
    }

    pub fn api_url(&self) -> &str {
        self.github.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn host(&self) -> &str {
        self.github.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(
            self.workspace
                .git_timeout_secs
                .unwrap_or(DEFAULT_GIT_TIMEOUT_SECS),
        )
    }

    /// The checkout directory bound to `host/owner/repo`.
    pub fn workspace_dir(&self, owner: &str, repo: &str) -> PathBuf {
        self.workspace
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE_ROOT))
            .join(self.host())
            .join(owner)
            .join(repo)
    }
}
