mod adapter;
mod config;
mod git;
mod notify;
mod remote;
mod report;
mod scm;
mod webhook;
mod workflow;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use adapter::SourceAdapter;
use git::process::CallContext;
use notify::{IssueCommentNotifier, LogNotifier, Notifier};
use scm::{CommentPoster, FileChange, GitWorkspace, IssueReader};

/// scm-bridge: turns GitHub issue events into branches, commits and pull requests.
#[derive(Parser, Debug)]
#[command(name = "scm-bridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify and parse a raw issue webhook body
    Webhook {
        /// File holding the exact request body
        #[arg(long)]
        body: PathBuf,

        /// Value of the X-Hub-Signature-256 header
        #[arg(long, default_value = "")]
        signature: String,

        /// Write the parsed issue as markdown instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fetch an issue from the GitHub API
    Issue {
        /// Repository as owner/repo
        repo: String,
        number: u64,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Post a comment on an issue or pull request
    Comment {
        repo: String,
        number: u64,
        #[arg(long)]
        body: String,
    },

    /// Clone the repository into its workspace, or fast-forward it
    Sync { repo: String },

    /// Branch, commit a batch of file changes, push and open a pull request
    Publish {
        repo: String,

        /// Issue the changes resolve
        #[arg(long)]
        issue: u64,

        #[arg(long)]
        branch: String,

        #[arg(long, default_value = "main")]
        base: String,

        /// JSON array of {path, content, action} entries
        #[arg(long)]
        changes: PathBuf,

        #[arg(long)]
        message: String,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        body: String,

        /// Also post the completion summary on the issue
        #[arg(long)]
        notify_issue: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load()?;

    let ctx = CallContext::new();
    let on_interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Webhook {
            body,
            signature,
            output,
        } => {
            let raw = std::fs::read(&body)?;
            let parser = webhook::WebhookParser::new(config.webhook_secret());
            let issue = parser.parse(&raw, &signature)?;
            report::output_issue(&issue, output.as_deref())?;
        }

        Command::Issue {
            repo,
            number,
            output,
        } => {
            let (owner, name) = parse_repo(&repo)?;
            let adapter = SourceAdapter::from_config(&config, owner, name)?;
            let _span = info_span!("issue", repo = %repo, number).entered();
            let issue = adapter.get_issue(owner, name, number).await?;
            report::output_issue(&issue, output.as_deref())?;
        }

        Command::Comment { repo, number, body } => {
            let (owner, name) = parse_repo(&repo)?;
            let adapter = SourceAdapter::from_config(&config, owner, name)?;
            adapter.post_comment(owner, name, number, &body).await?;
            report::print_ok(&format!("commented on {repo}#{number}"));
        }

        Command::Sync { repo } => {
            let (owner, name) = parse_repo(&repo)?;
            let adapter = SourceAdapter::from_config(&config, owner, name)?;
            adapter.clone_or_pull(&ctx).await?;
            report::print_ok(&format!(
                "{} is up to date at {}",
                repo,
                adapter.workspace().display()
            ));
        }

        Command::Publish {
            repo,
            issue,
            branch,
            base,
            changes,
            message,
            title,
            body,
            notify_issue,
        } => {
            let (owner, name) = parse_repo(&repo)?;
            let adapter = SourceAdapter::from_config(&config, owner, name)?;

            let changes: Vec<FileChange> = serde_json::from_str(&std::fs::read_to_string(&changes)?)?;
            debug!(changes = changes.len(), "loaded change set");

            let request = workflow::PublishRequest {
                owner: owner.to_string(),
                repo: name.to_string(),
                issue_number: issue,
                base,
                branch,
                changes,
                commit_message: message,
                title,
                body,
            };

            let log_notifier = LogNotifier;
            let issue_notifier = IssueCommentNotifier::new(&adapter, owner, name, issue);
            let notifier: &dyn Notifier = if notify_issue {
                &issue_notifier
            } else {
                &log_notifier
            };

            let pr = workflow::publish(&adapter, notifier, &ctx, &request).await?;
            report::print_pull_request(&pr);
        }
    }

    Ok(())
}

/// Split `owner/repo`.
fn parse_repo(value: &str) -> Result<(&str, &str), String> {
    match value.split_once('/') {
        Some((owner, repo))
            if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
        {
            Ok((owner, repo.trim_end_matches(".git")))
        }
        _ => Err(format!("expected owner/repo, got {value:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo() {
        assert_eq!(parse_repo("org/repo").unwrap(), ("org", "repo"));
        assert_eq!(parse_repo("org/repo.git").unwrap(), ("org", "repo"));
        assert!(parse_repo("org").is_err());
        assert!(parse_repo("/repo").is_err());
        assert!(parse_repo("org/").is_err());
        assert!(parse_repo("a/b/c").is_err());
    }

    #[test]
    fn test_cli_parses_publish() {
        let cli = Cli::try_parse_from([
            "scm-bridge",
            "publish",
            "org/repo",
            "--issue",
            "7",
            "--branch",
            "bot/issue-7",
            "--changes",
            "changes.json",
            "--message",
            "Resolve #7",
            "--title",
            "Resolve #7",
        ])
        .unwrap();
        match cli.command {
            Command::Publish {
                issue, base, notify_issue, ..
            } => {
                assert_eq!(issue, 7);
                assert_eq!(base, "main");
                assert!(!notify_issue);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
