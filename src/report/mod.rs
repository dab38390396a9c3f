use crate::scm::{Issue, PullRequest};
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Print the issue to the terminal (default) or write markdown to a file.
#[instrument(skip(issue), fields(issue = issue.number))]
pub fn output_issue(issue: &Issue, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing issue to terminal");
            print_issue(issue);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing issue to file");
            std::fs::write(path, issue_markdown(issue))?;
            Ok(())
        }
    }
}

/// Issue #7: "New feature request"
/// Author: contributor | Created: 2024-01-15 10:30 UTC
/// Labels: enhancement
///
/// <body>
fn print_issue(issue: &Issue) {
    println!();
    println!(
        "{} \"{}\"",
        format!("Issue #{}:", issue.number).bold(),
        issue.title
    );
    println!(
        "Author: {} | Created: {}",
        issue.author.cyan(),
        created_label(issue)
    );
    println!("Labels: {}", labels_label(issue).yellow());
    if !issue.body.is_empty() {
        println!();
        println!("{}", issue.body);
    }
    println!();
}

pub fn print_pull_request(pr: &PullRequest) {
    println!();
    println!(
        "{} {} \"{}\"",
        "═══ Opened".green().bold(),
        format!("PR #{}", pr.number).bold(),
        pr.title
    );
    println!("{}", pr.url.underline());
    println!();
}

pub fn print_ok(message: &str) {
    println!("{} {}", "✔".green().bold(), message);
}

fn issue_markdown(issue: &Issue) -> String {
    let mut md = String::new();
    md.push_str(&format!("# Issue #{}: \"{}\"\n\n", issue.number, issue.title));
    md.push_str(&format!(
        "**Author:** {} | **Created:** {} | **Labels:** {}\n\n",
        issue.author,
        created_label(issue),
        labels_label(issue)
    ));
    if !issue.body.is_empty() {
        md.push_str(&issue.body);
        md.push('\n');
    }
    md
}

fn created_label(issue: &Issue) -> String {
    issue
        .created_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn labels_label(issue: &Issue) -> String {
    if issue.labels.is_empty() {
        "none".to_string()
    } else {
        issue.labels.join(", ")
    }
}
