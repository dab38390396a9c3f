//! Local git fixtures shared by the workspace and workflow tests.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::process::{CallContext, WorkspaceProcess};
use super::LocalGitOps;

pub const TOKEN: &str = "ghs_testtoken";

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// `abs` spelled relative to the test process's working directory.
pub fn relative_to_cwd(abs: &Path) -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    let mut rel = PathBuf::new();
    for _ in cwd.components().skip(1) {
        rel.push("..");
    }
    rel.join(abs.strip_prefix("/").unwrap())
}

/// A bare "remote" at `<tmp>/remotes/org/repo.git` seeded with one commit
/// on `main`, plus a scratch clone used to push further commits.
pub struct Fixture {
    pub tmp: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let remotes = tmp.path().join("remotes/org");
        std::fs::create_dir_all(&remotes).unwrap();
        git(&remotes, &["init", "--bare", "repo.git"]);
        git(&remotes.join("repo.git"), &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let seed = tmp.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        git(&seed, &["init"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        std::fs::write(seed.join("README.md"), "hello\n").unwrap();
        std::fs::write(seed.join("a.txt"), "original\n").unwrap();
        git(&seed, &["add", "."]);
        git(&seed, &["commit", "-m", "initial"]);
        git(&seed, &["remote", "add", "origin", remotes.join("repo.git").to_str().unwrap()]);
        git(&seed, &["push", "origin", "main"]);
        Self { tmp }
    }

    pub fn remote(&self) -> PathBuf {
        self.tmp.path().join("remotes/org/repo.git")
    }

    pub fn seed(&self) -> PathBuf {
        self.tmp.path().join("seed")
    }

    pub fn workspace(&self) -> PathBuf {
        self.tmp.path().join("workspaces/github.com/org/repo")
    }

    pub fn ops(&self) -> LocalGitOps {
        self.ops_at(self.workspace())
    }

    /// Ops whose https clone URL is rewritten to the local bare repo.
    pub fn ops_at(&self, workspace: PathBuf) -> LocalGitOps {
        let remote_base = format!("{}/", self.tmp.path().join("remotes").display());
        let process = WorkspaceProcess::git(workspace)
            .env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", format!("url.{}.insteadOf", remote_base))
            .env(
                "GIT_CONFIG_VALUE_0",
                format!("https://x-access-token:{}@github.com/", TOKEN),
            )
            .env("GIT_AUTHOR_NAME", "Bridge Bot")
            .env("GIT_AUTHOR_EMAIL", "bot@example.com")
            .env("GIT_COMMITTER_NAME", "Bridge Bot")
            .env("GIT_COMMITTER_EMAIL", "bot@example.com");
        LocalGitOps::new(process, "github.com")
    }

    pub async fn cloned(&self) -> LocalGitOps {
        let ops = self.ops();
        ops.clone_or_pull(&CallContext::new(), "org", "repo", TOKEN)
            .await
            .unwrap();
        ops
    }

    pub fn commit_count(&self, dir: &Path) -> String {
        git(dir, &["rev-list", "--count", "HEAD"])
    }
}
