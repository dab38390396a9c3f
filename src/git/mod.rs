pub mod process;
#[cfg(all(test, unix))]
pub(crate) mod testing;

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::scm::{FileAction, FileChange};
use process::{CallContext, ProcessError, WorkspaceProcess};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("branch {name} already exists")]
    BranchExists {
        name: String,
        #[source]
        source: ProcessError,
    },

    #[error("create branch {name}: {source}")]
    CreateBranch {
        name: String,
        #[source]
        source: ProcessError,
    },

    #[error("checkout {name}: {source}")]
    Checkout {
        name: String,
        #[source]
        source: ProcessError,
    },

    #[error("unknown file action {action:?} for {path}")]
    UnknownAction { path: String, action: String },

    #[error("invalid change path {path}: must be relative and stay inside the workspace")]
    InvalidPath { path: String },

    #[error("{action} {path}: missing content")]
    MissingContent { path: String, action: FileAction },

    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stage {path}: {source}")]
    Stage {
        path: String,
        #[source]
        source: ProcessError,
    },

    #[error("commit: {0}")]
    Commit(#[source] ProcessError),

    #[error("push: {0}")]
    Push(#[source] ProcessError),

    #[error("clone {owner}/{repo}: {source}")]
    Clone {
        owner: String,
        repo: String,
        #[source]
        source: ProcessError,
    },

    #[error("pull rejected, history has diverged from the remote: {0}")]
    PullRejected(#[source] ProcessError),

    #[error("pull: {0}")]
    Pull(#[source] ProcessError),

    #[error("prepare workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Git operations against one checked-out workspace.
///
/// Not safe for concurrent use: branch, index and working tree are shared
/// state, so callers serialize workflows per repository.
#[derive(Debug, Clone)]
pub struct LocalGitOps {
    process: WorkspaceProcess,
    host: String,
}

impl LocalGitOps {
    pub fn new(process: WorkspaceProcess, host: impl Into<String>) -> Self {
        Self {
            process,
            host: host.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        self.process.dir()
    }

    pub fn is_cloned(&self) -> bool {
        self.workspace().join(".git").exists()
    }

    /// Switch the working tree to an existing branch.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace().display()))]
    pub async fn checkout(&self, ctx: &CallContext, name: &str) -> Result<(), GitError> {
        self.process
            .run(ctx, &["checkout", name])
            .await
            .map(drop)
            .map_err(|source| GitError::Checkout {
                name: name.to_string(),
                source,
            })
    }

    /// `checkout -b`: branch from the current HEAD and switch to it.
    #[instrument(skip(self, ctx), fields(workspace = %self.workspace().display()))]
    pub async fn create_branch(&self, ctx: &CallContext, name: &str) -> Result<(), GitError> {
        match self.process.run(ctx, &["checkout", "-b", name]).await {
            Ok(_) => {
                debug!("created branch");
                Ok(())
            }
            Err(source) if mentions(&source, &["already exists"]) => Err(GitError::BranchExists {
                name: name.to_string(),
                source,
            }),
            Err(source) => Err(GitError::CreateBranch {
                name: name.to_string(),
                source,
            }),
        }
    }

    /// Apply `changes` in order, then make one commit and push it.
    ///
    /// An unknown action or bad path stops the batch before anything is
    /// committed. Entries already written and staged are left in place.
    /// A batch whose net effect leaves the tree unchanged, such as creating
    /// and then deleting a new file, fails with [`GitError::Commit`] because
    /// git has nothing to commit.
    #[instrument(skip(self, ctx, changes, message), fields(workspace = %self.workspace().display(), changes = changes.len()))]
    pub async fn commit_and_push(
        &self,
        ctx: &CallContext,
        changes: &[FileChange],
        message: &str,
    ) -> Result<(), GitError> {
        for change in changes {
            self.apply(ctx, change).await?;
        }

        self.process
            .run(ctx, &["commit", "-m", message])
            .await
            .map_err(GitError::Commit)?;
        debug!("committed");

        self.process
            .run(ctx, &["push", "origin", "HEAD"])
            .await
            .map_err(GitError::Push)?;
        info!("pushed");
        Ok(())
    }

    async fn apply(&self, ctx: &CallContext, change: &FileChange) -> Result<(), GitError> {
        let full_path = self.resolve(&change.path)?;
        match &change.action {
            FileAction::Create | FileAction::Update => {
                self.reject_symlinks(&change.path, true).await?;
                let content = change
                    .content
                    .as_deref()
                    .ok_or_else(|| GitError::MissingContent {
                        path: change.path.clone(),
                        action: change.action.clone(),
                    })?;
                if let Some(parent) = full_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|source| GitError::Write {
                            path: parent.to_path_buf(),
                            source,
                        })?;
                }
                tokio::fs::write(&full_path, content)
                    .await
                    .map_err(|source| GitError::Write {
                        path: full_path.clone(),
                        source,
                    })?;
                self.stage(ctx, &change.path, &["add", "--"]).await?;
            }
            FileAction::Delete => {
                // git rm removes a symlink itself, never its target
                self.reject_symlinks(&change.path, false).await?;
                self.stage(ctx, &change.path, &["rm", "-f", "--"]).await?;
            }
            FileAction::Other(action) => {
                return Err(GitError::UnknownAction {
                    path: change.path.clone(),
                    action: action.clone(),
                });
            }
        }
        debug!(path = %change.path, action = %change.action, "applied change");
        Ok(())
    }

    async fn stage(&self, ctx: &CallContext, path: &str, verb: &[&str]) -> Result<(), GitError> {
        let mut args = verb.to_vec();
        args.push(path);
        self.process
            .run(ctx, &args)
            .await
            .map(drop)
            .map_err(|source| GitError::Stage {
                path: path.to_string(),
                source,
            })
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, GitError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(GitError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.workspace().join(relative))
    }

    /// Fail if any existing component of `path` under the workspace is a
    /// symlink, so a write cannot follow one out of the tree. The leaf is
    /// only checked when `include_leaf` is set.
    async fn reject_symlinks(&self, path: &str, include_leaf: bool) -> Result<(), GitError> {
        let components: Vec<_> = Path::new(path)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        let checked = if include_leaf {
            components.len()
        } else {
            components.len().saturating_sub(1)
        };

        let mut current = self.workspace().to_path_buf();
        for component in &components[..checked] {
            current.push(component);
            match tokio::fs::symlink_metadata(&current).await {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(GitError::InvalidPath {
                        path: path.to_string(),
                    });
                }
                Ok(_) => {}
                // Nothing further down exists yet
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(source) => {
                    return Err(GitError::Write {
                        path: current,
                        source,
                    })
                }
            }
        }
        Ok(())
    }

    /// Pull when the workspace already has `.git`, otherwise clone into it.
    ///
    /// The clone URL carries `token` as an inline credential; it is scrubbed
    /// from any error before returning.
    #[instrument(skip(self, ctx, token), fields(workspace = %self.workspace().display()))]
    pub async fn clone_or_pull(
        &self,
        ctx: &CallContext,
        owner: &str,
        repo: &str,
        token: &str,
    ) -> Result<(), GitError> {
        if self.is_cloned() {
            debug!("workspace exists, pulling");
            return match self.process.run(ctx, &["pull", "--ff-only"]).await {
                Ok(_) => Ok(()),
                Err(source)
                    if mentions(&source, &["Not possible to fast-forward", "diverg"]) =>
                {
                    Err(GitError::PullRejected(source))
                }
                Err(source) => Err(GitError::Pull(source)),
            };
        }

        tokio::fs::create_dir_all(self.workspace())
            .await
            .map_err(|source| GitError::Workspace {
                path: self.workspace().to_path_buf(),
                source,
            })?;

        let url = clone_url(&self.host, owner, repo, token);
        debug!(host = %self.host, "cloning");
        // The process already runs inside the workspace, so clone into it
        // directly; a relative workspace path would otherwise nest.
        self.process
            .run(ctx, &["clone", url.as_str(), "."])
            .await
            .map_err(|source| GitError::Clone {
                owner: owner.to_string(),
                repo: repo.to_string(),
                source: source.redact(token),
            })?;
        info!("cloned");
        Ok(())
    }
}

pub fn clone_url(host: &str, owner: &str, repo: &str, token: &str) -> String {
    format!("https://x-access-token:{token}@{host}/{owner}/{repo}.git")
}

fn mentions(err: &ProcessError, needles: &[&str]) -> bool {
    err.output()
        .map(|out| needles.iter().any(|n| out.contains(n)))
        .unwrap_or(false)
}
