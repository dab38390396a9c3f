//! Cancellable invocations of the version-control executable.
//!
//! Every call runs as a child process in the workspace directory. The caller's
//! [`CallContext`] bounds it: cancellation or an elapsed deadline kills the
//! child and surfaces [`ProcessError::Cancelled`] / [`ProcessError::TimedOut`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// How long a killed child gets to be reaped before we stop waiting on it.
const KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} {} failed ({}): {}", args.join(" "), exit_label(*status), output.trim())]
    Failed {
        command: String,
        args: Vec<String>,
        status: Option<i32>,
        output: String,
    },

    #[error("{command} {} was cancelled", args.join(" "))]
    Cancelled { command: String, args: Vec<String> },

    #[error("{command} {} timed out", args.join(" "))]
    TimedOut { command: String, args: Vec<String> },

    #[error("failed waiting on {command}: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl ProcessError {
    /// Replace every occurrence of `secret` in the recorded args and output.
    pub fn redact(self, secret: &str) -> Self {
        if secret.is_empty() {
            return self;
        }
        let scrub = |args: Vec<String>| -> Vec<String> {
            args.into_iter()
                .map(|a| a.replace(secret, "[REDACTED]"))
                .collect()
        };
        match self {
            ProcessError::Failed {
                command,
                args,
                status,
                output,
            } => ProcessError::Failed {
                command,
                args: scrub(args),
                status,
                output: output.replace(secret, "[REDACTED]"),
            },
            ProcessError::Cancelled { command, args } => ProcessError::Cancelled {
                command,
                args: scrub(args),
            },
            ProcessError::TimedOut { command, args } => ProcessError::TimedOut {
                command,
                args: scrub(args),
            },
            other => other,
        }
    }

    /// Captured combined output, when the process ran to a non-zero exit.
    pub fn output(&self) -> Option<&str> {
        match self {
            ProcessError::Failed { output, .. } => Some(output),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            ProcessError::Cancelled { .. } | ProcessError::TimedOut { .. }
        )
    }
}

/// Why a context stopped allowing work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

/// Cancellation token plus an optional deadline, passed to every call that
/// may spawn a process.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    #[cfg(test)]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Tighten the deadline to at most `timeout` from now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    /// A context cancelled together with this one, keeping the same deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check.
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.token.is_cancelled() {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(Interrupt::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Interrupt {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => Interrupt::Cancelled,
                _ = tokio::time::sleep_until(deadline) => Interrupt::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Interrupt::Cancelled
            }
        }
    }
}

/// Exit status and captured output of a finished child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// None when the child was ended by a signal
    pub status: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs one program against a fixed working directory.
#[derive(Debug, Clone)]
pub struct WorkspaceProcess {
    program: String,
    dir: PathBuf,
    env: Vec<(String, String)>,
}

impl WorkspaceProcess {
    pub fn new(program: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dir: dir.into(),
            env: vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())],
        }
    }

    pub fn git(dir: impl Into<PathBuf>) -> Self {
        Self::new("git", dir)
    }

    /// Add an environment variable to every invocation.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run and return the combined output, failing on a non-zero exit.
    pub async fn run<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        args: &[S],
    ) -> Result<String, ProcessError> {
        let finished = self.exec(ctx, args).await?;
        if finished.success() {
            Ok(finished.output)
        } else {
            Err(ProcessError::Failed {
                command: self.program.clone(),
                args: owned_args(args),
                status: finished.status,
                output: finished.output,
            })
        }
    }

    /// Run to completion and report the exit status without judging it.
    #[instrument(skip_all, fields(command = %self.program, subcommand = args.first().map(AsRef::<str>::as_ref).unwrap_or("")))]
    pub async fn exec<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        args: &[S],
    ) -> Result<ProcessOutput, ProcessError> {
        if let Some(reason) = ctx.interrupted() {
            return Err(self.interrupted(reason, args));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(args.iter().map(AsRef::<str>::as_ref))
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: self.program.clone(),
            source,
        })?;
        debug!(pid = ?child.id(), "spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let readers = tokio::spawn(async move {
            let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
            let mut combined = out;
            combined.extend_from_slice(&err);
            combined
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| ProcessError::Wait {
                command: self.program.clone(),
                source,
            })?,
            reason = ctx.done() => {
                warn!(?reason, "interrupting child process");
                let _ = child.start_kill();
                if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
                    warn!("child did not exit within grace period");
                }
                readers.abort();
                return Err(self.interrupted(reason, args));
            }
        };

        let combined = tokio::time::timeout(KILL_GRACE, readers)
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();

        Ok(ProcessOutput {
            status: status.code(),
            output: String::from_utf8_lossy(&combined).into_owned(),
        })
    }

    fn interrupted<S: AsRef<str>>(&self, reason: Interrupt, args: &[S]) -> ProcessError {
        let command = self.program.clone();
        let args = owned_args(args);
        match reason {
            Interrupt::Cancelled => ProcessError::Cancelled { command, args },
            Interrupt::DeadlineExceeded => ProcessError::TimedOut { command, args },
        }
    }
}

fn owned_args<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter()
        .map(|a| AsRef::<str>::as_ref(a).to_string())
        .collect()
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}
