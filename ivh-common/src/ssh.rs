//! Remote-execution boundary.
//!
//! Shells out to the system `ssh` binary the same way the engine adapter
//! shells out to `terraform`; the harness never speaks the wire protocol
//! itself. Tests use [`MockTransport`] instead.

use crate::errors::TransportError;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Target host for a remote command.
#[derive(Debug, Clone)]
pub struct RemoteHost {
    /// Hostname or IP.
    pub hostname: String,
    /// SSH login user.
    pub username: String,
    /// Identity file on disk. `None` lets ssh fall back to the agent.
    pub identity_file: Option<PathBuf>,
}

impl RemoteHost {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            identity_file: None,
        }
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    fn target(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

/// Narrow contract for running one command on a remote host.
///
/// Implementations may reuse credentials across calls or re-establish
/// them per attempt; retry loops call this repeatedly against the same
/// host either way.
pub trait RemoteTransport: Send + Sync {
    /// Run `command` on `host`, returning its stdout.
    fn run_command(
        &self,
        host: &RemoteHost,
        command: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Transport backed by the system `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshTransport {
    /// Per-command connection timeout.
    pub connect_timeout: Duration,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn ssh_args(&self, host: &RemoteHost, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
        ];
        if let Some(identity) = &host.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().to_string());
        }
        args.push(host.target());
        args.push(shell_escape::escape(command.into()).into_owned());
        args
    }
}

impl RemoteTransport for SshTransport {
    async fn run_command(
        &self,
        host: &RemoteHost,
        command: &str,
    ) -> Result<String, TransportError> {
        let args = self.ssh_args(host, command);
        debug!(host = %host.target(), command, "running remote command");

        let output = Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| TransportError::Connect {
                host: host.target(),
                detail: format!("failed to spawn ssh: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let status = output.status.code().unwrap_or(-1);
            // Exit 255 is ssh's own "could not connect" code.
            if status == 255 {
                Err(TransportError::Connect {
                    host: host.target(),
                    detail: stderr.trim().to_string(),
                })
            } else {
                Err(TransportError::CommandFailed {
                    status,
                    stderr: stderr.trim().to_string(),
                })
            }
        }
    }
}

// ── Mock transport ───────────────────────────────────────────────────────

/// Scripted reply for one [`MockTransport`] call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Stdout(String),
    Unreachable,
    ExitCode(i32),
}

#[derive(Debug, Default)]
struct MockTransportState {
    /// Replies consumed front-to-back; the last one repeats forever.
    replies: Vec<MockReply>,
    cursor: usize,
    calls: Vec<String>,
}

/// In-memory transport with a scripted reply sequence.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose every call succeeds with `stdout`.
    pub fn always(stdout: impl Into<String>) -> Self {
        let transport = Self::new();
        transport.push(MockReply::Stdout(stdout.into()));
        transport
    }

    /// Transport that is unreachable `n` times, then answers `stdout`.
    pub fn reachable_after(n: usize, stdout: impl Into<String>) -> Self {
        let transport = Self::new();
        for _ in 0..n {
            transport.push(MockReply::Unreachable);
        }
        transport.push(MockReply::Stdout(stdout.into()));
        transport
    }

    pub fn push(&self, reply: MockReply) {
        self.state.lock().unwrap().replies.push(reply);
    }

    /// Commands observed so far, in call order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

impl RemoteTransport for MockTransport {
    async fn run_command(
        &self,
        host: &RemoteHost,
        command: &str,
    ) -> Result<String, TransportError> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(command.to_string());
            if state.replies.is_empty() {
                MockReply::Unreachable
            } else {
                let idx = state.cursor.min(state.replies.len() - 1);
                state.cursor += 1;
                state.replies[idx].clone()
            }
        };

        match reply {
            MockReply::Stdout(out) => Ok(out),
            MockReply::Unreachable => Err(TransportError::Connect {
                host: host.target(),
                detail: "connection refused".to_string(),
            }),
            MockReply::ExitCode(status) => Err(TransportError::CommandFailed {
                status,
                stderr: format!("command exited {status}"),
            }),
        }
    }
}
