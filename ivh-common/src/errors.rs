//! Error taxonomy for the harness.
//!
//! Every failure class a scenario can hit has a dedicated type so nothing
//! is silently dropped: provision errors trigger the cleanup path, output
//! lookups distinguish missing keys from engine failures, retries report
//! exhaustion and cancellation distinctly, and teardown failures are kept
//! separate from the functional verdict. Credential preconditions are
//! checked before any of these can occur (`config::EnvError`).

use std::time::Duration;
use thiserror::Error;

/// Which phase of an apply the engine failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionPhase {
    /// Backend/workspace initialization.
    Init,
    /// Planning the resource diff.
    Plan,
    /// Creating or mutating real resources.
    Apply,
    /// Tearing resources down.
    Destroy,
}

impl std::fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{s}")
    }
}

/// Failure from the provisioning engine.
#[derive(Debug, Clone, Error)]
#[error("provisioning failed during {phase}: {detail}")]
pub struct ProvisionError {
    pub phase: ProvisionPhase,
    pub detail: String,
}

impl ProvisionError {
    pub fn new(phase: ProvisionPhase, detail: impl Into<String>) -> Self {
        Self {
            phase,
            detail: detail.into(),
        }
    }

    /// Whether this failure looks like the eventually-consistent kind the
    /// engine docs say to retry (throttling, connection resets, timeouts).
    pub fn is_transient(&self) -> bool {
        const TRANSIENT_MARKERS: &[&str] = &[
            "connection reset",
            "connection refused",
            "timeout while waiting",
            "timed out",
            "temporarily unavailable",
            "rate limit",
            "too many requests",
            "429",
            "tls handshake",
        ];
        let lowered = self.detail.to_lowercase();
        TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m))
    }
}

/// Failure looking up a single engine output.
#[derive(Debug, Clone, Error)]
pub enum OutputError {
    /// The key was never produced. Non-retryable by definition: waiting
    /// will not make an undeclared output appear.
    #[error("output '{key}' not found in workspace '{workspace}'")]
    NotFound { workspace: String, key: String },

    /// The engine itself failed while reading state.
    #[error("failed to read outputs: {0}")]
    Engine(String),
}

/// Remote-execution transport failure.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection to {host} failed: {detail}")]
    Connect { host: String, detail: String },

    #[error("command exited with status {status}: {stderr}")]
    CommandFailed { status: i32, stderr: String },
}

/// Destroy failed after the environment was provisioned.
///
/// Kept distinct from [`ProvisionError`] so operators can tell "test
/// failed" apart from "cleanup failed, resources may be leaked".
#[derive(Debug, Clone, Error)]
#[error("teardown of '{workspace}' failed: {detail}")]
pub struct TeardownError {
    pub workspace: String,
    pub detail: String,
}

/// Result of exhausting or aborting a bounded retry.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All attempts failed; carries the last observed error.
    #[error("'{operation}' failed after {attempts} attempts over {elapsed:?}: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        last_error: E,
    },

    /// Cancellation was raised before an attempt succeeded.
    #[error("'{operation}' cancelled after {attempts} attempts")]
    Cancelled { operation: String, attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_error_display_names_phase() {
        let err = ProvisionError::new(ProvisionPhase::Init, "backend unreachable");
        assert!(err.to_string().contains("init"));
        assert!(err.to_string().contains("backend unreachable"));
    }

    #[test]
    fn test_transient_classification() {
        let transient = ProvisionError::new(ProvisionPhase::Apply, "API rate limit exceeded");
        assert!(transient.is_transient());

        let permanent = ProvisionError::new(ProvisionPhase::Apply, "invalid server type cx999");
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_output_not_found_display() {
        let err = OutputError::NotFound {
            workspace: "baseline-1".to_string(),
            key: "wordpress_ipv4".to_string(),
        };
        assert!(err.to_string().contains("wordpress_ipv4"));
        assert!(err.to_string().contains("baseline-1"));
    }

    #[test]
    fn test_teardown_error_names_workspace() {
        let err = TeardownError {
            workspace: "baseline-1-abc".to_string(),
            detail: "destroy timed out".to_string(),
        };
        assert!(err.to_string().contains("baseline-1-abc"));
        assert!(err.to_string().contains("destroy timed out"));
    }
}
