//! Validation suite: named checks composed against one environment's
//! outputs.
//!
//! Checks run in registration order and never fail-fast; a failing or
//! panicking check is recorded and its siblings still run, so the report
//! is always complete. Eventually-consistent checks lean on the retry
//! poller instead of rolling their own loops.

use crate::cancel::CancelToken;
use crate::retry::{RetryPolicy, retry};
use crate::ssh::{RemoteHost, RemoteTransport};
use crate::types::{CheckResult, Outputs};
use regex::Regex;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use tokio::time::Instant;
use tracing::{debug, info};

static IPV4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("static pattern"));

/// A check resolves to a pass detail or a failure detail.
pub type CheckOutcome = Result<String, String>;

/// Boxed future every built-in check factory hands back.
pub type BoxCheckFuture = Pin<Box<dyn Future<Output = CheckOutcome> + Send>>;
type CheckFn = Box<dyn FnOnce(Arc<Outputs>, CancelToken) -> BoxCheckFuture + Send>;

/// Ordered collection of named checks bound to one environment.
#[derive(Default)]
pub struct Suite {
    checks: Vec<(String, CheckFn)>,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named check. Order of registration is the order of
    /// execution and of the result list.
    pub fn add_check<F, Fut>(&mut self, name: impl Into<String>, check: F)
    where
        F: FnOnce(Arc<Outputs>, CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = CheckOutcome> + Send + 'static,
    {
        self.checks.push((
            name.into(),
            Box::new(move |outputs, cancel| Box::pin(check(outputs, cancel))),
        ));
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every registered check against `outputs`.
    ///
    /// Each check runs in its own task so a panic inside one check is
    /// recorded as that check's failure without aborting the rest.
    pub async fn run(self, outputs: Outputs, cancel: CancelToken) -> Vec<CheckResult> {
        let outputs = Arc::new(outputs);
        let mut results = Vec::with_capacity(self.checks.len());

        for (name, check) in self.checks {
            let started = Instant::now();
            let outcome = match tokio::spawn(check(outputs.clone(), cancel.clone())).await {
                Ok(outcome) => outcome,
                Err(join_err) => Err(format!("check raised an unexpected error: {join_err}")),
            };
            let duration = started.elapsed();

            let result = match outcome {
                Ok(detail) => {
                    debug!(check = %name, ?duration, "check passed");
                    CheckResult::pass(&name, detail, duration)
                }
                Err(detail) => {
                    info!(check = %name, %detail, "check failed");
                    CheckResult::fail(&name, detail, duration)
                }
            };
            results.push(result);
        }
        results
    }
}

// ── Built-in checks ──────────────────────────────────────────────────────

fn lookup(outputs: &Outputs, key: &str) -> Result<crate::types::OutputValue, String> {
    outputs
        .get(key)
        .cloned()
        .ok_or_else(|| format!("output '{key}' is missing"))
}

/// Value under `key` must be a dotted-quad IPv4 address.
pub fn ipv4_format(key: &str) -> impl FnOnce(Arc<Outputs>, CancelToken) -> BoxCheckFuture + use<> {
    let key = key.to_string();
    move |outputs, _cancel| {
        Box::pin(async move {
            let value = lookup(&outputs, &key)?;
            let text = value
                .as_str()
                .ok_or_else(|| format!("output '{key}' is not a string: {value}"))?;
            if IPV4_RE.is_match(text) {
                Ok(format!("{key} = {text}"))
            } else {
                Err(format!("'{text}' is not a dotted-quad IPv4 address"))
            }
        })
    }
}

/// Value under `key` must be present and non-blank.
pub fn non_empty(key: &str) -> impl FnOnce(Arc<Outputs>, CancelToken) -> BoxCheckFuture + use<> {
    let key = key.to_string();
    move |outputs, _cancel| {
        Box::pin(async move {
            let value = lookup(&outputs, &key)?;
            if value.is_blank() {
                Err(format!("output '{key}' is empty"))
            } else {
                Ok(format!("{key} = {value}"))
            }
        })
    }
}

/// Map-shaped value under `key` must carry every expected pair.
///
/// Order-insensitive; extra keys in the actual map are ignored so label
/// sets can grow without breaking the check.
pub fn map_equals(
    key: &str,
    expected: BTreeMap<String, String>,
) -> impl FnOnce(Arc<Outputs>, CancelToken) -> BoxCheckFuture + use<> {
    let key = key.to_string();
    move |outputs, _cancel| {
        Box::pin(async move {
            let value = lookup(&outputs, &key)?;
            let actual = value
                .as_string_map()
                .ok_or_else(|| format!("output '{key}' is not a map: {value}"))?;

            let mut mismatches = Vec::new();
            for (k, want) in &expected {
                match actual.get(k) {
                    Some(got) if got == want => {}
                    Some(got) => mismatches.push(format!("{k}: expected '{want}', got '{got}'")),
                    None => mismatches.push(format!("{k}: expected '{want}', key missing")),
                }
            }
            if mismatches.is_empty() {
                Ok(format!("{} pairs match", expected.len()))
            } else {
                Err(mismatches.join("; "))
            }
        })
    }
}

/// Values under `keys` must be pairwise distinct (and all present).
pub fn pairwise_distinct(
    keys: &[String],
) -> impl FnOnce(Arc<Outputs>, CancelToken) -> BoxCheckFuture + use<> {
    let keys = keys.to_vec();
    move |outputs, _cancel| {
        Box::pin(async move {
            let mut values = Vec::with_capacity(keys.len());
            for key in &keys {
                let value = lookup(&outputs, key)?;
                values.push((key.clone(), value.to_string()));
            }
            let mut collisions = Vec::new();
            for i in 0..values.len() {
                for j in (i + 1)..values.len() {
                    if values[i].1 == values[j].1 {
                        collisions.push(format!(
                            "{} and {} share value '{}'",
                            values[i].0, values[j].0, values[i].1
                        ));
                    }
                }
            }
            if collisions.is_empty() {
                Ok(format!("{} values pairwise distinct", values.len()))
            } else {
                Err(collisions.join("; "))
            }
        })
    }
}

/// Run `command` on the host named by `host_key` until it succeeds, under
/// `policy`. Any transport or non-zero-exit failure counts as retryable;
/// the check fails only when the budget exhausts or cancellation fires.
pub fn eventual_remote_command<T>(
    transport: T,
    host: RemoteHostSpec,
    command: &str,
    policy: RetryPolicy,
) -> impl FnOnce(Arc<Outputs>, CancelToken) -> BoxCheckFuture + use<T>
where
    T: RemoteTransport + Clone + 'static,
{
    let command = command.to_string();
    move |outputs, cancel| {
        Box::pin(async move {
            let target = host.resolve(&outputs)?;
            let result = retry(&policy, &cancel, || {
                let transport = transport.clone();
                let target = target.clone();
                let command = command.clone();
                async move { transport.run_command(&target, &command).await }
            })
            .await;
            match result {
                Ok(stdout) => Ok(format!("'{command}' succeeded: {}", stdout.trim())),
                Err(e) => Err(e.to_string()),
            }
        })
    }
}

/// Run `command` once (no retry) and assert its stdout contains `needle`.
pub fn remote_contains<T>(
    transport: T,
    host: RemoteHostSpec,
    command: &str,
    needle: &str,
) -> impl FnOnce(Arc<Outputs>, CancelToken) -> BoxCheckFuture + use<T>
where
    T: RemoteTransport + Clone + 'static,
{
    let command = command.to_string();
    let needle = needle.to_string();
    move |outputs, _cancel| {
        Box::pin(async move {
            let target = host.resolve(&outputs)?;
            let stdout = transport
                .run_command(&target, &command)
                .await
                .map_err(|e| e.to_string())?;
            if stdout.contains(&needle) {
                Ok(format!("'{command}' output contains '{needle}'"))
            } else {
                Err(format!(
                    "'{command}' output '{}' does not contain '{needle}'",
                    stdout.trim()
                ))
            }
        })
    }
}

/// How remote checks locate their target host at run time: the address
/// lives in an output, the credentials are fixed per scenario.
#[derive(Debug, Clone)]
pub struct RemoteHostSpec {
    /// Output key holding the host address.
    pub host_output: String,
    /// SSH login user.
    pub username: String,
    /// Identity file, if any.
    pub identity_file: Option<std::path::PathBuf>,
}

impl RemoteHostSpec {
    pub fn new(host_output: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host_output: host_output.into(),
            username: username.into(),
            identity_file: None,
        }
    }

    pub fn with_identity_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    fn resolve(&self, outputs: &Outputs) -> Result<RemoteHost, String> {
        let value = lookup(outputs, &self.host_output)?;
        let hostname = value
            .as_str()
            .ok_or_else(|| format!("output '{}' is not a string", self.host_output))?;
        let mut host = RemoteHost::new(hostname, &self.username);
        if let Some(identity) = &self.identity_file {
            host = host.with_identity_file(identity);
        }
        Ok(host)
    }
}
