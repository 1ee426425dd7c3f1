//! Common types used across harness components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Unique identifier for one provisioned environment.
///
/// Doubles as the provisioning-engine workspace key, so two live
/// environments never share a state partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentId(pub String);

impl EnvironmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvState {
    /// Scenario scheduled, nothing created yet.
    Pending,
    /// Apply in flight.
    Provisioning,
    /// Apply succeeded, outputs captured.
    Provisioned,
    /// Checks running against live resources.
    Validating,
    /// Every check passed.
    Passed,
    /// At least one check failed, or provisioning failed.
    Failed,
    /// Destroy in flight.
    Destroying,
    /// Destroy completed (or confirmed no-op).
    Destroyed,
    /// Skipped without provisioning (short mode).
    Skipped,
}

impl std::fmt::Display for EnvState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Provisioned => "provisioned",
            Self::Validating => "validating",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Destroying => "destroying",
            Self::Destroyed => "destroyed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// A variable handed to the provisioning engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    String(String),
    Bool(bool),
    Number(i64),
}

impl VarValue {
    /// Render the value the way the engine CLI expects it on the command line.
    pub fn render(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for VarValue {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// Ordered variable set for one apply/destroy invocation.
///
/// BTreeMap so rendered command lines are deterministic across runs.
pub type Variables = BTreeMap<String, VarValue>;

/// One value produced by the provisioning engine.
///
/// Wraps the raw JSON value so map-shaped outputs (labels, tags) and
/// scalar outputs (addresses) share one representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue(pub serde_json::Value);

impl OutputValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self(serde_json::Value::String(s.into()))
    }

    /// Scalar string form, if this output is a string.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Flatten a map-shaped output into string pairs.
    ///
    /// Non-string leaf values are rendered through their JSON form, which
    /// matches how the engine prints them.
    pub fn as_string_map(&self) -> Option<BTreeMap<String, String>> {
        let obj = self.0.as_object()?;
        Some(
            obj.iter()
                .map(|(k, v)| {
                    let rendered = match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    };
                    (k.clone(), rendered)
                })
                .collect(),
        )
    }

    /// True for `""`, `null`, `{}`, and `[]`.
    pub fn is_blank(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            serde_json::Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

impl std::fmt::Display for OutputValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_str() {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Outputs captured from a successful apply, keyed by output name.
pub type Outputs = BTreeMap<String, OutputValue>;

/// Outcome of one named check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check name as registered.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable detail (assertion message or error).
    pub detail: String,
    /// Wall-clock time the check took.
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: true,
            detail: detail.into(),
            duration,
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            passed: false,
            detail: detail.into(),
            duration,
        }
    }
}

/// Serialize durations as integer milliseconds for the report surface.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Final record for one scenario, aggregated by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentResult {
    /// Scenario name as declared.
    pub scenario: String,
    /// Unique identity allocated for this run (absent for skipped scenarios).
    pub identity: Option<EnvironmentId>,
    /// State the lifecycle ended in.
    pub final_state: EnvState,
    /// Ordered check results (registration order).
    #[serde(default)]
    pub check_results: Vec<CheckResult>,
    /// Provisioning failure, if apply never succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provision_error: Option<String>,
    /// Destroy failure, if teardown did not complete cleanly.
    ///
    /// Reported separately from the functional verdict: it means resources
    /// may have leaked, not that the infrastructure misbehaved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

impl EnvironmentResult {
    /// Whether the scenario's functional verdict is a pass.
    ///
    /// Teardown errors do not factor in here; they are a cleanup concern
    /// surfaced through `teardown_error` and the process exit code.
    pub fn functional_pass(&self) -> bool {
        matches!(self.final_state, EnvState::Passed | EnvState::Skipped)
            && self.provision_error.is_none()
    }
}
