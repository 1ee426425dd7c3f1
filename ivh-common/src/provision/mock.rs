//! In-memory provisioning engine for tests.
//!
//! Records every apply/destroy call so tests can assert the teardown
//! guarantee (destroy exactly once) without touching a real engine.

use super::ProvisioningEngine;
use crate::errors::{OutputError, ProvisionError, ProvisionPhase};
use crate::types::{OutputValue, Outputs, Variables};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    apply_calls: Vec<String>,
    destroy_calls: Vec<String>,
    applied_workspaces: HashMap<String, Outputs>,
}

/// Scriptable fake engine. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    outputs: Outputs,
    apply_failures: Arc<Mutex<u32>>,
    apply_failure_phase: ProvisionPhase,
    apply_failure_detail: String,
    destroy_fails: bool,
    apply_delay: Duration,
}

impl MockEngine {
    pub fn builder() -> MockEngineBuilder {
        MockEngineBuilder::default()
    }

    /// Engine that always applies cleanly with the given outputs.
    pub fn succeeding(outputs: Outputs) -> Self {
        Self::builder().outputs(outputs).build()
    }

    /// Number of apply calls observed so far.
    pub fn apply_count(&self) -> usize {
        self.state.lock().unwrap().apply_calls.len()
    }

    /// Number of destroy calls observed so far.
    pub fn destroy_count(&self) -> usize {
        self.state.lock().unwrap().destroy_calls.len()
    }

    /// Workspaces destroy was invoked for, in call order.
    pub fn destroyed_workspaces(&self) -> Vec<String> {
        self.state.lock().unwrap().destroy_calls.clone()
    }

    /// Workspaces apply was invoked for, in call order.
    pub fn applied_workspaces(&self) -> Vec<String> {
        self.state.lock().unwrap().apply_calls.clone()
    }
}

impl ProvisioningEngine for MockEngine {
    async fn apply(
        &self,
        _config_dir: &Path,
        _vars: &Variables,
        workspace: &str,
    ) -> Result<Outputs, ProvisionError> {
        self.state
            .lock()
            .unwrap()
            .apply_calls
            .push(workspace.to_string());

        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }

        {
            let mut failures = self.apply_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ProvisionError::new(
                    self.apply_failure_phase,
                    self.apply_failure_detail.clone(),
                ));
            }
        }

        self.state
            .lock()
            .unwrap()
            .applied_workspaces
            .insert(workspace.to_string(), self.outputs.clone());
        Ok(self.outputs.clone())
    }

    async fn destroy(
        &self,
        _config_dir: &Path,
        _vars: &Variables,
        workspace: &str,
    ) -> Result<(), ProvisionError> {
        let mut state = self.state.lock().unwrap();
        state.destroy_calls.push(workspace.to_string());
        state.applied_workspaces.remove(workspace);
        drop(state);

        if self.destroy_fails {
            return Err(ProvisionError::new(
                ProvisionPhase::Destroy,
                "injected destroy failure",
            ));
        }
        Ok(())
    }

    async fn output(
        &self,
        _config_dir: &Path,
        workspace: &str,
        key: &str,
    ) -> Result<OutputValue, OutputError> {
        let state = self.state.lock().unwrap();
        let outputs = state
            .applied_workspaces
            .get(workspace)
            .ok_or_else(|| OutputError::Engine(format!("workspace '{workspace}' never applied")))?;
        outputs
            .get(key)
            .cloned()
            .ok_or_else(|| OutputError::NotFound {
                workspace: workspace.to_string(),
                key: key.to_string(),
            })
    }
}

#[derive(Debug, Default)]
pub struct MockEngineBuilder {
    outputs: Outputs,
    apply_failures: u32,
    apply_failure_phase: Option<ProvisionPhase>,
    apply_failure_detail: Option<String>,
    destroy_fails: bool,
    apply_delay: Duration,
}

impl MockEngineBuilder {
    /// Outputs returned by every successful apply.
    pub fn outputs(mut self, outputs: Outputs) -> Self {
        self.outputs = outputs;
        self
    }

    /// Convenience for a single scalar output.
    pub fn output(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outputs
            .insert(key.into(), OutputValue::string(value.into()));
        self
    }

    /// Fail the first `n` apply calls, then succeed.
    pub fn fail_applies(mut self, n: u32) -> Self {
        self.apply_failures = n;
        self
    }

    /// Fail every apply call.
    pub fn always_fail_applies(mut self) -> Self {
        self.apply_failures = u32::MAX;
        self
    }

    /// Phase reported by injected apply failures.
    pub fn failure_phase(mut self, phase: ProvisionPhase) -> Self {
        self.apply_failure_phase = Some(phase);
        self
    }

    /// Detail string carried by injected apply failures, so tests can
    /// exercise the transient-vs-permanent classification.
    pub fn failure_detail(mut self, detail: impl Into<String>) -> Self {
        self.apply_failure_detail = Some(detail.into());
        self
    }

    /// Make destroy fail, for teardown-error reporting tests.
    pub fn failing_destroy(mut self) -> Self {
        self.destroy_fails = true;
        self
    }

    /// Delay each apply, for cancellation tests.
    pub fn apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    pub fn build(self) -> MockEngine {
        MockEngine {
            state: Arc::new(Mutex::new(MockState::default())),
            outputs: self.outputs,
            apply_failures: Arc::new(Mutex::new(self.apply_failures)),
            apply_failure_phase: self.apply_failure_phase.unwrap_or(ProvisionPhase::Apply),
            apply_failure_detail: self
                .apply_failure_detail
                .unwrap_or_else(|| "injected apply failure".to_string()),
            destroy_fails: self.destroy_fails,
            apply_delay: self.apply_delay,
        }
    }
}
