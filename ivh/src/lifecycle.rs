//! Environment lifecycle state machine.
//!
//! Owns one environment's create → validate → destroy sequence. The load-
//! bearing property is the teardown guarantee: once provisioning has
//! started, destroy runs on every exit path — validation failure,
//! unexpected validation error, cancellation — exactly once.

use crate::scenario::Scenario;
use ivh_common::cancel::CancelToken;
use ivh_common::config::HarnessConfig;
use ivh_common::errors::{ProvisionError, TeardownError};
use ivh_common::provision::ProvisioningEngine;
use ivh_common::retry::{RetryPolicy, retry};
use ivh_common::ssh::RemoteTransport;
use ivh_common::types::{
    CheckResult, EnvState, EnvironmentId, EnvironmentResult, Outputs, Variables,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Drives one scenario through the state machine.
pub struct EnvironmentLifecycle<P, T> {
    engine: P,
    transport: T,
    config: Arc<HarnessConfig>,
}

impl<P, T> EnvironmentLifecycle<P, T>
where
    P: ProvisioningEngine + Clone + Send + Sync + 'static,
    T: RemoteTransport + Clone + Send + Sync + 'static,
{
    pub fn new(engine: P, transport: T, config: Arc<HarnessConfig>) -> Self {
        Self {
            engine,
            transport,
            config,
        }
    }

    /// Run the scenario to completion under `identity`.
    ///
    /// Never returns early past a successful apply without destroying:
    /// the provisioned block below is the scoped-acquisition region and
    /// `teardown` is its guaranteed release.
    pub async fn run(
        &self,
        scenario: &Scenario,
        identity: EnvironmentId,
        cancel: CancelToken,
    ) -> EnvironmentResult {
        let mut state = EnvState::Pending;
        self.transition(&identity, &mut state, EnvState::Provisioning);

        let vars = scenario.engine_variables(&self.config);
        let workspace = identity.as_str().to_string();

        let applied = tokio::select! {
            result = self.apply_with_transient_retry(&vars, &workspace, &cancel) => result,
            _ = cancel.cancelled() => {
                warn!(env = %identity, "cancelled during provisioning");
                Err(ProvisionError::new(
                    ivh_common::errors::ProvisionPhase::Apply,
                    "run cancelled during apply",
                ))
            }
        };

        let (verdict, check_results, provision_error) = match applied {
            Ok(outputs) => {
                self.transition(&identity, &mut state, EnvState::Provisioned);
                self.transition(&identity, &mut state, EnvState::Validating);
                let results = self.validate(scenario, outputs, &cancel).await;
                let all_passed = results.iter().all(|r| r.passed);
                let verdict = if all_passed {
                    EnvState::Passed
                } else {
                    EnvState::Failed
                };
                (verdict, results, None)
            }
            Err(e) => {
                // Apply may have created partial resources; skip straight
                // to the teardown path.
                error!(env = %identity, error = %e, "provisioning failed");
                (EnvState::Failed, Vec::new(), Some(e.to_string()))
            }
        };
        self.transition(&identity, &mut state, verdict);

        self.transition(&identity, &mut state, EnvState::Destroying);
        let teardown_error = self.teardown(&vars, &workspace).await;
        if teardown_error.is_none() {
            self.transition(&identity, &mut state, EnvState::Destroyed);
        }

        EnvironmentResult {
            scenario: scenario.name.clone(),
            identity: Some(identity),
            final_state: verdict,
            check_results,
            provision_error,
            teardown_error: teardown_error.map(|e| e.to_string()),
        }
    }

    /// Apply once; if the failure looks transient (throttling, resets),
    /// burn the small transient-retry budget before giving up.
    async fn apply_with_transient_retry(
        &self,
        vars: &Variables,
        workspace: &str,
        cancel: &CancelToken,
    ) -> Result<Outputs, ProvisionError> {
        match self
            .engine
            .apply(&self.config.config_dir, vars, workspace)
            .await
        {
            Ok(outputs) => Ok(outputs),
            Err(first) if first.is_transient() => {
                warn!(workspace, error = %first, "transient apply failure, retrying");
                let policy = RetryPolicy::engine_transient("apply");
                retry(&policy, cancel, || {
                    let engine = self.engine.clone();
                    let config_dir = self.config.config_dir.clone();
                    let vars = vars.clone();
                    let workspace = workspace.to_string();
                    async move { engine.apply(&config_dir, &vars, &workspace).await }
                })
                .await
                .map_err(|retry_err| match retry_err {
                    ivh_common::errors::RetryError::Exhausted { last_error, .. } => last_error,
                    ivh_common::errors::RetryError::Cancelled { .. } => ProvisionError::new(
                        ivh_common::errors::ProvisionPhase::Apply,
                        "run cancelled during apply retry",
                    ),
                })
            }
            Err(permanent) => Err(permanent),
        }
    }

    async fn validate(
        &self,
        scenario: &Scenario,
        outputs: Outputs,
        cancel: &CancelToken,
    ) -> Vec<CheckResult> {
        let suite = match scenario.build_suite(&self.config, &self.transport) {
            Ok(suite) => suite,
            Err(e) => {
                // A malformed check declaration is a failed validation,
                // not a reason to skip teardown.
                return vec![CheckResult::fail(
                    "suite_construction",
                    e.to_string(),
                    std::time::Duration::ZERO,
                )];
            }
        };
        if suite.is_empty() {
            warn!(scenario = %scenario.name, "scenario declares no checks");
        }
        suite.run(outputs, cancel.clone()).await
    }

    /// The guaranteed-release half of the scoped acquisition. Destroy is
    /// deliberately not raced against the cancel signal: once resources
    /// may exist, cleanup must finish.
    async fn teardown(&self, vars: &Variables, workspace: &str) -> Option<TeardownError> {
        match self
            .engine
            .destroy(&self.config.config_dir, vars, workspace)
            .await
        {
            Ok(()) => None,
            Err(e) => {
                error!(
                    workspace,
                    error = %e,
                    "teardown failed; resources may be leaked"
                );
                Some(TeardownError {
                    workspace: workspace.to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }

    fn transition(&self, identity: &EnvironmentId, state: &mut EnvState, to: EnvState) {
        info!(env = %identity, from = %state, to = %to, "state transition");
        *state = to;
    }
}
