//! Top-level orchestrator: one task per scenario, results aggregated in
//! declaration order.

use crate::lifecycle::EnvironmentLifecycle;
use crate::scenario::Scenario;
use ivh_common::cancel::CancelToken;
use ivh_common::config::HarnessConfig;
use ivh_common::identity::IdentityGenerator;
use ivh_common::provision::ProvisioningEngine;
use ivh_common::ssh::RemoteTransport;
use ivh_common::types::{EnvState, EnvironmentResult};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Launches scenarios concurrently and waits for all of them.
pub struct HarnessRunner<P, T> {
    engine: P,
    transport: T,
    config: Arc<HarnessConfig>,
    identities: Arc<IdentityGenerator>,
    short_mode: bool,
}

impl<P, T> HarnessRunner<P, T>
where
    P: ProvisioningEngine + Clone + Send + Sync + 'static,
    T: RemoteTransport + Clone + Send + Sync + 'static,
{
    pub fn new(engine: P, transport: T, config: Arc<HarnessConfig>) -> Self {
        Self {
            engine,
            transport,
            config,
            identities: Arc::new(IdentityGenerator::new()),
            short_mode: false,
        }
    }

    /// Skip scenarios flagged expensive without provisioning anything.
    pub fn short_mode(mut self, enabled: bool) -> Self {
        self.short_mode = enabled;
        self
    }

    /// Run every scenario to completion. Scenarios execute concurrently
    /// with no ordering guarantee between them; the returned vector is in
    /// declaration order regardless.
    pub async fn run(&self, scenarios: Vec<Scenario>, cancel: CancelToken) -> Vec<EnvironmentResult> {
        let mut slots: Vec<Option<EnvironmentResult>> = Vec::new();
        let mut set: JoinSet<(usize, EnvironmentResult)> = JoinSet::new();

        for (index, scenario) in scenarios.into_iter().enumerate() {
            if self.short_mode && scenario.expensive {
                info!(scenario = %scenario.name, "skipping expensive scenario (short mode)");
                slots.push(Some(EnvironmentResult {
                    scenario: scenario.name,
                    identity: None,
                    final_state: EnvState::Skipped,
                    check_results: Vec::new(),
                    provision_error: None,
                    teardown_error: None,
                }));
                continue;
            }
            slots.push(None);

            let identity = self.identities.next(&scenario.name);
            let lifecycle = EnvironmentLifecycle::new(
                self.engine.clone(),
                self.transport.clone(),
                self.config.clone(),
            );
            let cancel = cancel.clone();
            info!(scenario = %scenario.name, env = %identity, "launching scenario");
            set.spawn(async move {
                let result = lifecycle.run(&scenario, identity, cancel).await;
                (index, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    slots[index] = Some(result);
                }
                Err(join_err) => {
                    // Lifecycle tasks are not supposed to panic; if one
                    // does, its slot stays empty and is reported as a
                    // failure below instead of being dropped.
                    warn!(error = %join_err, "scenario task failed to join");
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| EnvironmentResult {
                    scenario: format!("scenario-{index}"),
                    identity: None,
                    final_state: EnvState::Failed,
                    check_results: Vec::new(),
                    provision_error: Some("scenario task aborted unexpectedly".to_string()),
                    teardown_error: None,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{CheckDecl, CheckSpec, builtin_catalog};
    use ivh_common::config::EnvConfig;
    use ivh_common::provision::MockEngine;
    use ivh_common::ssh::MockTransport;
    use ivh_common::types::{OutputValue, Outputs, Variables};
    use std::collections::HashSet;

    fn test_config() -> Arc<HarnessConfig> {
        Arc::new(HarnessConfig::new(
            EnvConfig {
                provider_token: "secret".to_string(),
                ssh_user: "admin".to_string(),
                ssh_identity: None,
            },
            "/tmp/config",
        ))
    }

    fn scenario(name: &str, expensive: bool) -> Scenario {
        Scenario {
            name: name.to_string(),
            environment: "test".to_string(),
            project: "terratest".to_string(),
            variables: Variables::new(),
            expensive,
            checks: vec![CheckDecl {
                name: None,
                spec: CheckSpec::NonEmpty {
                    output: "wordpress_ipv4".to_string(),
                },
            }],
        }
    }

    fn outputs() -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert("wordpress_ipv4".to_string(), OutputValue::string("1.2.3.4"));
        outputs
    }

    #[tokio::test]
    async fn test_results_in_declaration_order() {
        let engine = MockEngine::succeeding(outputs());
        let runner = HarnessRunner::new(engine, MockTransport::always("OK"), test_config());
        let results = runner
            .run(
                vec![scenario("alpha", false), scenario("beta", false)],
                CancelToken::never(),
            )
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].scenario, "alpha");
        assert_eq!(results[1].scenario, "beta");
        assert!(results.iter().all(|r| r.final_state == EnvState::Passed));
    }

    #[tokio::test]
    async fn test_concurrent_scenarios_get_distinct_workspaces() {
        let engine = MockEngine::succeeding(outputs());
        let runner = HarnessRunner::new(engine.clone(), MockTransport::always("OK"), test_config());
        let scenarios: Vec<Scenario> = (0..8).map(|i| scenario(&format!("s{i}"), false)).collect();
        let results = runner.run(scenarios, CancelToken::never()).await;
        assert_eq!(results.len(), 8);

        let workspaces = engine.applied_workspaces();
        let distinct: HashSet<_> = workspaces.iter().collect();
        assert_eq!(distinct.len(), 8, "workspaces must never be shared");
        assert_eq!(engine.destroy_count(), 8);
    }

    #[tokio::test]
    async fn test_short_mode_skips_expensive_without_provisioning() {
        let engine = MockEngine::succeeding(outputs());
        let runner = HarnessRunner::new(engine.clone(), MockTransport::always("OK"), test_config())
            .short_mode(true);
        let results = runner
            .run(
                vec![scenario("cheap", false), scenario("pricey", true)],
                CancelToken::never(),
            )
            .await;

        assert_eq!(results[0].final_state, EnvState::Passed);
        assert_eq!(results[1].final_state, EnvState::Skipped);
        assert!(results[1].identity.is_none());
        assert!(results[1].functional_pass(), "skip is not a failure");
        assert_eq!(engine.apply_count(), 1, "expensive scenario never applied");
    }

    #[tokio::test]
    async fn test_one_failing_scenario_does_not_poison_others() {
        // Engine fails the first apply it sees; with per-scenario clones
        // sharing failure budget, exactly one scenario eats the failure.
        let engine = MockEngine::builder().outputs(outputs()).fail_applies(1).build();
        let runner = HarnessRunner::new(engine.clone(), MockTransport::always("OK"), test_config());
        let results = runner
            .run(
                vec![scenario("a", false), scenario("b", false)],
                CancelToken::never(),
            )
            .await;

        let failed = results.iter().filter(|r| !r.functional_pass()).count();
        assert_eq!(failed, 1);
        assert_eq!(engine.destroy_count(), 2, "both scenarios tear down");
    }

    #[tokio::test]
    async fn test_multi_server_scenario_distinctness() {
        let mut multi_outputs = outputs();
        multi_outputs.insert("monitoring_ipv4".to_string(), OutputValue::string("5.6.7.8"));
        multi_outputs.insert("openbao_ipv4".to_string(), OutputValue::string("9.9.9.9"));
        let engine = MockEngine::succeeding(multi_outputs);
        let runner = HarnessRunner::new(engine, MockTransport::always("OK"), test_config());

        let multi = builtin_catalog().remove(1);
        let results = runner.run(vec![multi], CancelToken::never()).await;
        assert_eq!(results[0].final_state, EnvState::Passed, "{results:?}");
        let names: Vec<_> = results[0]
            .check_results
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert!(names.contains(&"all_servers_distinct"));
    }
}
