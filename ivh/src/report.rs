//! Machine-readable run report and exit-code policy.

use chrono::{DateTime, Utc};
use ivh_common::types::{EnvState, EnvironmentResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Final report: one record per scenario, in declaration order.
#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub results: Vec<EnvironmentResult>,
}

impl Report {
    pub fn new(results: Vec<EnvironmentResult>) -> Self {
        Self {
            generated_at: Utc::now(),
            results,
        }
    }

    /// Whether every scenario's functional verdict is a pass.
    pub fn functional_pass(&self) -> bool {
        self.results.iter().all(EnvironmentResult::functional_pass)
    }

    /// Whether any scenario leaked resources.
    pub fn has_teardown_errors(&self) -> bool {
        self.results.iter().any(|r| r.teardown_error.is_some())
    }

    /// Non-zero if any scenario failed functionally or failed to clean up.
    pub fn exit_code(&self) -> i32 {
        if self.functional_pass() && !self.has_teardown_errors() {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Log a human-readable summary alongside the JSON surface.
    pub fn log_summary(&self) {
        for result in &self.results {
            let checks_passed = result.check_results.iter().filter(|c| c.passed).count();
            info!(
                scenario = %result.scenario,
                state = %result.final_state,
                checks = format!("{checks_passed}/{}", result.check_results.len()),
                "scenario finished"
            );
            for check in result.check_results.iter().filter(|c| !c.passed) {
                warn!(scenario = %result.scenario, check = %check.name, detail = %check.detail, "check failed");
            }
            if let Some(e) = &result.provision_error {
                warn!(scenario = %result.scenario, error = %e, "provisioning error");
            }
            if let Some(e) = &result.teardown_error {
                warn!(
                    scenario = %result.scenario,
                    error = %e,
                    "teardown error - resources may be leaked"
                );
            }
        }
        let skipped = self
            .results
            .iter()
            .filter(|r| r.final_state == EnvState::Skipped)
            .count();
        info!(
            scenarios = self.results.len(),
            skipped,
            pass = self.functional_pass(),
            "run complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivh_common::types::{CheckResult, EnvironmentId};
    use std::time::Duration;

    fn passing(name: &str) -> EnvironmentResult {
        EnvironmentResult {
            scenario: name.to_string(),
            identity: Some(EnvironmentId::new(format!("{name}-1-abc"))),
            final_state: EnvState::Passed,
            check_results: vec![CheckResult::pass("c", "ok", Duration::from_millis(5))],
            provision_error: None,
            teardown_error: None,
        }
    }

    #[test]
    fn test_exit_code_zero_on_clean_pass() {
        let report = Report::new(vec![passing("a"), passing("b")]);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_exit_code_nonzero_on_failed_scenario() {
        let mut failed = passing("a");
        failed.final_state = EnvState::Failed;
        let report = Report::new(vec![failed, passing("b")]);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_nonzero_on_teardown_error_even_if_passed() {
        let mut leaked = passing("a");
        leaked.teardown_error = Some("destroy timed out".to_string());
        let report = Report::new(vec![leaked]);
        assert!(report.functional_pass(), "functional verdict unaffected");
        assert_eq!(report.exit_code(), 1, "leaked resources must be loud");
    }

    #[test]
    fn test_skipped_scenario_is_not_a_failure() {
        let skipped = EnvironmentResult {
            scenario: "pricey".to_string(),
            identity: None,
            final_state: EnvState::Skipped,
            check_results: Vec::new(),
            provision_error: None,
            teardown_error: None,
        };
        let report = Report::new(vec![passing("a"), skipped]);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_json_surface_names_every_check() {
        let report = Report::new(vec![passing("a")]);
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"][0]["scenario"], "a");
        assert_eq!(value["results"][0]["check_results"][0]["name"], "c");
        assert_eq!(value["results"][0]["final_state"], "passed");
    }
}
