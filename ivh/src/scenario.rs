//! Scenario declarations and the built-in catalog.
//!
//! A scenario is a variable set for the provisioning engine plus the
//! checks to run against the resulting outputs. The built-in catalog
//! mirrors the production configuration's test matrix; a TOML file can
//! replace it wholesale.

use anyhow::{Context, Result};
use ivh_common::checks::{
    RemoteHostSpec, Suite, eventual_remote_command, ipv4_format, map_equals, non_empty,
    pairwise_distinct, remote_contains,
};
use ivh_common::config::HarnessConfig;
use ivh_common::retry::RetryPolicy;
use ivh_common::ssh::RemoteTransport;
use ivh_common::types::{VarValue, Variables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default command for reachability probes.
const DEFAULT_PROBE_COMMAND: &str = "echo OK";

/// One declared scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique name; also the base of the environment identity.
    pub name: String,
    /// Value of the engine's `environment` variable (cloud tag).
    pub environment: String,
    /// Value of the engine's `project_name` variable.
    #[serde(default = "default_project")]
    pub project: String,
    /// Per-scenario sizing and feature-toggle variables.
    #[serde(default)]
    pub variables: Variables,
    /// Expensive scenarios are skipped entirely in short mode.
    #[serde(default)]
    pub expensive: bool,
    /// Checks in registration order.
    #[serde(default, rename = "check")]
    pub checks: Vec<CheckDecl>,
}

fn default_project() -> String {
    "terratest".to_string()
}

impl Scenario {
    /// Full variable set for apply/destroy, credential included.
    pub fn engine_variables(&self, config: &HarnessConfig) -> Variables {
        let mut vars = self.variables.clone();
        vars.insert(
            "hcloud_token".to_string(),
            VarValue::String(config.provider_token.clone()),
        );
        vars.insert(
            "environment".to_string(),
            VarValue::String(self.environment.clone()),
        );
        vars.insert(
            "project_name".to_string(),
            VarValue::String(self.project.clone()),
        );
        vars
    }

    /// Build the validation suite bound to this scenario.
    pub fn build_suite<T>(&self, config: &HarnessConfig, transport: &T) -> Result<Suite>
    where
        T: RemoteTransport + Clone + 'static,
    {
        let mut suite = Suite::new();
        for decl in &self.checks {
            decl.register(&mut suite, config, transport)?;
        }
        Ok(suite)
    }
}

/// A named check declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub spec: CheckSpec,
}

impl CheckDecl {
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.spec.default_name())
    }

    fn register<T>(&self, suite: &mut Suite, config: &HarnessConfig, transport: &T) -> Result<()>
    where
        T: RemoteTransport + Clone + 'static,
    {
        let name = self.display_name();
        match &self.spec {
            CheckSpec::Ipv4Format { output } => suite.add_check(name, ipv4_format(output)),
            CheckSpec::NonEmpty { output } => suite.add_check(name, non_empty(output)),
            CheckSpec::LabelsEqual { output, expected } => {
                suite.add_check(name, map_equals(output, expected.clone()))
            }
            CheckSpec::PairwiseDistinct { outputs } => {
                suite.add_check(name, pairwise_distinct(outputs))
            }
            CheckSpec::SshReachable {
                host_output,
                command,
                max_attempts,
                interval,
            } => {
                let target = host_spec(host_output, config);
                let probe = command.as_deref().unwrap_or(DEFAULT_PROBE_COMMAND);
                let default = RetryPolicy::ssh_reachability(host_output);
                let interval = match interval {
                    Some(text) => humantime::parse_duration(text)
                        .with_context(|| format!("invalid interval '{text}' in check '{name}'"))?,
                    None => default.interval,
                };
                let policy = RetryPolicy::new(
                    default.operation_name,
                    max_attempts.unwrap_or(default.max_attempts),
                    interval,
                );
                suite.add_check(
                    name,
                    eventual_remote_command(transport.clone(), target, probe, policy),
                );
            }
            CheckSpec::RemoteContains {
                host_output,
                command,
                needle,
            } => {
                let target = host_spec(host_output, config);
                suite.add_check(
                    name,
                    remote_contains(transport.clone(), target, command, needle),
                );
            }
        }
        Ok(())
    }
}

fn host_spec(host_output: &str, config: &HarnessConfig) -> RemoteHostSpec {
    let mut spec = RemoteHostSpec::new(host_output, &config.ssh_user);
    if let Some(identity) = &config.ssh_identity {
        spec = spec.with_identity_file(identity);
    }
    spec
}

/// Check kinds a scenario can declare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    /// Output must be a dotted-quad IPv4 address.
    Ipv4Format { output: String },
    /// Output must be present and non-blank.
    NonEmpty { output: String },
    /// Map-shaped output must carry the expected key/value pairs.
    LabelsEqual {
        output: String,
        expected: BTreeMap<String, String>,
    },
    /// The named outputs must be pairwise distinct.
    PairwiseDistinct { outputs: Vec<String> },
    /// Remote command must eventually succeed on the host in `host_output`.
    SshReachable {
        host_output: String,
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        max_attempts: Option<u32>,
        /// Humantime duration, e.g. "10s".
        #[serde(default)]
        interval: Option<String>,
    },
    /// Remote command output must contain `needle` (single shot).
    RemoteContains {
        host_output: String,
        command: String,
        needle: String,
    },
}

impl CheckSpec {
    fn default_name(&self) -> String {
        match self {
            Self::Ipv4Format { output } => format!("{output}_format"),
            Self::NonEmpty { output } => format!("{output}_non_empty"),
            Self::LabelsEqual { output, .. } => format!("{output}_equal"),
            Self::PairwiseDistinct { .. } => "pairwise_distinct".to_string(),
            Self::SshReachable { host_output, .. } => format!("{host_output}_ssh_reachable"),
            Self::RemoteContains { host_output, .. } => format!("{host_output}_content"),
        }
    }
}

/// On-disk scenario file.
#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(rename = "scenario")]
    scenarios: Vec<Scenario>,
}

/// Load scenarios from a TOML file, replacing the built-in catalog.
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file {}", path.display()))?;
    let file: ScenarioFile = toml::from_str(&text)
        .with_context(|| format!("failed to parse scenario file {}", path.display()))?;
    anyhow::ensure!(!file.scenarios.is_empty(), "scenario file declares no scenarios");
    Ok(file.scenarios)
}

/// The built-in catalog, mirroring the production configuration's tests.
pub fn builtin_catalog() -> Vec<Scenario> {
    let expected_labels: BTreeMap<String, String> = [
        ("environment", "test"),
        ("role", "wordpress"),
        ("project", "terratest"),
        ("managed_by", "terraform"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let smallest = |vars: &mut Variables, key: &str| {
        vars.insert(key.to_string(), VarValue::from("cx11"));
    };

    // Baseline: one WordPress server, optional servers off.
    let mut baseline_vars = Variables::new();
    smallest(&mut baseline_vars, "wordpress_server_type");
    baseline_vars.insert("deploy_monitoring_server".to_string(), VarValue::from(false));
    baseline_vars.insert("deploy_openbao_server".to_string(), VarValue::from(false));
    let baseline = Scenario {
        name: "baseline".to_string(),
        environment: "test".to_string(),
        project: "terratest".to_string(),
        variables: baseline_vars,
        expensive: false,
        checks: vec![
            CheckDecl {
                name: Some("wordpress_server_created".to_string()),
                spec: CheckSpec::Ipv4Format {
                    output: "wordpress_ipv4".to_string(),
                },
            },
            CheckDecl {
                name: Some("server_labels".to_string()),
                spec: CheckSpec::LabelsEqual {
                    output: "wordpress_labels".to_string(),
                    expected: expected_labels,
                },
            },
            CheckDecl {
                name: Some("ssh_connectivity".to_string()),
                spec: CheckSpec::SshReachable {
                    host_output: "wordpress_ipv4".to_string(),
                    command: None,
                    max_attempts: None,
                    interval: None,
                },
            },
            CheckDecl {
                name: Some("debian_version".to_string()),
                spec: CheckSpec::RemoteContains {
                    host_output: "wordpress_ipv4".to_string(),
                    command: "cat /etc/debian_version".to_string(),
                    needle: "13".to_string(),
                },
            },
        ],
    };

    // Multi-server: all optional servers on; addresses must be distinct.
    let mut multi_vars = Variables::new();
    smallest(&mut multi_vars, "wordpress_server_type");
    smallest(&mut multi_vars, "monitoring_server_type");
    smallest(&mut multi_vars, "openbao_server_type");
    multi_vars.insert("deploy_monitoring_server".to_string(), VarValue::from(true));
    multi_vars.insert("deploy_openbao_server".to_string(), VarValue::from(true));
    let address_outputs: Vec<String> = ["wordpress_ipv4", "monitoring_ipv4", "openbao_ipv4"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut multi_checks: Vec<CheckDecl> = address_outputs
        .iter()
        .map(|output| CheckDecl {
            name: None,
            spec: CheckSpec::NonEmpty {
                output: output.clone(),
            },
        })
        .collect();
    multi_checks.push(CheckDecl {
        name: Some("all_servers_distinct".to_string()),
        spec: CheckSpec::PairwiseDistinct {
            outputs: address_outputs,
        },
    });
    let multi = Scenario {
        name: "multi-server".to_string(),
        environment: "test-multi".to_string(),
        project: "terratest-multi".to_string(),
        variables: multi_vars,
        expensive: true,
        checks: multi_checks,
    };

    // Outputs: the documented output surface must be present.
    let mut outputs_vars = Variables::new();
    outputs_vars.insert("deploy_monitoring_server".to_string(), VarValue::from(false));
    outputs_vars.insert("deploy_openbao_server".to_string(), VarValue::from(false));
    let outputs = Scenario {
        name: "outputs".to_string(),
        environment: "test-outputs".to_string(),
        project: "terratest".to_string(),
        variables: outputs_vars,
        expensive: false,
        checks: [
            "wordpress_ipv4",
            "wordpress_ipv4_private",
            "wordpress_server_type",
            "wordpress_labels",
        ]
        .iter()
        .map(|output| CheckDecl {
            name: Some(format!("output_{output}")),
            spec: CheckSpec::NonEmpty {
                output: output.to_string(),
            },
        })
        .collect(),
    };

    vec![baseline, multi, outputs]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivh_common::config::{EnvConfig, HarnessConfig};
    use ivh_common::ssh::MockTransport;

    fn test_config() -> HarnessConfig {
        HarnessConfig::new(
            EnvConfig {
                provider_token: "secret-token".to_string(),
                ssh_user: "admin".to_string(),
                ssh_identity: None,
            },
            "/tmp/config",
        )
    }

    #[test]
    fn test_engine_variables_include_credential_and_names() {
        let catalog = builtin_catalog();
        let scenario = &catalog[0];
        let vars = scenario.engine_variables(&test_config());
        assert_eq!(vars["hcloud_token"], VarValue::from("secret-token"));
        assert_eq!(vars["environment"], VarValue::from("test"));
        assert_eq!(vars["project_name"], VarValue::from("terratest"));
        assert_eq!(vars["deploy_monitoring_server"], VarValue::from(false));
    }

    #[test]
    fn test_builtin_catalog_shape() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.len(), 3);
        assert!(!catalog[0].expensive);
        assert!(catalog[1].expensive, "multi-server must be skippable");
        assert_eq!(catalog[1].checks.len(), 4);
        assert_eq!(catalog[2].checks.len(), 4);
    }

    #[test]
    fn test_build_suite_registers_all_checks() {
        let catalog = builtin_catalog();
        let scenario = &catalog[0];
        let suite = scenario
            .build_suite(&test_config(), &MockTransport::always("OK"))
            .unwrap();
        assert_eq!(suite.len(), scenario.checks.len());
    }

    #[test]
    fn test_scenario_file_round_trip() {
        let text = r#"
[[scenario]]
name = "baseline"
environment = "test"
project = "terratest"

[scenario.variables]
wordpress_server_type = "cx11"
deploy_monitoring_server = false

[[scenario.check]]
name = "wordpress_server_created"
kind = "ipv4_format"
output = "wordpress_ipv4"

[[scenario.check]]
kind = "ssh_reachable"
host_output = "wordpress_ipv4"
max_attempts = 5
interval = "2s"
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.toml");
        std::fs::write(&path, text).unwrap();

        let scenarios = load_scenarios(&path).unwrap();
        assert_eq!(scenarios.len(), 1);
        let scenario = &scenarios[0];
        assert_eq!(scenario.name, "baseline");
        assert_eq!(
            scenario.variables["wordpress_server_type"],
            VarValue::from("cx11")
        );
        assert_eq!(scenario.checks.len(), 2);
        assert_eq!(
            scenario.checks[1].display_name(),
            "wordpress_ipv4_ssh_reachable"
        );

        let suite = scenario
            .build_suite(&test_config(), &MockTransport::always("OK"))
            .unwrap();
        assert_eq!(suite.len(), 2);
    }

    #[test]
    fn test_invalid_interval_rejected_at_build() {
        let scenario = Scenario {
            name: "bad".to_string(),
            environment: "test".to_string(),
            project: "terratest".to_string(),
            variables: Variables::new(),
            expensive: false,
            checks: vec![CheckDecl {
                name: None,
                spec: CheckSpec::SshReachable {
                    host_output: "wordpress_ipv4".to_string(),
                    command: None,
                    max_attempts: None,
                    interval: Some("not-a-duration".to_string()),
                },
            }],
        };
        assert!(
            scenario
                .build_suite(&test_config(), &MockTransport::always("OK"))
                .is_err()
        );
    }

    #[test]
    fn test_empty_scenario_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();
        assert!(load_scenarios(&path).is_err());
    }
}
