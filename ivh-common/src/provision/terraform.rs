//! Terraform CLI adapter.
//!
//! Shells out to the `terraform` binary with `tokio::process::Command`.
//! Workspace isolation uses `terraform workspace select -or-create`, so
//! concurrent applies against one configuration root land in separate
//! state partitions.

use super::ProvisioningEngine;
use crate::errors::{OutputError, ProvisionError, ProvisionPhase};
use crate::types::{OutputValue, Outputs, Variables};
use crate::util::{first_line, mask_sensitive_command};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Adapter around the `terraform` executable.
#[derive(Debug, Clone)]
pub struct TerraformCli {
    /// Binary to invoke; normally just `terraform`.
    binary: String,
}

impl Default for TerraformCli {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
        }
    }
}

impl TerraformCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the binary path (e.g. `tofu`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(
        &self,
        config_dir: &Path,
        workspace: Option<&str>,
        args: &[String],
    ) -> Result<String, (i32, String)> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(format!("-chdir={}", config_dir.display()));
        cmd.args(args);
        // Never prompt, never color; output is consumed by the harness.
        cmd.env("TF_IN_AUTOMATION", "1");
        cmd.env("TF_INPUT", "0");
        if let Some(ws) = workspace {
            cmd.env("TF_WORKSPACE", ws);
        }

        let rendered = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %mask_sensitive_command(&rendered), "running engine command");

        let output = cmd
            .output()
            .await
            .map_err(|e| (-1, format!("failed to spawn {}: {e}", self.binary)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let status = output.status.code().unwrap_or(-1);
            Err((status, if stderr.trim().is_empty() { stdout } else { stderr }))
        }
    }

    fn var_args(vars: &Variables) -> Vec<String> {
        let mut args = Vec::with_capacity(vars.len() * 2);
        for (key, value) in vars {
            args.push("-var".to_string());
            args.push(format!("{key}={}", value.render()));
        }
        args
    }

    async fn init_workspace(
        &self,
        config_dir: &Path,
        workspace: &str,
    ) -> Result<(), ProvisionError> {
        self.run(
            config_dir,
            None,
            &["init".to_string(), "-no-color".to_string()],
        )
        .await
        .map_err(|(_, stderr)| ProvisionError::new(ProvisionPhase::Init, first_line(&stderr)))?;

        self.run(
            config_dir,
            None,
            &[
                "workspace".to_string(),
                "select".to_string(),
                "-or-create".to_string(),
                workspace.to_string(),
            ],
        )
        .await
        .map_err(|(_, stderr)| ProvisionError::new(ProvisionPhase::Init, first_line(&stderr)))?;
        Ok(())
    }

    async fn read_outputs(
        &self,
        config_dir: &Path,
        workspace: &str,
    ) -> Result<Outputs, OutputError> {
        let stdout = self
            .run(
                config_dir,
                Some(workspace),
                &["output".to_string(), "-json".to_string()],
            )
            .await
            .map_err(|(_, stderr)| OutputError::Engine(first_line(&stderr).to_string()))?;
        parse_output_json(&stdout).map_err(OutputError::Engine)
    }
}

impl ProvisioningEngine for TerraformCli {
    async fn apply(
        &self,
        config_dir: &Path,
        vars: &Variables,
        workspace: &str,
    ) -> Result<Outputs, ProvisionError> {
        info!(workspace, config_dir = %config_dir.display(), "applying configuration");
        self.init_workspace(config_dir, workspace).await?;

        let mut args = vec![
            "apply".to_string(),
            "-auto-approve".to_string(),
            "-no-color".to_string(),
        ];
        args.extend(Self::var_args(vars));

        self.run(config_dir, Some(workspace), &args)
            .await
            .map_err(|(_, stderr)| {
                let phase = classify_apply_failure(&stderr);
                warn!(workspace, %phase, "apply failed");
                ProvisionError::new(phase, first_line(&stderr))
            })?;

        self.read_outputs(config_dir, workspace)
            .await
            .map_err(|e| ProvisionError::new(ProvisionPhase::Apply, e.to_string()))
    }

    async fn destroy(
        &self,
        config_dir: &Path,
        vars: &Variables,
        workspace: &str,
    ) -> Result<(), ProvisionError> {
        info!(workspace, "destroying workspace");
        // Init failures must not pass for a clean teardown: a destroy that
        // never reached the engine may be leaving resources behind. The
        // "safe before apply" property holds anyway, because destroying a
        // workspace with no state is already a successful no-op.
        self.init_workspace(config_dir, workspace).await?;

        let mut args = vec![
            "destroy".to_string(),
            "-auto-approve".to_string(),
            "-no-color".to_string(),
        ];
        args.extend(Self::var_args(vars));

        self.run(config_dir, Some(workspace), &args)
            .await
            .map_err(|(_, stderr)| {
                ProvisionError::new(ProvisionPhase::Destroy, first_line(&stderr))
            })?;
        info!(workspace, "destroy complete");
        Ok(())
    }

    async fn output(
        &self,
        config_dir: &Path,
        workspace: &str,
        key: &str,
    ) -> Result<OutputValue, OutputError> {
        let outputs = self.read_outputs(config_dir, workspace).await?;
        outputs
            .get(key)
            .cloned()
            .ok_or_else(|| OutputError::NotFound {
                workspace: workspace.to_string(),
                key: key.to_string(),
            })
    }
}

/// Entry shape of `terraform output -json`.
#[derive(Debug, Deserialize)]
struct RawOutput {
    value: serde_json::Value,
}

fn parse_output_json(stdout: &str) -> Result<Outputs, String> {
    let raw: BTreeMap<String, RawOutput> =
        serde_json::from_str(stdout).map_err(|e| format!("malformed output JSON: {e}"))?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k, OutputValue(v.value)))
        .collect())
}

/// Apply failures before any resource is touched come out of the plan
/// step; the engine prints a distinct marker for those.
fn classify_apply_failure(stderr: &str) -> ProvisionPhase {
    let lowered = stderr.to_lowercase();
    if lowered.contains("planning failed")
        || lowered.contains("error validating")
        || lowered.contains("invalid value for variable")
        || lowered.contains("unsupported argument")
    {
        ProvisionPhase::Plan
    } else {
        ProvisionPhase::Apply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VarValue;

    #[test]
    fn test_var_args_rendering() {
        let mut vars = Variables::new();
        vars.insert("environment".to_string(), VarValue::from("test"));
        vars.insert("deploy_monitoring_server".to_string(), VarValue::from(false));
        let args = TerraformCli::var_args(&vars);
        assert_eq!(
            args,
            vec![
                "-var",
                "deploy_monitoring_server=false",
                "-var",
                "environment=test"
            ]
        );
    }

    #[test]
    fn test_parse_output_json() {
        let stdout = r#"{
            "wordpress_ipv4": {"sensitive": false, "type": "string", "value": "1.2.3.4"},
            "wordpress_labels": {"sensitive": false, "type": ["map", "string"], "value": {"role": "wordpress"}}
        }"#;
        let outputs = parse_output_json(stdout).unwrap();
        assert_eq!(outputs["wordpress_ipv4"].as_str(), Some("1.2.3.4"));
        let labels = outputs["wordpress_labels"].as_string_map().unwrap();
        assert_eq!(labels.get("role").map(String::as_str), Some("wordpress"));
    }

    #[test]
    fn test_parse_output_json_rejects_garbage() {
        assert!(parse_output_json("not json").is_err());
    }

    #[tokio::test]
    async fn test_destroy_surfaces_engine_failure() {
        // An engine that cannot even start must not report a clean teardown.
        let engine = TerraformCli::with_binary("/nonexistent/terraform-binary");
        let result = engine
            .destroy(Path::new("/tmp/config"), &Variables::new(), "ws-1")
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.phase, ProvisionPhase::Init);
        assert!(err.detail.contains("failed to spawn"), "{err}");
    }

    #[test]
    fn test_classify_plan_failure() {
        assert_eq!(
            classify_apply_failure("Error: Planning failed. Terraform encountered an error"),
            ProvisionPhase::Plan
        );
        assert_eq!(
            classify_apply_failure("Error: server create failed: resource unavailable"),
            ProvisionPhase::Apply
        );
    }
}
