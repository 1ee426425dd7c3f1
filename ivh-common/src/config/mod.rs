//! Harness configuration.
//!
//! Credentials come from process environment variables; the configuration
//! root and scenario set come from the CLI.

mod env;

pub use env::{EnvConfig, EnvError, load_env, load_env_from};

use std::path::PathBuf;

/// Default SSH login user on provisioned images.
pub const DEFAULT_SSH_USER: &str = "admin";

/// Everything a scenario task needs that is shared and read-only.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Provider credential, injected into every apply/destroy as the
    /// `hcloud_token` variable. Never logged.
    pub provider_token: String,
    /// SSH login user for remote checks.
    pub ssh_user: String,
    /// Identity file for remote checks, if the key pair was supplied.
    pub ssh_identity: Option<PathBuf>,
    /// Provisioning-engine configuration root shared by all scenarios.
    pub config_dir: PathBuf,
}

impl HarnessConfig {
    pub fn new(env: EnvConfig, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider_token: env.provider_token,
            ssh_user: env.ssh_user,
            ssh_identity: env.ssh_identity,
            config_dir: config_dir.into(),
        }
    }

    /// Whether remote (SSH) checks can run at all.
    pub fn remote_checks_available(&self) -> bool {
        self.ssh_identity.is_some()
    }
}
