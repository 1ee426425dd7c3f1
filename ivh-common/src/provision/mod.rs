//! Provisioning-engine boundary.
//!
//! The harness treats provisioned resources as opaque named entities with
//! string-keyed attributes; everything engine-specific stays behind
//! [`ProvisioningEngine`] so lifecycle and retry logic can be exercised
//! with the in-memory [`mock::MockEngine`].

mod mock;
mod terraform;

pub use mock::{MockEngine, MockEngineBuilder};
pub use terraform::TerraformCli;

use crate::errors::{OutputError, ProvisionError};
use crate::types::{OutputValue, Outputs, Variables};
use std::future::Future;
use std::path::Path;

/// Narrow contract against the external provisioning engine.
///
/// All three operations are blocking network calls from the scenario
/// task's perspective and must be callable from concurrently running
/// tasks, each with its own `workspace` partition.
pub trait ProvisioningEngine: Send + Sync {
    /// Converge the declared configuration in `workspace` and return its
    /// outputs. Idempotent: re-applying an already-applied workspace with
    /// identical inputs converges to the same resource set.
    fn apply(
        &self,
        config_dir: &Path,
        vars: &Variables,
        workspace: &str,
    ) -> impl Future<Output = Result<Outputs, ProvisionError>> + Send;

    /// Tear down everything in `workspace`. Safe to call when apply never
    /// succeeded, and safe to call more than once.
    fn destroy(
        &self,
        config_dir: &Path,
        vars: &Variables,
        workspace: &str,
    ) -> impl Future<Output = Result<(), ProvisionError>> + Send;

    /// Read a single output from `workspace`. A missing key is
    /// [`OutputError::NotFound`], which callers must not retry.
    fn output(
        &self,
        config_dir: &Path,
        workspace: &str,
        key: &str,
    ) -> impl Future<Output = Result<OutputValue, OutputError>> + Send;
}
