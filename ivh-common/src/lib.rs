//! Shared types and primitives for the Infrastructure Validation Harness.
//!
//! The binary crate (`ivh`) owns scenario scheduling and the environment
//! lifecycle; everything here is the reusable substrate: the retry
//! poller, identity generation, the provisioning-engine and
//! remote-execution boundaries (with in-memory fakes), the validation
//! checks, and the error taxonomy.

pub mod cancel;
pub mod checks;
pub mod config;
pub mod errors;
pub mod identity;
pub mod provision;
pub mod retry;
pub mod ssh;
pub mod types;
pub mod util;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use errors::{
    OutputError, ProvisionError, ProvisionPhase, RetryError, TeardownError, TransportError,
};
pub use identity::IdentityGenerator;
pub use retry::{RetryPolicy, retry};
pub use types::{
    CheckResult, EnvState, EnvironmentId, EnvironmentResult, OutputValue, Outputs, VarValue,
    Variables,
};
