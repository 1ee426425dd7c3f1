//! Infrastructure Validation Harness.
//!
//! Provisions declared environments through an external engine, validates
//! the live resources, and guarantees teardown of everything it created
//! regardless of outcome.

pub mod lifecycle;
pub mod report;
pub mod runner;
pub mod scenario;

pub use lifecycle::EnvironmentLifecycle;
pub use report::Report;
pub use runner::HarnessRunner;
pub use scenario::{CheckDecl, CheckSpec, Scenario, builtin_catalog, load_scenarios};
