//! # aitest Core
//!
//! Domain types, traits, and error definitions for model-driven UI acceptance
//! testing. This crate has **zero framework dependencies** — it defines the
//! vocabulary that the oracle and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here: the context
//! provider that captures app state, the driver that performs UI actions, and
//! the oracle that turns a prompt into a decision. Implementations live in
//! their respective crates (or in the host test suite). This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod action;
pub mod driver;
pub mod error;
pub mod oracle;
pub mod snapshot;

// Re-export key types at crate root for ergonomics
pub use action::{Action, Decision, ElementTarget, Offset, Point, Verdict};
pub use driver::AppDriver;
pub use error::{ContextError, DriverError, Error, OracleError, Result};
pub use oracle::DecisionOracle;
pub use snapshot::{ContextProvider, Screenshot, Snapshot, apply_substitutions};
