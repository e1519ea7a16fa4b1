//! # aitest Oracle
//!
//! The reference [`DecisionOracle`](aitest_core::DecisionOracle)
//! implementation, backed by the Anthropic Messages API.
//!
//! The hard part lives here: making a flaky, rate-limited,
//! occasionally-malformed completion endpoint behave like a reliable
//! decision oracle, with a bounded retry budget shared between rate-limit
//! backoff and malformed-output re-asks.

pub mod anthropic;

pub use anthropic::AnthropicOracle;
