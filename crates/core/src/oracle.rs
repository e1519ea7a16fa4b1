//! Oracle trait — the abstraction over the external model service.
//!
//! An oracle turns a prompt (and optionally the current screen image) into a
//! parsed [`Decision`], hiding transport, auth, retry, and backoff. The loop
//! calls `decide()` without knowing which backend is being used — pure
//! polymorphism.

use async_trait::async_trait;

use crate::action::Decision;
use crate::error::OracleError;
use crate::snapshot::Screenshot;

/// The decision oracle seam.
///
/// May suspend for network I/O and backoff delays. Failures surfaced here
/// (transport, non-2xx status, retries exhausted) are fatal to the run;
/// malformed model output is expected to be retried internally.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(
        &self,
        prompt: &str,
        screenshot: Option<&Screenshot>,
    ) -> Result<Decision, OracleError>;
}
