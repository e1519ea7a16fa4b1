//! Error types for the aitest domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator seam has its own error enum.

use thiserror::Error;

/// The top-level error type for a test run.
#[derive(Debug, Error)]
pub enum Error {
    // --- Oracle errors ---
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    // --- Driver errors ---
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    // --- Context capture errors ---
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// The model itself declared the test failed. Not a defect in the
    /// harness; `reason` carries the model's final rationale.
    #[error("Test failed: {reason}")]
    TestFailed { reason: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    /// The model's generated text could not be interpreted as the expected
    /// response shape. Recovered by retry inside the oracle; surfaced only
    /// when the response envelope itself is unusable.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("No more retries remaining")]
    RetriesExhausted,

    #[error("Oracle not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    #[error("Driver failure: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Snapshot capture failed: {0}")]
    CaptureFailed(String),
}
