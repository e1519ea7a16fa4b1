//! Driver trait — the abstraction over concrete UI automation.
//!
//! A driver knows how to resolve an [`ElementTarget`] to an on-screen
//! element and perform gestures against the live app. The decision loop
//! calls it without knowing which automation backend is in use.
//!
//! Implementations typically need a specific single-threaded execution
//! context (a UI-affinity thread); every operation is async so the loop can
//! suspend while that context does its work.

use async_trait::async_trait;
use std::time::Duration;

use crate::action::{ElementTarget, Offset, Point};
use crate::error::DriverError;

/// External collaborator that performs concrete UI operations.
#[async_trait]
pub trait AppDriver: Send + Sync {
    /// Single-point activation of the target element.
    async fn tap(&self, target: &ElementTarget) -> Result<(), DriverError>;

    /// Focus the target, then enter the (already substituted) text.
    async fn type_text(&self, target: &ElementTarget, text: &str) -> Result<(), DriverError>;

    /// Drag-style scroll starting at `origin` by the signed `offset`.
    /// Positive offset scrolls down/right.
    async fn scroll(&self, origin: Point, offset: Offset) -> Result<(), DriverError>;

    /// Pure delay. Routed through the driver so backends can wait on their
    /// own execution context.
    async fn wait(&self, duration: Duration) -> Result<(), DriverError>;
}
