//! Snapshot capture types and the context-provider seam.
//!
//! A `Snapshot` is one immutable capture of application state: the test
//! instructions, a serialized UI element tree, an optional screen image, and
//! the text substitutions to apply to typed text. It is produced once per
//! loop iteration by an external [`ContextProvider`] and discarded after the
//! iteration that consumed it.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ContextError;

/// A PNG screen capture with its pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// One immutable capture of application state, fed to one decision.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Free-text test instructions for this run.
    pub instructions: String,
    /// Serialized description of the current UI element tree.
    pub ui_tree: String,
    /// Screen image at capture time, if the provider supplies one.
    pub screenshot: Option<Screenshot>,
    /// Placeholder → literal substitutions applied to text the model types.
    pub substitutions: HashMap<String, String>,
}

impl Snapshot {
    pub fn new(instructions: impl Into<String>, ui_tree: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ui_tree: ui_tree.into(),
            screenshot: None,
            substitutions: HashMap::new(),
        }
    }

    pub fn with_screenshot(mut self, screenshot: Screenshot) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    pub fn with_substitutions(mut self, substitutions: HashMap<String, String>) -> Self {
        self.substitutions = substitutions;
        self
    }
}

/// Replace every `<key>` occurrence in `text` with its mapped value.
///
/// Placeholders without a mapping are left verbatim.
pub fn apply_substitutions(text: &str, substitutions: &HashMap<String, String>) -> String {
    let mut result = text.to_string();
    for (key, value) in substitutions {
        result = result.replace(&format!("<{key}>"), value);
    }
    result
}

/// External collaborator that captures a fresh [`Snapshot`] per iteration.
///
/// Capture may suspend (e.g. waiting for the app to idle on a UI-affinity
/// thread) and may fail; a capture failure is fatal to the run.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn capture(&self) -> Result<Snapshot, ContextError>;
}
