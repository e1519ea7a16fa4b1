//! The action vocabulary and decision model.
//!
//! These types are the parsed form of the model's answer for one loop
//! iteration. Parsing is strict: the `type` discriminator on an action is a
//! closed set (an unknown value is a hard deserialize error, never a no-op),
//! and `comment` is mandatory.

use serde::Deserialize;
use std::fmt;

/// Terminal test outcome declared by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Identifies an on-screen element by its role and an id-or-label string.
///
/// Resolution to a concrete element is the driver's responsibility; the core
/// treats this as opaque addressing data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ElementTarget {
    /// Element role, e.g. "button", "textField".
    #[serde(rename = "type")]
    pub kind: String,
    /// Accessibility identifier or visible label.
    pub id_or_label: String,
}

impl fmt::Display for ElementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\"", self.kind, self.id_or_label)
    }
}

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A signed scroll offset. Positive means down/right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

/// One UI action requested by the model.
///
/// Tagged on the wire by the `type` field. Numeric fields parse as floating
/// point, matching what models actually emit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Single-point activation of an element.
    Tap { target: ElementTarget },
    /// Focus the target, then enter text. Substitutions are applied to
    /// `text` by the loop before dispatch.
    Type { target: ElementTarget, text: String },
    /// Pure delay.
    Wait { duration_secs: f64 },
    /// Drag-style scroll starting at the given origin by a signed vector.
    Scroll {
        origin_x: f64,
        origin_y: f64,
        offset_x: f64,
        offset_y: f64,
    },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tap { target } => write!(f, "tap({target})"),
            Action::Type { target, text } => write!(f, "type({target}, \"{text}\")"),
            Action::Wait { duration_secs } => write!(f, "wait({duration_secs}s)"),
            Action::Scroll {
                origin_x,
                origin_y,
                offset_x,
                offset_y,
            } => write!(
                f,
                "scroll(origin ({origin_x}, {origin_y}), offset ({offset_x}, {offset_y}))"
            ),
        }
    }
}

/// The parsed model answer for one iteration.
///
/// `result` is present only when the model considers the test complete or
/// definitively failed; when it is present the iteration is terminal
/// regardless of `actions`. A decision with neither field populated is legal
/// and simply advances the loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub result: Option<Verdict>,
    #[serde(default)]
    pub actions: Option<Vec<Action>>,
    /// Mandatory rationale (the prompt documents a 100-char limit).
    pub comment: String,
}
