//! # aitest Agent
//!
//! The decision loop and prompt builder: the part of the harness that turns
//! "ask a model what to do next" into a terminating acceptance test.
//!
//! A [`TestRunner`] owns the interaction history for one run and drives the
//! snapshot → prompt → decide → act cycle until the model reports a verdict.

pub mod prompt;
pub mod runner;

pub use prompt::{HISTORY_WINDOW, PromptBuilder};
pub use runner::{Interaction, TestRunner};
