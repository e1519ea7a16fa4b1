//! The decision loop implementation.
//!
//! One iteration: capture a snapshot, build the prompt from it and the
//! rendered history tail, ask the oracle, record the decision, then either
//! finish (model declared a verdict) or dispatch the requested actions and
//! go around again. Driver failures are recorded into history and the loop
//! keeps running so the model can observe the new state and recover.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use aitest_core::error::DriverError;
use aitest_core::snapshot::apply_substitutions;
use aitest_core::{
    Action, AppDriver, ContextProvider, Decision, DecisionOracle, Error, Offset, Point, Result,
    Snapshot, Verdict,
};

use crate::prompt::PromptBuilder;

/// A record of one completed loop iteration.
///
/// Immutable once appended; the runner keeps the full sequence for the
/// lifetime of the run while the prompt only ever sees the rendered tail.
#[derive(Debug, Clone)]
pub enum Interaction {
    /// The model produced a decision (terminal or not).
    Decision {
        at: DateTime<Utc>,
        decision: Decision,
    },
    /// Dispatching the decision's actions failed partway through.
    Failure { at: DateTime<Utc>, error: String },
}

impl Interaction {
    fn decision(decision: Decision) -> Self {
        Self::Decision {
            at: Utc::now(),
            decision,
        }
    }

    fn failure(error: &DriverError) -> Self {
        Self::Failure {
            at: Utc::now(),
            error: error.to_string(),
        }
    }

    /// Render this interaction the way the model (and the final failure
    /// report) sees it.
    pub fn summary(&self) -> String {
        match self {
            Interaction::Decision { decision, .. } => {
                let actions = decision.actions.as_deref().unwrap_or(&[]);
                let rendered = actions
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}. Action: {}", decision.comment, rendered)
            }
            Interaction::Failure { error, .. } => format!("Interaction error: {error}"),
        }
    }
}

/// The core loop state machine: `Running` until the model declares a
/// verdict, then `Ok(())` on pass or [`Error::TestFailed`] on fail.
///
/// Iterations run strictly sequentially; the history is owned exclusively by
/// the runner (`&mut self`), so there is no shared mutation to guard.
pub struct TestRunner {
    oracle: Arc<dyn DecisionOracle>,
    driver: Arc<dyn AppDriver>,

    /// Whether to forward the snapshot's screen image to the oracle.
    include_image: bool,

    /// Full ordered interaction history for this run.
    history: Vec<Interaction>,
}

impl TestRunner {
    pub fn new(oracle: Arc<dyn DecisionOracle>, driver: Arc<dyn AppDriver>) -> Self {
        Self {
            oracle,
            driver,
            include_image: true,
            history: Vec::new(),
        }
    }

    /// Control whether screenshots are sent to the oracle (default: true).
    pub fn with_include_image(mut self, include_image: bool) -> Self {
        self.include_image = include_image;
        self
    }

    /// The full interaction history recorded so far.
    pub fn history(&self) -> &[Interaction] {
        &self.history
    }

    /// Drive the test to completion.
    ///
    /// Captures a fresh snapshot per iteration and loops until the model
    /// declares a verdict. Context-provider and oracle failures propagate;
    /// driver failures are recorded and the loop continues.
    pub async fn run(&mut self, provider: &dyn ContextProvider) -> Result<()> {
        loop {
            let snapshot = provider.capture().await?;
            if let Some(verdict) = self.step(&snapshot).await? {
                return match verdict {
                    Verdict::Pass => Ok(()),
                    Verdict::Fail => {
                        let reason = self
                            .history
                            .last()
                            .map(Interaction::summary)
                            .unwrap_or_default();
                        Err(Error::TestFailed { reason })
                    }
                };
            }
        }
    }

    /// One loop iteration. Returns the verdict if the decision was terminal.
    async fn step(&mut self, snapshot: &Snapshot) -> Result<Option<Verdict>> {
        let summaries: Vec<String> = self.history.iter().map(Interaction::summary).collect();
        let prompt = PromptBuilder::build(snapshot, &summaries);

        let screenshot = if self.include_image {
            snapshot.screenshot.as_ref()
        } else {
            None
        };

        let decision = self.oracle.decide(&prompt, screenshot).await?;

        // Record before inspecting so terminal decisions are part of history.
        self.history.push(Interaction::decision(decision.clone()));

        if let Some(verdict) = decision.result {
            info!(?verdict, comment = %decision.comment, "Received result");
            return Ok(Some(verdict));
        }

        info!(comment = %decision.comment, "Received decision");

        let actions = decision.actions.unwrap_or_default();
        for action in &actions {
            if let Err(e) = self.dispatch(action, snapshot).await {
                warn!(error = %e, %action, "Interaction failed");
                self.history.push(Interaction::failure(&e));
                break;
            }
        }

        Ok(None)
    }

    async fn dispatch(&self, action: &Action, snapshot: &Snapshot) -> std::result::Result<(), DriverError> {
        debug!(%action, "Performing action");
        match action {
            Action::Tap { target } => self.driver.tap(target).await,
            Action::Type { target, text } => {
                let text = apply_substitutions(text, &snapshot.substitutions);
                self.driver.type_text(target, &text).await
            }
            Action::Scroll {
                origin_x,
                origin_y,
                offset_x,
                offset_y,
            } => {
                self.driver
                    .scroll(
                        Point {
                            x: *origin_x,
                            y: *origin_y,
                        },
                        Offset {
                            dx: *offset_x,
                            dy: *offset_y,
                        },
                    )
                    .await
            }
            Action::Wait { duration_secs } => {
                // The vocabulary accepts any f64; a negative or non-finite
                // duration is a model mistake, not a crash.
                let duration = Duration::try_from_secs_f64(*duration_secs)
                    .map_err(|e| DriverError::Other(format!("invalid wait duration: {e}")))?;
                self.driver.wait(duration).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aitest_core::error::{ContextError, OracleError};
    use aitest_core::{ElementTarget, Screenshot};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Oracle that replays a fixed script of decisions and records what it
    /// was asked.
    struct ScriptedOracle {
        script: Mutex<VecDeque<Decision>>,
        prompts: Mutex<Vec<String>>,
        images_seen: Mutex<Vec<bool>>,
    }

    impl ScriptedOracle {
        fn new(script: Vec<Decision>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                prompts: Mutex::new(Vec::new()),
                images_seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl DecisionOracle for ScriptedOracle {
        async fn decide(
            &self,
            prompt: &str,
            screenshot: Option<&Screenshot>,
        ) -> std::result::Result<Decision, OracleError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.images_seen.lock().unwrap().push(screenshot.is_some());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| OracleError::MalformedResponse("script exhausted".into()))
        }
    }

    /// Driver that records dispatched calls; optionally fails tap on one
    /// specific target.
    #[derive(Default)]
    struct RecordingDriver {
        calls: Mutex<Vec<String>>,
        fail_tap_on: Option<String>,
    }

    #[async_trait::async_trait]
    impl AppDriver for RecordingDriver {
        async fn tap(&self, target: &ElementTarget) -> std::result::Result<(), DriverError> {
            if self.fail_tap_on.as_deref() == Some(target.id_or_label.as_str()) {
                return Err(DriverError::ElementNotFound(target.to_string()));
            }
            self.calls.lock().unwrap().push(format!("tap:{}", target.id_or_label));
            Ok(())
        }

        async fn type_text(
            &self,
            target: &ElementTarget,
            text: &str,
        ) -> std::result::Result<(), DriverError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("type:{}:{}", target.id_or_label, text));
            Ok(())
        }

        async fn scroll(&self, origin: Point, offset: Offset) -> std::result::Result<(), DriverError> {
            self.calls.lock().unwrap().push(format!(
                "scroll:{},{}:{},{}",
                origin.x, origin.y, offset.dx, offset.dy
            ));
            Ok(())
        }

        async fn wait(&self, duration: Duration) -> std::result::Result<(), DriverError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("wait:{}", duration.as_secs_f64()));
            Ok(())
        }
    }

    /// Provider returning clones of one snapshot, counting captures.
    struct FixedProvider {
        snapshot: Snapshot,
        captures: AtomicUsize,
    }

    impl FixedProvider {
        fn new(snapshot: Snapshot) -> Self {
            Self {
                snapshot,
                captures: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ContextProvider for FixedProvider {
        async fn capture(&self) -> std::result::Result<Snapshot, ContextError> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }
    }

    fn target(kind: &str, id: &str) -> ElementTarget {
        ElementTarget {
            kind: kind.into(),
            id_or_label: id.into(),
        }
    }

    fn decision(actions: Option<Vec<Action>>, comment: &str) -> Decision {
        Decision {
            result: None,
            actions,
            comment: comment.into(),
        }
    }

    fn verdict(v: Verdict, comment: &str) -> Decision {
        Decision {
            result: Some(v),
            actions: None,
            comment: comment.into(),
        }
    }

    #[tokio::test]
    async fn pass_verdict_ends_the_run() {
        let oracle = ScriptedOracle::new(vec![verdict(Verdict::Pass, "all steps verified")]);
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle.clone(), driver.clone());
        runner.run(&provider).await.unwrap();

        assert_eq!(runner.history().len(), 1);
        assert!(driver.calls.lock().unwrap().is_empty());
        assert_eq!(provider.captures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fail_verdict_surfaces_the_rationale() {
        let oracle = ScriptedOracle::new(vec![verdict(Verdict::Fail, "button missing")]);
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle, driver);
        let err = runner.run(&provider).await.unwrap_err();

        match err {
            Error::TestFailed { reason } => assert!(reason.contains("button missing")),
            other => panic!("Expected TestFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn actions_dispatch_in_order_with_substitutions() {
        let oracle = ScriptedOracle::new(vec![
            decision(
                Some(vec![
                    Action::Tap {
                        target: target("button", "Login"),
                    },
                    Action::Type {
                        target: target("textField", "email"),
                        text: "<email>".into(),
                    },
                ]),
                "logging in",
            ),
            verdict(Verdict::Pass, "done"),
        ]);
        let driver = Arc::new(RecordingDriver::default());
        let snapshot = Snapshot::new("instructions", "state").with_substitutions(
            HashMap::from([("email".to_string(), "qa@example.com".to_string())]),
        );
        let provider = FixedProvider::new(snapshot);

        let mut runner = TestRunner::new(oracle, driver.clone());
        runner.run(&provider).await.unwrap();

        assert_eq!(
            *driver.calls.lock().unwrap(),
            vec!["tap:Login", "type:email:qa@example.com"]
        );
        assert_eq!(provider.captures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn driver_error_aborts_iteration_but_not_the_run() {
        let oracle = ScriptedOracle::new(vec![
            decision(
                Some(vec![
                    Action::Tap {
                        target: target("button", "Missing"),
                    },
                    Action::Tap {
                        target: target("button", "Second"),
                    },
                ]),
                "trying two taps",
            ),
            verdict(Verdict::Pass, "recovered"),
        ]);
        let driver = Arc::new(RecordingDriver {
            fail_tap_on: Some("Missing".into()),
            ..Default::default()
        });
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle, driver.clone());
        runner.run(&provider).await.unwrap();

        // Second action never dispatched.
        assert!(driver.calls.lock().unwrap().is_empty());
        // Decision + Failure + terminal Decision.
        assert_eq!(runner.history().len(), 3);
        assert!(matches!(runner.history()[1], Interaction::Failure { .. }));
        // A fresh snapshot was requested for the recovery iteration.
        assert_eq!(provider.captures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_summary_is_shown_to_the_model() {
        let oracle = ScriptedOracle::new(vec![
            decision(
                Some(vec![Action::Tap {
                    target: target("button", "Missing"),
                }]),
                "tapping",
            ),
            verdict(Verdict::Pass, "done"),
        ]);
        let driver = Arc::new(RecordingDriver {
            fail_tap_on: Some("Missing".into()),
            ..Default::default()
        });
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle.clone(), driver);
        runner.run(&provider).await.unwrap();

        let prompts = oracle.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Interaction error:"));
        assert!(prompts[1].contains("tapping. Action: tap(button \"Missing\")"));
    }

    #[tokio::test]
    async fn wait_action_goes_through_the_driver() {
        let oracle = ScriptedOracle::new(vec![
            decision(
                Some(vec![Action::Wait { duration_secs: 5.0 }]),
                "waiting",
            ),
            verdict(Verdict::Pass, "done"),
        ]);
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle, driver.clone());
        runner.run(&provider).await.unwrap();

        assert_eq!(*driver.calls.lock().unwrap(), vec!["wait:5"]);
    }

    #[tokio::test]
    async fn negative_wait_duration_is_recorded_not_fatal() {
        let oracle = ScriptedOracle::new(vec![
            decision(
                Some(vec![Action::Wait {
                    duration_secs: -1.0,
                }]),
                "bad wait",
            ),
            verdict(Verdict::Pass, "recovered"),
        ]);
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle, driver.clone());
        runner.run(&provider).await.unwrap();

        // Nothing reached the driver; the bad duration became a recorded
        // failure and the run went on.
        assert!(driver.calls.lock().unwrap().is_empty());
        assert!(matches!(runner.history()[1], Interaction::Failure { .. }));
        assert!(runner.history()[1].summary().contains("invalid wait duration"));
    }

    #[tokio::test]
    async fn terminal_decision_ignores_any_actions() {
        let oracle = ScriptedOracle::new(vec![Decision {
            result: Some(Verdict::Pass),
            actions: Some(vec![Action::Tap {
                target: target("button", "Extra"),
            }]),
            comment: "done, ignore the tap".into(),
        }]);
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle, driver.clone());
        runner.run(&provider).await.unwrap();

        assert!(driver.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_decision_just_advances() {
        let oracle = ScriptedOracle::new(vec![
            decision(None, "observing"),
            verdict(Verdict::Pass, "done"),
        ]);
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle, driver.clone());
        runner.run(&provider).await.unwrap();

        assert!(driver.calls.lock().unwrap().is_empty());
        assert_eq!(runner.history().len(), 2);
        assert_eq!(provider.captures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn include_image_toggle_controls_oracle_input() {
        let shot = Screenshot {
            png: vec![0u8; 4],
            width: 100,
            height: 200,
        };
        let snapshot = Snapshot::new("instructions", "state").with_screenshot(shot);

        let oracle = ScriptedOracle::new(vec![verdict(Verdict::Pass, "done")]);
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(snapshot.clone());
        let mut runner = TestRunner::new(oracle.clone(), driver.clone());
        runner.run(&provider).await.unwrap();
        assert_eq!(*oracle.images_seen.lock().unwrap(), vec![true]);

        let oracle = ScriptedOracle::new(vec![verdict(Verdict::Pass, "done")]);
        let provider = FixedProvider::new(snapshot);
        let mut runner = TestRunner::new(oracle.clone(), driver).with_include_image(false);
        runner.run(&provider).await.unwrap();
        assert_eq!(*oracle.images_seen.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn oracle_errors_are_fatal() {
        let oracle = ScriptedOracle::new(vec![]); // script exhausted == oracle failure
        let driver = Arc::new(RecordingDriver::default());
        let provider = FixedProvider::new(Snapshot::new("instructions", "state"));

        let mut runner = TestRunner::new(oracle, driver);
        let err = runner.run(&provider).await.unwrap_err();
        assert!(matches!(err, Error::Oracle(_)));
    }

    #[test]
    fn failure_interaction_summary_format() {
        let interaction = Interaction::failure(&DriverError::NotInteractable("slider".into()));
        assert_eq!(
            interaction.summary(),
            "Interaction error: Element not interactable: slider"
        );
    }

    #[test]
    fn decision_interaction_summary_joins_actions() {
        let interaction = Interaction::decision(decision(
            Some(vec![
                Action::Tap {
                    target: target("button", "A"),
                },
                Action::Wait { duration_secs: 2.0 },
            ]),
            "two things",
        ));
        assert_eq!(
            interaction.summary(),
            "two things. Action: tap(button \"A\"), wait(2s)"
        );
    }
}
