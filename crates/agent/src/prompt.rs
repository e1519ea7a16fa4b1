//! Prompt construction.
//!
//! Pure and deterministic: (instructions, UI state, recent history) in, one
//! text block out. The output-format contract is embedded verbatim so the
//! model can self-validate its answer, and the rendered history tail gives it
//! short-term memory across iterations.

use aitest_core::Snapshot;

/// How many rendered interaction summaries the model gets to see.
pub const HISTORY_WINDOW: usize = 10;

const OUTPUT_FORMAT: &str = r#"{
  "result": { "type": "string", "enum": ["pass", "fail"], "description": "Final test outcome. Present only when complete." },
  "actions": {
    "type": "array",
    "description": "List of pending test actions. Present and non-empty only when test is running.",
    "items": {
      "oneOf": [
        {
          "type": "object",
          "description": "Tap on the element with the given identifier",
          "properties": {
            "type": "tap", "target": { "type": "string", "id_or_label": "string" }
          }
        },
        {
          "type": "object",
          "description": "Type text in a text field with the given identifier. Only possible for \"textField\" and \"textView\" elements.",
          "properties": {
            "type": "type", "target": { "type": "string", "id_or_label": "string" }, "text": "string"
          }
        },
        {
          "type": "object",
          "description": "Wait a given number of seconds.",
          "properties": { "type": "wait", "duration_secs": "number" }
        },
        {
          "type": "object",
          "description": "Scroll the screen, starting from the given origin, and with the given offset.",
          "properties": {
            "type": "scroll",
            "origin_x": "number", "origin_y": "number", "offset_x": "number", "offset_y": "number"
          }
        }
      ]
    }
  },
  "comment": { "type": "string", "description": "Required explanation of test result/status", "required": true, "maxLength": 100 }
}"#;

const RULES: &str = r#"- You must output valid JSON with the format specified above.
- Only output a result if the test is completely finished or has obviously failed. Otherwise keep trying to take actions.
- You may take one or more actions per decision. They will be executed in order.
- If the test looks to have failed. Wait for 10 seconds and confirm the decision, in case something was just loading.
- You will be repeatedly requested to make the next decision of what actions to take. Each decision is expensive so try to make the most of each one. You can assume there is at least a 1 second gap between each decision.
- To scroll down/right, use a positive offset.
- The current state of the app is defined in appState below along with the screenshot. Use both to decide what action to take.
- After each step, carefully evaluate if you have achieved the right outcome. Explicitly show your thinking: "I have evaluated step X..." If not correct, try again. Only when you confirm a step was executed correctly should you move on to the next one. Your reasoning of every decision should be put in the comment field."#;

/// Builds the per-iteration prompt. No I/O, never mutates its inputs.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Render the prompt for one decision.
    ///
    /// `history` is the chronological list of rendered interaction
    /// summaries; only the last [`HISTORY_WINDOW`] entries are included.
    pub fn build(snapshot: &Snapshot, history: &[String]) -> String {
        let tail_start = history.len().saturating_sub(HISTORY_WINDOW);
        let recent = history[tail_start..].join("\n");

        let screen_size = snapshot
            .screenshot
            .as_ref()
            .map(|shot| format!("Screen size: width {}, height {}\n\n", shot.width, shot.height))
            .unwrap_or_default();

        format!(
            "<instructions>\n{instructions}\n</instructions>\n\n\
             // all fields must be non-null, unless otherwise specified.\n\
             <outputFormat>\n{OUTPUT_FORMAT}\n</outputFormat>\n\n\
             <rules>\n{RULES}\n</rules>\n\n\
             {screen_size}\
             <appState>\n{ui_tree}\n</appState>\n\n\
             // chronological order, last 10 decisions\n\
             <previousDecisions>\n{recent}\n</previousDecisions>",
            instructions = snapshot.instructions,
            ui_tree = snapshot.ui_tree,
        )
    }
}
