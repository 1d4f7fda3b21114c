//! Prompt and schema artifacts for the region detector.
//!
//! Centralising the model contract here serves two purposes:
//!
//! 1. **Single source of truth** — the system instruction, the user prompt
//!    wrapper and the response schema must agree on field names and the
//!    0–1000 coordinate space; keeping them in one file keeps them honest.
//!
//! 2. **Testability** — unit tests can inspect the contract directly without
//!    spinning up a real model, making contract regressions easy to catch.
//!
//! Callers can override the system instruction via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constant here is
//! used only when no override is provided.

use serde_json::{json, Value};

/// Default system instruction for region detection.
///
/// This establishes the output contract: a JSON array of labeled boxes in
/// the normalized 0–1000 space, with generous framing so no text is clipped.
pub const DETECTION_SYSTEM_PROMPT: &str = r#"You are an expert at analyzing documents and images. Your task is to identify specific parts of the provided image based on the user's request.

Return ONLY a valid JSON array containing objects. Each object must have:
1. "label": A short name for the detected part (e.g., "Question 1", "Logo").
2. "box_2d": The bounding box coordinates in the format {ymin, xmin, ymax, xmax}, normalized to a 0-1000 scale.

Be precise. Use generous bounding boxes (slightly larger than the text) to ensure no text is cut off. If the user asks for questions, ensure you include the full question text and all its options."#;

/// Wrap the caller's free-text instruction into the per-request user prompt.
pub fn user_prompt(instruction: &str) -> String {
    format!(
        "User request: {instruction}. Please identify these parts and provide \
         their bounding boxes carefully without cutting into text."
    )
}

/// The structured-output schema the model is constrained to.
///
/// Gemini's `responseSchema` dialect: upper-case type names, `required`
/// lists per object. Every box field is numeric and required, so a response
/// that omits one fails parsing as a whole rather than yielding partial
/// regions.
pub fn detection_response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "label": {
                    "type": "STRING",
                    "description": "Name or label of the detected part"
                },
                "box_2d": {
                    "type": "OBJECT",
                    "description": "Bounding box in ymin/xmin/ymax/xmax order, 0-1000 normalized",
                    "properties": {
                        "ymin": { "type": "NUMBER" },
                        "xmin": { "type": "NUMBER" },
                        "ymax": { "type": "NUMBER" },
                        "xmax": { "type": "NUMBER" }
                    },
                    "required": ["ymin", "xmin", "ymax", "xmax"]
                }
            },
            "required": ["label", "box_2d"]
        }
    })
}
