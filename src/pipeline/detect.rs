//! Region detection: build the vision request and validate the response.
//!
//! This module converts one encoded page into a detection call and returns
//! the parsed regions. It is intentionally thin — the prompt text and the
//! response schema live in [`crate::prompts`], and transport lives behind
//! [`VisionModel`], so validation here applies identically to the real
//! backend and to test mocks.
//!
//! Calls are never retried: a failed or malformed response aborts the run,
//! and retry policy belongs to whoever started it.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::geometry::DetectedRegion;
use crate::pipeline::encode::EncodedPage;
use crate::prompts::{user_prompt, DETECTION_SYSTEM_PROMPT};
use crate::vision::{DetectionRequest, VisionModel};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Ask the model for labeled regions on one page.
///
/// An empty result is valid: the model found nothing matching the
/// instruction on this page.
pub async fn detect_regions(
    model: &Arc<dyn VisionModel>,
    page_num: usize,
    payload: EncodedPage,
    instruction: &str,
    config: &ExtractionConfig,
) -> Result<Vec<DetectedRegion>, ExtractError> {
    let start = Instant::now();

    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DETECTION_SYSTEM_PROMPT);

    let request = DetectionRequest {
        system_instruction: system_prompt.to_string(),
        prompt: user_prompt(instruction),
        image_base64: payload.base64,
        mime_type: payload.mime_type,
    };

    let raw = model.generate(request).await?;
    let regions = parse_detections(&raw)?;

    debug!(
        "Page {}: {} region(s) detected in {:?}",
        page_num,
        regions.len(),
        start.elapsed()
    );

    Ok(regions)
}

/// Parse and validate a detection payload.
///
/// The payload must be a JSON array of `{label, box_2d}` objects with all
/// four box fields present and numeric. Any deviation fails the whole
/// payload; there are no partial results from a half-valid array.
pub fn parse_detections(payload: &str) -> Result<Vec<DetectedRegion>, ExtractError> {
    let body = strip_code_fences(payload.trim());
    serde_json::from_str::<Vec<DetectedRegion>>(body).map_err(|e| {
        ExtractError::SchemaViolation {
            detail: e.to_string(),
        }
    })
}

/// Tolerate a response wrapped in markdown code fences.
///
/// Structured output makes this rare, but models under load occasionally
/// fence the JSON anyway and the unwrap costs nothing.
fn strip_code_fences(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix("```") {
        if let Some(newline) = rest.find('\n') {
            let body = &rest[newline + 1..];
            if let Some(stripped) = body.trim_end().strip_suffix("```") {
                return stripped.trim();
            }
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labeled_regions() {
        let payload = r#"[
            {"label": "Question 1", "box_2d": {"ymin": 100, "xmin": 50, "ymax": 250, "xmax": 950}},
            {"label": "Question 2", "box_2d": {"ymin": 260.5, "xmin": 50, "ymax": 400, "xmax": 950}}
        ]"#;
        let regions = parse_detections(payload).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].label, "Question 1");
        assert_eq!(regions[0].box_2d.ymin, 100.0);
        assert_eq!(regions[1].box_2d.ymin, 260.5);
    }

    #[test]
    fn empty_array_is_a_valid_result() {
        assert!(parse_detections("[]").unwrap().is_empty());
    }

    #[test]
    fn missing_box_field_fails_with_no_partial_regions() {
        let payload = r#"[
            {"label": "Question 1", "box_2d": {"ymin": 100, "xmin": 50, "ymax": 250, "xmax": 950}},
            {"label": "Question 2", "box_2d": {"ymin": 260, "xmin": 50, "xmax": 950}}
        ]"#;
        let err = parse_detections(payload).unwrap_err();
        match err {
            ExtractError::SchemaViolation { detail } => {
                assert!(detail.contains("ymax"), "got: {detail}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_array_payload_is_rejected() {
        let err = parse_detections(r#"{"label": "Question 1"}"#).unwrap_err();
        assert!(matches!(err, ExtractError::SchemaViolation { .. }));
    }

    #[test]
    fn prose_payload_is_rejected() {
        let err = parse_detections("I could not find any questions.").unwrap_err();
        assert!(matches!(err, ExtractError::SchemaViolation { .. }));
    }

    #[test]
    fn missing_label_is_rejected() {
        let payload = r#"[{"box_2d": {"ymin": 0, "xmin": 0, "ymax": 10, "xmax": 10}}]"#;
        assert!(parse_detections(payload).is_err());
    }

    #[test]
    fn fenced_payload_is_unwrapped() {
        let payload = "```json\n[{\"label\": \"Q1\", \"box_2d\": {\"ymin\": 1, \"xmin\": 2, \"ymax\": 3, \"xmax\": 4}}]\n```";
        let regions = parse_detections(payload).unwrap();
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn unknown_extra_fields_are_tolerated() {
        let payload = r#"[{"label": "Q1", "confidence": 0.93,
            "box_2d": {"ymin": 1, "xmin": 2, "ymax": 3, "xmax": 4}}]"#;
        let regions = parse_detections(payload).unwrap();
        assert_eq!(regions[0].label, "Q1");
    }
}
