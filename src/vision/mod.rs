//! Vision model backends.
//!
//! [`VisionModel`] is the transport seam between the detector and the
//! external model: an implementation delivers one prompt-plus-image request
//! and returns the model's raw text payload. Parsing and schema validation
//! stay in [`crate::pipeline::detect`], so every backend — including test
//! mocks — goes through identical validation.

pub mod gemini;

pub use gemini::GeminiVision;

use crate::error::ExtractError;
use async_trait::async_trait;

/// One detection request: the prompt set plus the page image payload.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    /// System instruction establishing the output contract.
    pub system_instruction: String,
    /// Wrapped user instruction for this request.
    pub prompt: String,
    /// Base64-encoded page image.
    pub image_base64: String,
    /// MIME type of the payload, e.g. `"image/jpeg"`.
    pub mime_type: &'static str,
}

/// A vision-capable model that can answer one detection request.
///
/// Implementations must not retry internally; retry policy belongs to the
/// caller of the run.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Deliver the request and return the raw response text, expected to be
    /// the JSON detection payload.
    async fn generate(&self, request: DetectionRequest) -> Result<String, ExtractError>;
}
