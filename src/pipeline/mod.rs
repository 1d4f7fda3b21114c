//! Pipeline stages for region detection and cropping.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ encode ──▶ detect ──▶ crop ──▶ archive
//! (URL/path)  (pdfium)    (base64)   (VLM)    (JPEG)    (zip)
//! ```
//!
//! 1. [`input`]     — canonicalise the user-supplied path or URL to a local
//!    file and sniff its container format
//! 2. [`rasterize`] — render selected PDF pages (or decode a still image) to
//!    RGB bitmaps; runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]    — JPEG-encode and base64-wrap each page for the
//!    multimodal API request body
//! 4. [`detect`]    — drive the vision call and validate the returned region
//!    list; the only stage with network I/O
//! 5. [`crop`]      — map each normalized box to pixels, pad, cut and encode
//!    the crop
//! 6. [`archive`]   — bundle crops into a zip with sanitized entry names

pub mod archive;
pub mod crop;
pub mod detect;
pub mod encode;
pub mod input;
pub mod rasterize;
