//! Page encoding: RGB raster → base64 JPEG for the detection request.
//!
//! Vision APIs accept inline images as base64 embedded in the JSON request
//! body. JPEG at quality 85 keeps a 2×-rendered page comfortably under
//! upload limits while leaving text sharp enough for box placement; the
//! detector reads layout, not fine print, so lossless PNG would only pay
//! for bytes the model ignores.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::io::Cursor;
use tracing::debug;

/// JPEG quality for detection payloads.
pub const PAGE_JPEG_QUALITY: u8 = 85;

/// A page encoded for the wire.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    /// Base64 of the JPEG bytes.
    pub base64: String,
    /// Always `"image/jpeg"`.
    pub mime_type: &'static str,
}

/// Encode a rasterised page as a base64 JPEG ready for the vision API.
pub fn encode_page(img: &RgbImage) -> Result<EncodedPage, ExtractError> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, PAGE_JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .map_err(|e| ExtractError::Internal(format!("Page encode failed: {}", e)))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(EncodedPage {
        base64: b64,
        mime_type: "image/jpeg",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encode_small_page() {
        let img = RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]));
        let page = encode_page(&img).expect("encode should succeed");
        assert_eq!(page.mime_type, "image/jpeg");

        // Verify it's valid base64 wrapping a JPEG stream.
        let decoded = STANDARD.decode(&page.base64).expect("valid base64");
        assert_eq!(&decoded[..3], &[0xFF, 0xD8, 0xFF]);
    }
}
