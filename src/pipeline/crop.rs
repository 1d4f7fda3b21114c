//! Crop extraction: carve one detected region out of a rendered page.
//!
//! Order of operations per region: pad the normalized box, clamp it back
//! into range, map it to pixels, then copy onto a white canvas and encode.
//! Failures here are [`RegionError`]s; the orchestrator skips the region
//! and keeps going.

use crate::error::RegionError;
use crate::geometry::{NormalizedBox, PixelRect};
use crate::output::Crop;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};
use uuid::Uuid;

/// JPEG quality of the crop files handed back to callers.
///
/// Higher than the detection payload quality: these bytes are the product,
/// not an intermediate.
pub const CROP_JPEG_QUALITY: u8 = 90;

/// Cut one region out of `page` and encode it as JPEG.
///
/// `page_number` is 1-based and is stored on the crop verbatim, as is
/// `label`. Returns [`RegionError::DegenerateBox`] when the padded box
/// spans no pixels on this page.
pub fn crop_region(
    page: &RgbImage,
    label: &str,
    bounds: &NormalizedBox,
    page_number: usize,
) -> Result<Crop, RegionError> {
    let (page_width, page_height) = page.dimensions();

    let rect = bounds
        .padded()
        .to_pixel_rect(page_width, page_height)
        .ok_or_else(|| RegionError::DegenerateBox {
            label: label.to_string(),
            detail: format!(
                "box [{:.1}, {:.1}, {:.1}, {:.1}] spans no pixels on a {page_width}x{page_height} page",
                bounds.ymin, bounds.xmin, bounds.ymax, bounds.xmax
            ),
        })?;

    let canvas = compose_canvas(page, &rect);

    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, CROP_JPEG_QUALITY);
    canvas
        .write_with_encoder(encoder)
        .map_err(|e| RegionError::EncodeFailed {
            label: label.to_string(),
            detail: e.to_string(),
        })?;

    Ok(Crop {
        id: Uuid::new_v4().to_string(),
        label: label.to_string(),
        page: page_number,
        width: rect.width,
        height: rect.height,
        bytes,
    })
}

/// Copy the page pixels under `rect` onto a white canvas of `rect`'s size.
///
/// Independent rounding lets `rect` overshoot the page edge by one pixel;
/// anything outside the page stays white.
fn compose_canvas(page: &RgbImage, rect: &PixelRect) -> RgbImage {
    let (page_width, page_height) = page.dimensions();
    let mut canvas = RgbImage::from_pixel(rect.width, rect.height, Rgb([255, 255, 255]));

    let copy_width = rect.width.min(page_width.saturating_sub(rect.x));
    let copy_height = rect.height.min(page_height.saturating_sub(rect.y));
    if copy_width > 0 && copy_height > 0 {
        let view = imageops::crop_imm(page, rect.x, rect.y, copy_width, copy_height).to_image();
        imageops::replace(&mut canvas, &view, 0, 0);
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn boxed(ymin: f64, xmin: f64, ymax: f64, xmax: f64) -> NormalizedBox {
        NormalizedBox {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    #[test]
    fn interior_crop_has_padded_dimensions() {
        let page = RgbImage::from_pixel(1000, 1000, BLACK);
        let crop = crop_region(&page, "Question 1", &boxed(100.0, 50.0, 250.0, 950.0), 1).unwrap();

        // {100, 50, 250, 950} padded by 15 → {85, 35, 265, 965} → 930×180 px.
        assert_eq!(crop.width, 930);
        assert_eq!(crop.height, 180);
        assert_eq!(crop.page, 1);
        assert_eq!(crop.label, "Question 1");
        assert_eq!(&crop.bytes[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn crop_ids_are_unique() {
        let page = RgbImage::from_pixel(100, 100, BLACK);
        let bounds = boxed(100.0, 100.0, 500.0, 500.0);
        let a = crop_region(&page, "a", &bounds, 1).unwrap();
        let b = crop_region(&page, "b", &bounds, 1).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 36);
    }

    #[test]
    fn severely_inverted_box_is_degenerate() {
        let page = RgbImage::from_pixel(200, 200, BLACK);
        let err = crop_region(&page, "Question 9", &boxed(400.0, 500.0, 350.0, 400.0), 1)
            .unwrap_err();
        match err {
            RegionError::DegenerateBox { label, .. } => assert_eq!(label, "Question 9"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mildly_inverted_box_recovers_through_padding() {
        // Padding is applied before the degenerate check, so a box inverted
        // by less than twice the padding still produces a crop.
        let page = RgbImage::from_pixel(1000, 1000, BLACK);
        let crop = crop_region(&page, "q", &boxed(400.0, 100.0, 395.0, 300.0), 1).unwrap();
        // {400, 100, 395, 300} padded → {385, 85, 410, 315} → 230×25 px.
        assert_eq!(crop.width, 230);
        assert_eq!(crop.height, 25);
    }

    #[test]
    fn canvas_copies_page_pixels() {
        let page = RgbImage::from_pixel(100, 100, BLACK);
        let rect = PixelRect {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        };
        let canvas = compose_canvas(&page, &rect);
        assert_eq!(canvas.dimensions(), (30, 40));
        assert_eq!(canvas.get_pixel(0, 0), &BLACK);
        assert_eq!(canvas.get_pixel(29, 39), &BLACK);
    }

    #[test]
    fn overshoot_sliver_is_white() {
        // x + width overshoots a 110 px page by one pixel; the last column
        // and row have no source pixels and stay white.
        let page = RgbImage::from_pixel(110, 110, BLACK);
        let rect = PixelRect {
            x: 6,
            y: 6,
            width: 105,
            height: 105,
        };
        let canvas = compose_canvas(&page, &rect);
        assert_eq!(canvas.get_pixel(0, 0), &BLACK);
        assert_eq!(canvas.get_pixel(103, 50), &BLACK);
        assert_eq!(canvas.get_pixel(104, 50), &WHITE);
        assert_eq!(canvas.get_pixel(50, 104), &WHITE);
    }

    #[test]
    fn rect_fully_off_page_yields_all_white() {
        let page = RgbImage::from_pixel(50, 50, BLACK);
        let rect = PixelRect {
            x: 50,
            y: 50,
            width: 10,
            height: 10,
        };
        let canvas = compose_canvas(&page, &rect);
        assert!(canvas.pixels().all(|p| *p == WHITE));
    }
}
