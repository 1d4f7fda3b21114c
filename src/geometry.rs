//! Normalized bounding-box geometry.
//!
//! The vision model reports boxes in an abstract 0–1000 coordinate space so
//! that detections are independent of the rendered page's pixel dimensions.
//! This module owns the conversion from that space to concrete pixel
//! rectangles: flat padding, clamping back into range, then linear scaling
//! with a single consistent rounding rule.

use serde::{Deserialize, Serialize};

/// Extent of the normalized coordinate space on both axes.
pub const COORD_SPACE: f64 = 1000.0;

/// Flat padding applied to every box edge, in normalized units.
///
/// Additive on purpose: the framing users get for a small box and a large box
/// grows by the same visual margin. Padding is applied before clamping so a
/// box touching the page edge degrades to the edge instead of leaving range.
pub const BOX_PADDING: f64 = 15.0;

/// A bounding box in the 0–1000 normalized space.
///
/// Field names match the wire format of the detection schema. The detector
/// guarantees `ymin < ymax`, `xmin < xmax` and all values in `[0, 1000]` for
/// well-behaved model output; nothing downstream relies on it, since
/// [`NormalizedBox::to_pixel_rect`] reports degenerate results instead of
/// panicking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl NormalizedBox {
    /// Expand by [`BOX_PADDING`] on all four sides, then clamp each
    /// coordinate back into `[0, 1000]`.
    ///
    /// Pad first, clamp second: near an edge the padding shrinks gracefully
    /// rather than producing out-of-range coordinates.
    pub fn padded(&self) -> NormalizedBox {
        NormalizedBox {
            ymin: (self.ymin - BOX_PADDING).clamp(0.0, COORD_SPACE),
            xmin: (self.xmin - BOX_PADDING).clamp(0.0, COORD_SPACE),
            ymax: (self.ymax + BOX_PADDING).clamp(0.0, COORD_SPACE),
            xmax: (self.xmax + BOX_PADDING).clamp(0.0, COORD_SPACE),
        }
    }

    /// Horizontal span in normalized units. Negative for inverted boxes.
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    /// Vertical span in normalized units. Negative for inverted boxes.
    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Map this box onto a page of `page_width` × `page_height` pixels.
    ///
    /// Each of x, y, width and height is scaled linearly
    /// (`x = xmin / 1000 × page_width`) and rounded half-up independently,
    /// so `x + width` may overshoot the page edge by at most one pixel; the
    /// cropper fills that sliver with white.
    ///
    /// Returns `None` when the box is degenerate: a non-positive normalized
    /// span, or a pixel span that rounds to zero.
    pub fn to_pixel_rect(&self, page_width: u32, page_height: u32) -> Option<PixelRect> {
        if self.width() <= 0.0 || self.height() <= 0.0 {
            return None;
        }

        let scale_x = f64::from(page_width) / COORD_SPACE;
        let scale_y = f64::from(page_height) / COORD_SPACE;

        let width = (self.width() * scale_x).round() as u32;
        let height = (self.height() * scale_y).round() as u32;
        if width == 0 || height == 0 {
            return None;
        }

        Some(PixelRect {
            x: (self.xmin * scale_x).round() as u32,
            y: (self.ymin * scale_y).round() as u32,
            width,
            height,
        })
    }
}

/// A concrete pixel rectangle on a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One labeled detection on a page, as returned by the vision model.
///
/// Order within a page is model output order; it is not guaranteed to be
/// spatially sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    /// Short human-readable label, e.g. `"Question 3"`.
    pub label: String,
    /// Bounding box in the 0–1000 normalized space.
    pub box_2d: NormalizedBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(ymin: f64, xmin: f64, ymax: f64, xmax: f64) -> NormalizedBox {
        NormalizedBox {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }

    #[test]
    fn padding_expands_interior_box() {
        let padded = boxed(100.0, 50.0, 250.0, 950.0).padded();
        assert_eq!(padded, boxed(85.0, 35.0, 265.0, 965.0));
    }

    #[test]
    fn padding_at_boundary_stays_in_range() {
        let padded = boxed(0.0, 0.0, 1000.0, 1000.0).padded();
        assert_eq!(padded, boxed(0.0, 0.0, 1000.0, 1000.0));

        let corner = boxed(990.0, 980.0, 1000.0, 1000.0).padded();
        assert_eq!(corner, boxed(975.0, 965.0, 1000.0, 1000.0));
        assert!(corner.ymax <= COORD_SPACE && corner.xmax <= COORD_SPACE);
    }

    #[test]
    fn pixel_rect_spans_scale_linearly() {
        // Padded form of {100, 50, 250, 950} on a 1000×1000 page.
        let rect = boxed(85.0, 35.0, 265.0, 965.0)
            .to_pixel_rect(1000, 1000)
            .unwrap();
        assert_eq!(rect.x, 35);
        assert_eq!(rect.y, 85);
        assert_eq!(rect.width, 930);
        assert_eq!(rect.height, 180);
    }

    #[test]
    fn rounding_is_half_up_per_component() {
        // 500/1000 × 3 = 1.5 → 2 under half-up.
        let rect = boxed(0.0, 500.0, 1000.0, 1000.0)
            .to_pixel_rect(3, 3)
            .unwrap();
        assert_eq!(rect.x, 2);
        // Span 500/1000 × 3 = 1.5 → 2, rounded independently of x.
        assert_eq!(rect.width, 2);
        assert_eq!(rect.height, 3);
    }

    #[test]
    fn inverted_box_is_degenerate() {
        assert!(boxed(500.0, 100.0, 400.0, 200.0)
            .to_pixel_rect(1000, 1000)
            .is_none());
    }

    #[test]
    fn sub_pixel_span_is_degenerate() {
        // 30.2 normalized units on a 10 px page is 0.302 px, which rounds to 0.
        assert!(boxed(0.0, 0.0, 30.2, 30.2).to_pixel_rect(10, 10).is_none());
    }

    #[test]
    fn zero_area_box_is_degenerate() {
        assert!(boxed(100.0, 100.0, 100.0, 300.0)
            .to_pixel_rect(1000, 1000)
            .is_none());
    }

    #[test]
    fn overshoot_is_at_most_one_pixel() {
        // Independent rounding of x and width can overshoot the page edge by
        // one pixel, never more.
        let b = boxed(0.0, 0.5, 1000.0, 999.9);
        let rect = b.to_pixel_rect(777, 777).unwrap();
        assert!(rect.x + rect.width <= 777 + 1);
    }
}
