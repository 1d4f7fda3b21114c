//! Document rasterisation: PDF pages to RGB rasters via pdfium, still
//! images via the `image` crate.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread designed for blocking operations, preventing the Tokio worker
//! threads from stalling during CPU-heavy rendering. Image decoding takes
//! the same route; a 50-megapixel JPEG decode stalls an async worker just
//! as effectively as pdfium does.
//!
//! ## Scale and cap
//!
//! PDF pages render at `render_scale` times their natural point size, which
//! keeps small exam print legible for the detector. `max_rendered_pixels`
//! caps either edge regardless of physical size so an A0 poster cannot
//! exhaust memory. Still images are used exactly as decoded — they already
//! are rasters, so no rescaling applies.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::input::DocumentKind;
use image::RgbImage;
use pdfium_render::prelude::*;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// One rasterised page of the input document.
///
/// Pages are RGB end to end: detection payloads and crops are JPEG, which
/// has no alpha, so any transparency is dropped at this boundary.
#[derive(Clone)]
pub struct Page {
    /// 0-based index in document order.
    pub index: usize,
    /// Decoded RGB raster.
    pub image: RgbImage,
}

impl Page {
    /// 1-based page number for labels and logs.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("index", &self.index)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

/// Count the pages of a document without rendering any of them.
///
/// Still images always count as one page.
pub async fn page_count(
    path: &Path,
    kind: DocumentKind,
    password: Option<&str>,
) -> Result<usize, ExtractError> {
    match kind {
        DocumentKind::Image => Ok(1),
        DocumentKind::Pdf => {
            let path = path.to_path_buf();
            let pwd = password.map(|s| s.to_string());
            tokio::task::spawn_blocking(move || {
                let pdfium = bind_pdfium()?;
                let document = open_document(&pdfium, &path, pwd.as_deref())?;
                Ok(document.pages().len() as usize)
            })
            .await
            .map_err(|e| ExtractError::Internal(format!("Page-count task panicked: {}", e)))?
        }
    }
}

/// Rasterise the selected pages of a document.
///
/// Pages come back in ascending index order; each page's bitmap is fully
/// converted to an RGB buffer before the next page renders.
pub async fn rasterize_document(
    path: &Path,
    kind: DocumentKind,
    config: &ExtractionConfig,
    page_indices: &[usize],
) -> Result<Vec<Page>, ExtractError> {
    let path = path.to_path_buf();

    match kind {
        DocumentKind::Image => {
            tokio::task::spawn_blocking(move || decode_still_image(&path))
                .await
                .map_err(|e| ExtractError::Internal(format!("Decode task panicked: {}", e)))?
        }
        DocumentKind::Pdf => {
            let scale = config.render_scale;
            let max_pixels = config.max_rendered_pixels;
            let password = config.password.clone();
            let indices = page_indices.to_vec();

            tokio::task::spawn_blocking(move || {
                render_pdf_blocking(&path, scale, max_pixels, password.as_deref(), &indices)
            })
            .await
            .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
        }
    }
}

/// Decode a still image as a single page.
fn decode_still_image(path: &Path) -> Result<Vec<Page>, ExtractError> {
    let image = image::open(path).map_err(|e| ExtractError::CorruptDocument {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let rgb = image.to_rgb8();
    debug!("Decoded image input: {}x{} px", rgb.width(), rgb.height());

    Ok(vec![Page {
        index: 0,
        image: rgb,
    }])
}

/// Blocking implementation of PDF page rendering.
fn render_pdf_blocking(
    pdf_path: &Path,
    scale: f32,
    max_pixels: u32,
    password: Option<&str>,
    page_indices: &[usize],
) -> Result<Vec<Page>, ExtractError> {
    let pdfium = bind_pdfium()?;
    let document = open_document(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    if total_pages == 0 {
        return Err(ExtractError::CorruptDocument {
            path: pdf_path.to_path_buf(),
            detail: "document has no pages".into(),
        });
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| ExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| ExtractError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

        // Convert to RGB immediately so the pdfium bitmap can be released
        // before the next page renders.
        let image = bitmap.as_image().to_rgb8();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push(Page { index: idx, image });
    }

    Ok(results)
}

/// Bind to pdfium via the auto-download cache.
fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    docsnip_pdfium::bind_pdfium_silent()
        .map_err(|e| ExtractError::PdfiumBindingFailed(e.to_string()))
}

/// Open a PDF, mapping pdfium's password errors onto the two cases callers
/// can act on.
fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ExtractError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                ExtractError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ExtractError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            ExtractError::CorruptDocument {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}
