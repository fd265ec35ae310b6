//! Template matcher
//!
//! Locates a reference image patch inside a screenshot via normalized
//! cross-correlation. Used for browsers whose accessibility tree does not
//! expose web content, and as the fallback strategy everywhere else.
//!
//! A failed match is a normal `None`, consumed by retry logic upstream; only
//! undecodable input is an error. Matching is exact-scale: templates stay
//! valid within roughly ±5% of the resolution they were captured at, and
//! callers re-capture them per resolution class beyond that.

use image::GrayImage;
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};
use std::path::Path;

use crate::element::Element;
use crate::error::{Error, Result};
use crate::geometry::Region;

/// Default correlation score required to accept a match
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Best-scoring placement of a template inside a screenshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub region: Region,
    /// Normalized cross-correlation score, 0..1
    pub confidence: f32,
}

impl TemplateMatch {
    pub fn into_element(self) -> Element {
        Element::from_template(self.region, self.confidence)
    }
}

/// Decode PNG screenshot bytes into a grayscale image
pub fn decode_screenshot(bytes: &[u8]) -> Result<GrayImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidImage(format!("screenshot decode: {}", e)))?;
    Ok(img.to_luma8())
}

/// Load a template image from disk
pub fn load_template(path: impl AsRef<Path>) -> Result<GrayImage> {
    let path = path.as_ref();
    let img = image::open(path)
        .map_err(|e| Error::InvalidImage(format!("template {}: {}", path.display(), e)))?;
    Ok(img.to_luma8())
}

/// Find the best placement of `template` in `screenshot`
///
/// Returns the highest-scoring region when its score reaches `threshold`,
/// `None` otherwise. A template larger than the screenshot is a resolution
/// mismatch, surfaced as an error rather than a silent miss.
pub fn find_template(
    screenshot: &GrayImage,
    template: &GrayImage,
    threshold: f32,
) -> Result<Option<TemplateMatch>> {
    let (sw, sh) = screenshot.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 {
        return Err(Error::InvalidImage("empty template".into()));
    }
    if tw > sw || th > sh {
        return Err(Error::InvalidImage(format!(
            "template {}x{} larger than screenshot {}x{}",
            tw, th, sw, sh
        )));
    }

    let scores = match_template(
        screenshot,
        template,
        MatchTemplateMethod::CrossCorrelationNormalized,
    );
    let extremes = find_extremes(&scores);
    let confidence = extremes.max_value;
    let (mx, my) = extremes.max_value_location;

    tracing::debug!(confidence, threshold, x = mx, y = my, "template match");

    if confidence < threshold {
        return Ok(None);
    }
    Ok(Some(TemplateMatch {
        region: Region::new(mx as i32, my as i32, tw, th),
        confidence,
    }))
}
