//! Local pre-submission quality checks.
//!
//! Fast heuristics only: a dimension floor and a sampled brightness check.
//! Nothing here contacts the network, and nothing here is a face detector —
//! the synthesized region is a centered placeholder. A real detector can
//! replace the gate by implementing the same `evaluate` contract.

use crate::error::ScanError;
use crate::types::{
    CaptureQualityReport, FaceRegion, RawImage, FACE_REGION_HEIGHT_RATIO, FACE_REGION_WIDTH_RATIO,
    LUMA_SAMPLE_COUNT, MAX_AVG_LUMA, MIN_AVG_LUMA, MIN_CAPTURE_HEIGHT, MIN_CAPTURE_WIDTH,
};

const ACCEPT_CONFIDENCE: f32 = 0.85;
const DEGRADED_CONFIDENCE: f32 = 0.5;

/// Heuristic capture gate. Thresholds are fields so tests and callers can
/// tighten or relax them without touching call sites.
#[derive(Debug, Clone)]
pub struct QualityGate {
    pub min_width: u32,
    pub min_height: u32,
    pub sample_count: usize,
    pub min_luma: f32,
    pub max_luma: f32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_width: MIN_CAPTURE_WIDTH,
            min_height: MIN_CAPTURE_HEIGHT,
            sample_count: LUMA_SAMPLE_COUNT,
            min_luma: MIN_AVG_LUMA,
            max_luma: MAX_AVG_LUMA,
        }
    }
}

impl QualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates a capture. Pure over the pixel data; runtime is bounded by
    /// `sample_count`, not image resolution.
    ///
    /// Undersized images are a hard reject. Too-dark images are a hard
    /// reject. Over-bright images pass with degraded confidence and a
    /// warning.
    pub fn evaluate(&self, image: &RawImage) -> Result<CaptureQualityReport, ScanError> {
        if image.width() < self.min_width || image.height() < self.min_height {
            return Ok(CaptureQualityReport {
                face_likely: false,
                confidence: 0.0,
                warning: Some(format!(
                    "Image too small. Minimum {}x{} required",
                    self.min_width, self.min_height
                )),
                face_region: None,
            });
        }

        let avg = self.average_luma(image);

        if avg < self.min_luma {
            return Ok(CaptureQualityReport {
                face_likely: false,
                confidence: 0.0,
                warning: Some("Image too dark. Please ensure good lighting".to_string()),
                face_region: None,
            });
        }

        if avg > self.max_luma {
            return Ok(CaptureQualityReport {
                face_likely: true,
                confidence: DEGRADED_CONFIDENCE,
                warning: Some("Image too bright. Reduce lighting or exposure".to_string()),
                face_region: Some(placeholder_region(image)),
            });
        }

        Ok(CaptureQualityReport {
            face_likely: true,
            confidence: ACCEPT_CONFIDENCE,
            warning: None,
            face_region: Some(placeholder_region(image)),
        })
    }

    /// Average Rec.601 luma over up to `sample_count` evenly strided pixels.
    fn average_luma(&self, image: &RawImage) -> f32 {
        let total = image.pixel_count();
        if total == 0 || self.sample_count == 0 {
            return 0.0;
        }

        let stride = (total / self.sample_count).max(1);
        let mut sum = 0.0f32;
        let mut samples = 0u32;

        let mut index = 0;
        while index < total && (samples as usize) < self.sample_count {
            let (r, g, b) = image.rgb_at(index);
            sum += luma(r, g, b);
            samples += 1;
            index += stride;
        }

        sum / samples as f32
    }
}

/// Perceptual brightness of one RGB pixel (Rec.601 weights).
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Centered rectangle covering roughly half the width and 70% of the height.
fn placeholder_region(image: &RawImage) -> FaceRegion {
    let w = (image.width() as f32 * FACE_REGION_WIDTH_RATIO) as u32;
    let h = (image.height() as f32 * FACE_REGION_HEIGHT_RATIO) as u32;
    FaceRegion {
        x: (image.width() - w) / 2,
        y: (image.height() - h) / 2,
        width: w,
        height: h,
    }
}

/// Static capture advice shown alongside gate warnings.
pub fn quality_guidelines() -> &'static [&'static str] {
    &[
        "Ensure your face is well-lit",
        "Look directly at the camera",
        "Remove glasses if possible",
        "Keep a neutral expression",
        "Fill the frame with your face",
        "Avoid shadows on your face",
    ]
}
