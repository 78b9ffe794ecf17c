use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

pub const MIN_CAPTURE_WIDTH: u32 = 640;
pub const MIN_CAPTURE_HEIGHT: u32 = 480;

/// Number of pixels sampled for the luma average. Evaluation cost is
/// proportional to this, not to image resolution.
pub const LUMA_SAMPLE_COUNT: usize = 100;
pub const MIN_AVG_LUMA: f32 = 50.0;
pub const MAX_AVG_LUMA: f32 = 240.0;

pub const FACE_REGION_WIDTH_RATIO: f32 = 0.5;
pub const FACE_REGION_HEIGHT_RATIO: f32 = 0.7;

/// Upper bound the backend enforces on uploads; checked locally first.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const RGB_CHANNELS: usize = 3;

/// A decoded still image: tightly packed RGB8, row-major.
#[derive(Debug, Clone)]
pub struct RawImage {
    width: u32,
    height: u32,
    pixels: Bytes,
}

impl RawImage {
    /// Wraps a packed RGB8 buffer. The buffer length must be exactly
    /// `width * height * 3`.
    pub fn from_rgb8(width: u32, height: u32, pixels: Bytes) -> Result<Self, ScanError> {
        let expected = width as usize * height as usize * RGB_CHANNELS;
        if pixels.len() != expected {
            return Err(ScanError::ImageDecode(format!(
                "pixel buffer length {} does not match {}x{} RGB8 ({} bytes)",
                pixels.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns the RGB triple at the given pixel index (row-major).
    #[inline]
    pub fn rgb_at(&self, index: usize) -> (u8, u8, u8) {
        let base = index * RGB_CHANNELS;
        (
            self.pixels[base],
            self.pixels[base + 1],
            self.pixels[base + 2],
        )
    }
}

/// One captured frame: decoded pixels for the quality gate plus the original
/// encoded payload for upload.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub raw: RawImage,
    pub encoded: Bytes,
    pub content_type: &'static str,
}

/// Local session state. Mirrors the remote lifecycle plus the client-only
/// `Idle` and `Ready` states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Initializing,
    Ready,
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl ScanPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanPhase::Completed | ScanPhase::Failed)
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Initializing => "initializing",
            ScanPhase::Ready => "ready",
            ScanPhase::Uploading => "uploading",
            ScanPhase::Processing => "processing",
            ScanPhase::Completed => "completed",
            ScanPhase::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Remote-reported processing status. Unknown strings are preserved and
/// treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    #[serde(untagged)]
    Other(String),
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Completed | RemoteStatus::Failed)
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Pending => write!(f, "pending"),
            RemoteStatus::Processing => write!(f, "processing"),
            RemoteStatus::Completed => write!(f, "completed"),
            RemoteStatus::Failed => write!(f, "failed"),
            RemoteStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// The server-issued session for one scan attempt.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub session_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Advisory face-area rectangle in pixel coordinates.
///
/// Synthesized by the quality gate as a centered placeholder. It is NOT the
/// output of a real detector and must not drive cropping decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Verdict of the local quality gate for one capture.
#[derive(Debug, Clone)]
pub struct CaptureQualityReport {
    /// Heuristic guess, not a detection.
    pub face_likely: bool,
    /// Advisory confidence in [0, 1].
    pub confidence: f32,
    pub warning: Option<String>,
    pub face_region: Option<FaceRegion>,
}

impl CaptureQualityReport {
    /// Whether the capture is worth submitting at all.
    pub fn submittable(&self) -> bool {
        self.face_likely
    }
}

/// Normalized terminal analysis result.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub status: RemoteStatus,
    /// Concern name → severity in 0–100. The vocabulary is open-ended.
    pub scores: BTreeMap<String, f64>,
    /// Guidance strings in display-priority order.
    pub recommendations: Vec<String>,
    pub generated_at: Option<DateTime<Utc>>,
}
