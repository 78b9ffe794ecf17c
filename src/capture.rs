//! Capture sources and the exclusive camera-feed guard.
//!
//! A capture source hands the orchestrator one still frame: decoded pixels
//! for the quality gate plus the original encoded payload for upload. The
//! live-camera stream is a process-wide singleton resource; `CameraFeed`
//! enforces that and guarantees release on every exit path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use image::ImageFormat;

use crate::error::ScanError;
use crate::types::{CapturedFrame, RawImage};

/// A source of still frames, typically a camera feed or a picked file.
///
/// Implementations do not gate quality; they only acquire and decode. The
/// orchestrator runs the quality gate on whatever comes out.
pub trait CaptureSource {
    /// Produces one frame. May block on I/O but must not touch the network.
    fn capture(&mut self) -> Result<CapturedFrame, ScanError>;
}

/// Capture source backed by an image file on disk (the "file picker" path).
#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CaptureSource for FileCapture {
    fn capture(&mut self) -> Result<CapturedFrame, ScanError> {
        let encoded = fs::read(&self.path)
            .map_err(|e| ScanError::ImageDecode(format!("{}: {}", self.path.display(), e)))?;
        decode_frame(Bytes::from(encoded))
    }
}

/// Decodes an encoded JPEG/PNG payload into a `CapturedFrame`.
pub fn decode_frame(encoded: Bytes) -> Result<CapturedFrame, ScanError> {
    let format = image::guess_format(&encoded)
        .map_err(|e| ScanError::ImageDecode(format!("unrecognized image format: {}", e)))?;

    let content_type = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        other => {
            return Err(ScanError::ImageDecode(format!(
                "unsupported image format: {:?}",
                other
            )));
        }
    };

    let decoded = image::load_from_memory_with_format(&encoded, format)
        .map_err(|e| ScanError::ImageDecode(e.to_string()))?;

    let rgb = decoded.to_rgb8();
    let (width, height) = (rgb.width(), rgb.height());
    let raw = RawImage::from_rgb8(width, height, Bytes::from(rgb.into_raw()))?;

    Ok(CapturedFrame {
        raw,
        encoded,
        content_type,
    })
}

// Only one live capture stream per process.
static CAMERA_IN_USE: AtomicBool = AtomicBool::new(false);

/// Exclusive handle around a capture source standing in for the platform
/// camera stream. Acquiring while another feed is live fails with
/// `CameraBusy`; dropping the handle always releases the stream.
pub struct CameraFeed<S: CaptureSource> {
    inner: S,
    released: bool,
}

impl<S: CaptureSource> CameraFeed<S> {
    pub fn acquire(inner: S) -> Result<Self, ScanError> {
        if CAMERA_IN_USE.swap(true, Ordering::SeqCst) {
            return Err(ScanError::CameraBusy);
        }
        tracing::debug!("camera feed acquired");
        Ok(Self {
            inner,
            released: false,
        })
    }

    /// Stops the stream and releases the handle. Equivalent to dropping,
    /// but explicit at call sites that tear down mid-flow.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            CAMERA_IN_USE.store(false, Ordering::SeqCst);
            tracing::debug!("camera feed released");
        }
    }
}

impl<S: CaptureSource> CaptureSource for CameraFeed<S> {
    fn capture(&mut self) -> Result<CapturedFrame, ScanError> {
        self.inner.capture()
    }
}

impl<S: CaptureSource> Drop for CameraFeed<S> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
