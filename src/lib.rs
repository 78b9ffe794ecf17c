//! Client-side orchestration for remote skin-analysis scans.
//!
//! Drives a full scan attempt end to end: capture acquisition, local
//! quality gating, session creation, upload, status polling, and result
//! normalization. The network boundary sits behind [`api::ScanBackend`],
//! so everything above it can run against scripted fakes.

pub mod api;
pub mod capture;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod poll;
pub mod quality;
pub mod types;

pub use api::{HttpScanClient, ScanBackend, StaticCredentials};
pub use capture::{CameraFeed, CaptureSource, FileCapture};
pub use error::{ApiError, ScanError};
pub use orchestrator::ScanOrchestrator;
pub use poll::{CancelFlag, PollConfig};
pub use quality::QualityGate;
pub use types::{CaptureQualityReport, CapturedFrame, ScanPhase, ScanResult};
