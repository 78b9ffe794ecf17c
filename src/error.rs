use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Uniform error for any remote call that did not produce a usable response.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status. `detail` is parsed from a
    /// JSON body when the content type indicates JSON, otherwise raw text.
    #[error("HTTP {status}: {detail}")]
    Status {
        status: u16,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// The request never produced an HTTP response (DNS, connect, TLS, ...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A 2xx body that could not be decoded as the expected shape.
    #[error("invalid response body: {0}")]
    Body(String),
}

/// Errors surfaced by the scan session core.
///
/// Remote-call failures are converted into these at the orchestrator
/// boundary; nothing propagates past it into presentation code.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to create scan session: {0}")]
    SessionCreate(#[source] ApiError),

    #[error("image upload failed: {0}")]
    Upload(#[source] ApiError),

    /// No terminal status within the configured deadline. Distinct from a
    /// remote-reported failure so callers can message the user differently.
    #[error("scan timed out after {elapsed:?}; the analysis may still be running")]
    PollTimeout { elapsed: Duration },

    /// The remote explicitly reported `status: "failed"`.
    #[error("analysis failed: {message}")]
    RemoteAnalysisFailed { message: String },

    /// A status or result query failed at the transport/HTTP level.
    #[error("scan service error: {0}")]
    Api(#[from] ApiError),

    /// Malformed or incomplete result payload; never rendered partially.
    #[error("malformed analysis result: {0}")]
    ResultShape(String),

    /// The capture buffer could not be interpreted as pixel data.
    #[error("could not decode image: {0}")]
    ImageDecode(String),

    /// The local quality gate rejected the capture before any network call.
    #[error("capture rejected: {warning}")]
    QualityRejected { warning: String },

    /// The requested operation is not legal in the current phase.
    #[error("cannot {action} while session is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: crate::types::ScanPhase,
    },

    /// A result was requested before the session reached a terminal state.
    #[error("no result available yet (session is {phase})")]
    ResultNotReady { phase: crate::types::ScanPhase },

    /// The attempt was cancelled by `reset()` or teardown.
    #[error("scan cancelled")]
    Cancelled,

    /// Only one live capture stream may exist at a time.
    #[error("camera is already in use")]
    CameraBusy,
}

impl ScanError {
    /// True when a fresh capture (without re-initializing) can recover.
    pub fn recoverable_by_recapture(&self) -> bool {
        matches!(
            self,
            ScanError::ImageDecode(_) | ScanError::QualityRejected { .. }
        )
    }

    /// Displayable message for a terminal failed state. Timeouts and explicit
    /// remote failures read differently by construction of the variants.
    pub fn user_message(&self) -> String {
        match self {
            ScanError::PollTimeout { .. } => {
                "The scan is taking longer than expected. Please try again later.".to_string()
            }
            ScanError::RemoteAnalysisFailed { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_remote_failure_read_differently() {
        let timeout = ScanError::PollTimeout {
            elapsed: Duration::from_secs(120),
        };
        let failed = ScanError::RemoteAnalysisFailed {
            message: "low quality".to_string(),
        };
        assert_ne!(timeout.user_message(), failed.user_message());
        assert_eq!(failed.user_message(), "low quality");
    }

    #[test]
    fn gate_rejections_are_recoverable() {
        let rejected = ScanError::QualityRejected {
            warning: "too dark".to_string(),
        };
        assert!(rejected.recoverable_by_recapture());
        assert!(
            !ScanError::RemoteAnalysisFailed {
                message: "x".into()
            }
            .recoverable_by_recapture()
        );
    }

    #[test]
    fn api_status_error_formats_with_detail() {
        let err = ApiError::Status {
            status: 413,
            detail: "Image too large".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(err.to_string(), "HTTP 413: Image too large");
    }
}
