//! Session lifecycle orchestration.
//!
//! Owns the one active scan attempt: state machine, quality gating before
//! any network call, upload, polling, and terminal result retrieval.
//! Remote-call failures are converted to the terminal `Failed` phase plus a
//! typed error here; nothing propagates past this boundary.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::ScanBackend;
use crate::error::{ApiError, ScanError};
use crate::normalize::normalize;
use crate::poll::{poll_until_terminal, CancelFlag, PollConfig};
use crate::quality::QualityGate;
use crate::types::{
    CaptureQualityReport, CapturedFrame, RemoteStatus, ScanPhase, ScanResult, ScanSession,
    MAX_UPLOAD_BYTES,
};

struct Inner {
    phase: ScanPhase,
    session: Option<ScanSession>,
    report: Option<CaptureQualityReport>,
    result: Option<ScanResult>,
    /// Displayable message for the current `Failed` phase.
    error: Option<String>,
    /// Bumped by `reset()`; a continuation whose epoch no longer matches
    /// must not mutate state.
    epoch: u64,
    cancel: CancelFlag,
}

impl Inner {
    fn clear(&mut self) {
        self.phase = ScanPhase::Idle;
        self.session = None;
        self.report = None;
        self.result = None;
        self.error = None;
    }
}

/// Drives one scan attempt at a time from creation through terminal result.
///
/// All orchestration runs as cooperative async tasks; state is re-checked
/// (via the epoch) after every suspension point before any mutation, since
/// `reset()` may land between a request's dispatch and its resolution.
pub struct ScanOrchestrator {
    backend: Arc<dyn ScanBackend>,
    gate: QualityGate,
    poll_config: PollConfig,
    inner: Mutex<Inner>,
}

impl ScanOrchestrator {
    pub fn new(backend: Arc<dyn ScanBackend>, poll_config: PollConfig) -> Self {
        Self {
            backend,
            gate: QualityGate::default(),
            poll_config,
            inner: Mutex::new(Inner {
                phase: ScanPhase::Idle,
                session: None,
                report: None,
                result: None,
                error: None,
                epoch: 0,
                cancel: CancelFlag::new(),
            }),
        }
    }

    pub fn with_gate(mut self, gate: QualityGate) -> Self {
        self.gate = gate;
        self
    }

    /// Requests a new session id from the remote service.
    ///
    /// Only legal from `Idle`; a second call while one is in flight (or
    /// after one succeeded) fails with `InvalidPhase` instead of corrupting
    /// the attempt.
    pub async fn initialize(&self) -> Result<String, ScanError> {
        let epoch = {
            let mut inner = self.inner.lock();
            if inner.phase != ScanPhase::Idle {
                return Err(ScanError::InvalidPhase {
                    action: "initialize",
                    phase: inner.phase,
                });
            }
            inner.phase = ScanPhase::Initializing;
            inner.error = None;
            inner.epoch
        };

        tracing::info!("creating scan session");
        let created = self.backend.create_session().await;

        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return Err(ScanError::Cancelled);
        }

        match created {
            Ok(created) => {
                tracing::info!(session_id = %created.session_id, "scan session created");
                let session_id = created.session_id.clone();
                inner.session = Some(ScanSession {
                    session_id: created.session_id,
                    created_at: created.created_at,
                    updated_at: created.created_at,
                });
                inner.phase = ScanPhase::Ready;
                Ok(session_id)
            }
            Err(api) => {
                let err = ScanError::SessionCreate(api);
                tracing::error!(error = %err, "session create failed");
                inner.phase = ScanPhase::Failed;
                inner.error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Gates the capture, uploads it, and drives polling to a terminal
    /// outcome. Only legal from `Ready`.
    ///
    /// Quality-gate rejections short-circuit before any transition: the
    /// session stays `Ready` so the user can re-capture without
    /// re-initializing.
    pub async fn submit(&self, frame: CapturedFrame) -> Result<(), ScanError> {
        let (session_id, epoch, cancel) = {
            let mut inner = self.inner.lock();
            if inner.phase != ScanPhase::Ready {
                return Err(ScanError::InvalidPhase {
                    action: "submit",
                    phase: inner.phase,
                });
            }

            let report = self.gate.evaluate(&frame.raw)?;
            let verdict_ok = report.submittable();
            let warning = report.warning.clone();
            inner.report = Some(report);

            if !verdict_ok {
                let warning =
                    warning.unwrap_or_else(|| "Capture failed quality checks".to_string());
                tracing::warn!(%warning, "capture rejected by quality gate");
                return Err(ScanError::QualityRejected { warning });
            }
            if let Some(warning) = warning {
                tracing::warn!(%warning, "capture accepted with warning");
            }

            let session = inner
                .session
                .as_ref()
                .expect("phase Ready implies a session");
            let session_id = session.session_id.clone();
            inner.phase = ScanPhase::Uploading;
            (session_id, inner.epoch, inner.cancel.clone())
        };

        if frame.encoded.len() > MAX_UPLOAD_BYTES {
            let api = ApiError::Status {
                status: 413,
                detail: format!(
                    "Image too large. Maximum size is {} MB.",
                    MAX_UPLOAD_BYTES / (1024 * 1024)
                ),
                timestamp: chrono::Utc::now(),
            };
            return self.fail(epoch, ScanError::Upload(api));
        }

        tracing::info!(session_id = %session_id, bytes = frame.encoded.len(), "uploading capture");
        let uploaded = self
            .backend
            .upload_image(&session_id, frame.encoded.clone(), frame.content_type)
            .await;

        {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                return Err(ScanError::Cancelled);
            }
            match uploaded {
                Ok(ack) => {
                    tracing::info!(session_id = %session_id, status = %ack.status, "upload accepted");
                    inner.phase = ScanPhase::Processing;
                }
                Err(api) => {
                    drop(inner);
                    return self.fail(epoch, ScanError::Upload(api));
                }
            }
        }

        let polled =
            poll_until_terminal(self.backend.as_ref(), &session_id, self.poll_config, &cancel)
                .await;

        let report = match polled {
            Ok(report) => report,
            Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
            Err(err) => return self.fail(epoch, err),
        };
        debug_assert_eq!(report.status, RemoteStatus::Completed);

        // Terminal status observed; only now is a result fetch legal.
        let raw = match self.backend.fetch_result(&session_id).await {
            Ok(raw) => raw,
            Err(api) => return self.fail(epoch, ScanError::Api(api)),
        };
        let result = match normalize(&raw) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(session_id = %session_id, error = %err, "result payload rejected");
                return self.fail(epoch, err);
            }
        };

        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return Err(ScanError::Cancelled);
        }
        if let Some(session) = inner.session.as_mut() {
            session.updated_at = report.updated_at.or(session.updated_at);
        }
        tracing::info!(session_id = %session_id, scores = result.scores.len(), "scan completed");
        inner.result = Some(result);
        inner.phase = ScanPhase::Completed;
        Ok(())
    }

    /// Clears the attempt and returns to `Idle`, cancelling any in-flight
    /// polling. Pending continuations of the old attempt become no-ops.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.cancel.cancel();
        inner.cancel = CancelFlag::new();
        inner.epoch += 1;
        inner.clear();
        tracing::debug!("orchestrator reset to idle");
    }

    pub fn phase(&self) -> ScanPhase {
        self.inner.lock().phase
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.session_id.clone())
    }

    /// Displayable message for the current failure, if any.
    pub fn error_message(&self) -> Option<String> {
        self.inner.lock().error.clone()
    }

    pub fn quality_report(&self) -> Option<CaptureQualityReport> {
        self.inner.lock().report.clone()
    }

    /// The normalized result. Fails with `ResultNotReady` until the attempt
    /// has completed; partial data is never handed out.
    pub fn result(&self) -> Result<ScanResult, ScanError> {
        let inner = self.inner.lock();
        match (&inner.result, inner.phase) {
            (Some(result), ScanPhase::Completed) => Ok(result.clone()),
            _ => Err(ScanError::ResultNotReady { phase: inner.phase }),
        }
    }

    /// Marks the attempt failed (unless it was reset meanwhile) and hands
    /// the typed error back to the caller.
    fn fail(&self, epoch: u64, err: ScanError) -> Result<(), ScanError> {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return Err(ScanError::Cancelled);
        }
        tracing::error!(error = %err, "scan attempt failed");
        inner.phase = ScanPhase::Failed;
        inner.error = Some(err.user_message());
        Err(err)
    }
}
