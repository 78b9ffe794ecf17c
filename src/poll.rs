//! Status polling until a terminal state, a deadline, or cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::api::{ScanBackend, StatusReport};
use crate::error::ScanError;
use crate::types::RemoteStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(120);

/// Polling policy. Call sites never hard-code these values.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Cancellation signal for one scan attempt, checked at the top of every
/// loop iteration and before every state-mutating callback.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Polls `GET /scan/{id}/status` until the remote reports a terminal status.
///
/// The first query is issued immediately; subsequent queries are spaced by
/// `config.interval`. Requests are strictly sequential — there is never more
/// than one in flight. Elapsed time is measured against a monotonic clock
/// from the first query.
///
/// Returns the completed report, or:
/// - `RemoteAnalysisFailed` when the remote reports `failed`, carrying the
///   remote message (or a generic fallback),
/// - `PollTimeout` when the deadline passes without a terminal status,
/// - `Cancelled` when the flag is set between ticks,
/// - `Api` when a status query itself fails.
pub async fn poll_until_terminal(
    backend: &dyn ScanBackend,
    session_id: &str,
    config: PollConfig,
    cancel: &CancelFlag,
) -> Result<StatusReport, ScanError> {
    let started = Instant::now();
    let mut queries = 0u32;

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(session_id, queries, "polling cancelled");
            return Err(ScanError::Cancelled);
        }

        if started.elapsed() > config.timeout {
            tracing::warn!(
                session_id,
                queries,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "polling deadline exceeded"
            );
            return Err(ScanError::PollTimeout {
                elapsed: started.elapsed(),
            });
        }

        let report = backend.fetch_status(session_id).await?;
        queries += 1;

        tracing::debug!(
            session_id,
            status = %report.status,
            progress = report.progress,
            queries,
            "status poll"
        );

        match report.status {
            RemoteStatus::Completed => return Ok(report),
            RemoteStatus::Failed => {
                let message = report
                    .message
                    .clone()
                    .unwrap_or_else(|| "Scan failed. Please try again.".to_string());
                return Err(ScanError::RemoteAnalysisFailed { message });
            }
            _ => {}
        }

        tokio::time::sleep(config.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{SessionCreated, UploadAck};
    use crate::error::ApiError;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    /// Backend whose status endpoint replays a canned sequence, sticking on
    /// the last entry.
    struct ScriptedStatus {
        sequence: Vec<RemoteStatus>,
        message: Option<String>,
        calls: Mutex<usize>,
    }

    impl ScriptedStatus {
        fn new(sequence: Vec<RemoteStatus>) -> Self {
            Self {
                sequence,
                message: None,
                calls: Mutex::new(0),
            }
        }

        fn with_message(mut self, message: &str) -> Self {
            self.message = Some(message.to_string());
            self
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl ScanBackend for ScriptedStatus {
        async fn create_session(&self) -> Result<SessionCreated, ApiError> {
            unimplemented!("not used by polling tests")
        }

        async fn upload_image(
            &self,
            _session_id: &str,
            _payload: Bytes,
            _content_type: &'static str,
        ) -> Result<UploadAck, ApiError> {
            unimplemented!("not used by polling tests")
        }

        async fn fetch_status(&self, _session_id: &str) -> Result<StatusReport, ApiError> {
            let mut calls = self.calls.lock();
            let index = (*calls).min(self.sequence.len() - 1);
            *calls += 1;
            Ok(StatusReport {
                status: self.sequence[index].clone(),
                message: self.message.clone(),
                progress: None,
                created_at: None,
                updated_at: None,
            })
        }

        async fn fetch_result(&self, _session_id: &str) -> Result<serde_json::Value, ApiError> {
            unimplemented!("not used by polling tests")
        }
    }

    fn fast_config() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(300),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_terminal_status() {
        let backend = ScriptedStatus::new(vec![
            RemoteStatus::Processing,
            RemoteStatus::Processing,
            RemoteStatus::Completed,
        ]);

        let report = poll_until_terminal(&backend, "s1", fast_config(), &CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(report.status, RemoteStatus::Completed);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_query_is_immediate() {
        let backend = ScriptedStatus::new(vec![RemoteStatus::Completed]);
        let report = poll_until_terminal(&backend, "s1", fast_config(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.status, RemoteStatus::Completed);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_terminal() {
        let backend = ScriptedStatus::new(vec![RemoteStatus::Processing]);

        let err = poll_until_terminal(&backend, "s1", fast_config(), &CancelFlag::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::PollTimeout { .. }));
        assert!(backend.calls() >= 3);
        assert!(backend.calls() <= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_surfaces_remote_message() {
        let backend =
            ScriptedStatus::new(vec![RemoteStatus::Processing, RemoteStatus::Failed])
                .with_message("low quality");

        let err = poll_until_terminal(&backend, "s1", fast_config(), &CancelFlag::new())
            .await
            .unwrap_err();

        match err {
            ScanError::RemoteAnalysisFailed { message } => assert_eq!(message, "low quality"),
            other => panic!("expected RemoteAnalysisFailed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_without_message_gets_fallback() {
        let backend = ScriptedStatus::new(vec![RemoteStatus::Failed]);

        let err = poll_until_terminal(&backend, "s1", fast_config(), &CancelFlag::new())
            .await
            .unwrap_err();

        match err {
            ScanError::RemoteAnalysisFailed { message } => assert!(!message.is_empty()),
            other => panic!("expected RemoteAnalysisFailed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pre_set_cancel_stops_before_any_query() {
        let backend = ScriptedStatus::new(vec![RemoteStatus::Processing]);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = poll_until_terminal(&backend, "s1", fast_config(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::Cancelled));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_statuses_are_treated_as_pending() {
        let backend = ScriptedStatus::new(vec![
            RemoteStatus::Other("queued".to_string()),
            RemoteStatus::Completed,
        ]);

        let report = poll_until_terminal(&backend, "s1", fast_config(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(report.status, RemoteStatus::Completed);
        assert_eq!(backend.calls(), 2);
    }
}
