//! Analysis job submission
//!
//! Validates an uploaded signal, persists it, runs the engine against it and
//! commits the result. Input is persisted before the engine runs and kept
//! afterwards whatever the outcome.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::engine::{settle_run, AnalysisRequest, EngineFailure, SignalEngine};
use super::job_store::{JobStore, StoreError};
use crate::models::{AnalysisJob, JobId, JobKind, RawSignalInput};

/// Problems with a submission itself, detected before any engine work
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("uploaded signal is empty")]
    EmptyPayload,

    #[error("unsupported file format '{extension}'; accepted: {accepted}")]
    UnsupportedFormat { extension: String, accepted: String },

    #[error("unknown signal type '{0}'; expected 'ecg' or 'eeg'")]
    UnknownSignalKind(String),

    #[error("sampling rate must be a positive integer, got '{0}'")]
    InvalidSamplingRate(String),
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineFailure),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parse a client-supplied sampling rate in Hz
pub fn parse_sampling_rate(text: &str) -> Result<u32, ValidationError> {
    match text.trim().parse::<u32>() {
        Ok(hz) if hz > 0 => Ok(hz),
        _ => Err(ValidationError::InvalidSamplingRate(text.to_string())),
    }
}

#[derive(Clone)]
pub struct AnalysisInvoker {
    store: Arc<JobStore>,
    engine: Arc<dyn SignalEngine>,
    allowed_extensions: Arc<Vec<String>>,
}

impl AnalysisInvoker {
    pub fn new(store: Arc<JobStore>, engine: Arc<dyn SignalEngine>, allowed_extensions: Vec<String>) -> Self {
        Self {
            store,
            engine,
            allowed_extensions: Arc::new(allowed_extensions),
        }
    }

    /// Check a submission, returning the extension its input is stored under
    pub fn validate(&self, raw: &RawSignalInput) -> Result<String, ValidationError> {
        if raw.bytes.is_empty() {
            return Err(ValidationError::EmptyPayload);
        }

        let extension = raw.extension().unwrap_or_default();
        if !self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            return Err(ValidationError::UnsupportedFormat {
                extension,
                accepted: self.allowed_extensions.join(", "),
            });
        }
        Ok(extension)
    }

    /// Run one analysis job to completion.
    ///
    /// Returns the completed job. On failure the job's staged output is
    /// discarded and no result becomes visible under its identifier.
    pub async fn submit(&self, raw: RawSignalInput) -> Result<AnalysisJob, InvocationError> {
        let extension = match self.validate(&raw) {
            Ok(extension) => extension,
            Err(e) => {
                warn!(
                    kind = %raw.kind,
                    filename = %raw.filename,
                    error = %e,
                    "Rejected analysis submission"
                );
                return Err(e.into());
            }
        };

        let id = JobId::generate();
        let input_location = self
            .store
            .write_input(raw.kind, &id, &extension, &raw.bytes)
            .await?;
        let mut job = AnalysisJob::new(id, raw.kind, input_location);

        info!(
            job_id = %job.id,
            kind = %job.kind,
            bytes = raw.bytes.len(),
            sampling_rate = ?raw.sampling_rate,
            "Analysis job created"
        );

        let request = AnalysisRequest {
            input_path: job.input_location.clone(),
            kind: raw.kind,
            output_path: self.store.staging_path(JobKind::Analysis, &job.id),
            sampling_rate: raw.sampling_rate,
        };
        let outcome = self.engine.analyze(&request).await;

        match settle_run::<InvocationError>(&self.store, JobKind::Analysis, &job.id, outcome).await {
            Ok((result_location, output)) => {
                job.complete(result_location, output.stdout);
                info!(job_id = %job.id, kind = %job.kind, "Analysis job complete");
                Ok(job)
            }
            Err(e) => {
                job.fail();
                log_failure(&job.id, &e);
                Err(e)
            }
        }
    }
}

fn log_failure(id: &JobId, err: &InvocationError) {
    match err {
        InvocationError::Engine(failure) => error!(
            job_id = %id,
            error = %failure,
            diagnostics = failure.diagnostics().unwrap_or(""),
            "Analysis job failed"
        ),
        other => error!(job_id = %id, error = %other, "Analysis job failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalKind;
    use crate::services::engine::EngineOutput;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    /// Engine that must never be reached
    struct UnreachableEngine;

    #[async_trait]
    impl SignalEngine for UnreachableEngine {
        async fn analyze(&self, _request: &AnalysisRequest) -> Result<EngineOutput, EngineFailure> {
            panic!("engine invoked for an invalid submission");
        }

        async fn correlate(&self, _descriptor_path: &Path) -> Result<EngineOutput, EngineFailure> {
            panic!("engine invoked for an invalid submission");
        }
    }

    async fn invoker() -> (TempDir, AnalysisInvoker) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(JobStore::open(temp_dir.path()).await.unwrap());
        let invoker = AnalysisInvoker::new(
            store,
            Arc::new(UnreachableEngine),
            vec!["csv".to_string(), "edf".to_string()],
        );
        (temp_dir, invoker)
    }

    #[test]
    fn test_parse_sampling_rate() {
        assert_eq!(parse_sampling_rate("250"), Ok(250));
        assert_eq!(parse_sampling_rate(" 1000 "), Ok(1000));
        assert!(parse_sampling_rate("0").is_err());
        assert!(parse_sampling_rate("-5").is_err());
        assert!(parse_sampling_rate("fast").is_err());
    }

    #[tokio::test]
    async fn test_empty_payload_rejected_before_engine() {
        let (temp_dir, invoker) = invoker().await;
        let raw = RawSignalInput::new(Vec::new(), SignalKind::Ecg, "empty.csv");

        let err = invoker.submit(raw).await.unwrap_err();
        assert!(matches!(
            err,
            InvocationError::Validation(ValidationError::EmptyPayload)
        ));
        let uploads = std::fs::read_dir(temp_dir.path().join("uploads")).unwrap();
        assert_eq!(uploads.count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_extension_rejected() {
        let (_temp_dir, invoker) = invoker().await;
        let raw = RawSignalInput::new(b"data".to_vec(), SignalKind::Eeg, "trace.wav");

        match invoker.submit(raw).await {
            Err(InvocationError::Validation(ValidationError::UnsupportedFormat { extension, .. })) => {
                assert_eq!(extension, "wav")
            }
            other => panic!("expected unsupported format, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_extension_rejected() {
        let (_temp_dir, invoker) = invoker().await;
        let raw = RawSignalInput::new(b"data".to_vec(), SignalKind::Eeg, "recording");

        assert!(matches!(
            invoker.validate(&raw),
            Err(ValidationError::UnsupportedFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_accepts_uppercase_extension() {
        let (_temp_dir, invoker) = invoker().await;
        let raw = RawSignalInput::new(b"data".to_vec(), SignalKind::Eeg, "night.EDF");
        assert_eq!(invoker.validate(&raw), Ok("edf".to_string()));
    }
}
