//! Correlation job coordination
//!
//! A correlation job references two existing analysis results. Both parents
//! are checked before any work starts; the check is not held for the rest of
//! the run, so a parent removed mid-run surfaces as an engine failure.

use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use super::engine::{settle_run, EngineFailure, SignalEngine};
use super::job_store::{JobStore, StoreError};
use crate::models::{CorrelationDescriptor, CorrelationJob, JobId, JobKind};

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("analysis result not found for job {0}")]
    MissingDependency(JobId),

    #[error(transparent)]
    Engine(#[from] EngineFailure),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct CorrelationCoordinator {
    store: Arc<JobStore>,
    engine: Arc<dyn SignalEngine>,
}

impl CorrelationCoordinator {
    pub fn new(store: Arc<JobStore>, engine: Arc<dyn SignalEngine>) -> Self {
        Self { store, engine }
    }

    /// Correlate an ECG analysis with an EEG analysis.
    ///
    /// The ECG parent is checked first, so when both are missing the error
    /// names the ECG identifier. Signal kinds of the parents are not checked.
    pub async fn correlate(&self, ecg_id: &JobId, eeg_id: &JobId) -> Result<CorrelationJob, CorrelationError> {
        for parent in [ecg_id, eeg_id] {
            if !self.store.exists(JobKind::Analysis, parent).await {
                warn!(parent = %parent, "Correlation references missing analysis");
                return Err(CorrelationError::MissingDependency(parent.clone()));
            }
        }

        let id = JobId::generate();
        let descriptor = CorrelationDescriptor {
            ecg_analysis_id: ecg_id.clone(),
            eeg_analysis_id: eeg_id.clone(),
            output_path: self.store.staging_path(JobKind::Correlation, &id),
        };
        let descriptor_location = self.store.write_descriptor(&id, &descriptor).await?;
        let mut job = CorrelationJob::new(id, ecg_id.clone(), eeg_id.clone(), descriptor_location);

        info!(
            job_id = %job.id,
            ecg = %job.ecg_job_id,
            eeg = %job.eeg_job_id,
            "Correlation job created"
        );

        let outcome = self.engine.correlate(&job.descriptor_location).await;

        match settle_run::<CorrelationError>(&self.store, JobKind::Correlation, &job.id, outcome).await {
            Ok((result_location, _output)) => {
                job.complete(result_location);
                info!(job_id = %job.id, "Correlation job complete");
                Ok(job)
            }
            Err(e) => {
                job.fail();
                match &e {
                    CorrelationError::Engine(failure) => error!(
                        job_id = %job.id,
                        error = %failure,
                        diagnostics = failure.diagnostics().unwrap_or(""),
                        "Correlation job failed"
                    ),
                    other => error!(job_id = %job.id, error = %other, "Correlation job failed"),
                }
                Err(e)
            }
        }
    }
}
