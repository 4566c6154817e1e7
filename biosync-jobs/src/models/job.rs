//! Job records and their lifecycle
//!
//! Both job types move `pending → complete` on engine success or
//! `pending → failed` on any failure. A result location is only ever set on
//! the transition to `complete`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::JobId;

/// Declared physiological signal type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Ecg,
    Eeg,
}

impl SignalKind {
    /// Wire and file-name form (`ecg` / `eeg`)
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Ecg => "ecg",
            SignalKind::Eeg => "eeg",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ecg" => Ok(SignalKind::Ecg),
            "eeg" => Ok(SignalKind::Eeg),
            _ => Err(s.to_string()),
        }
    }
}

/// Which family of result a job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Analysis,
    Correlation,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Analysis => f.write_str("analysis"),
            JobKind::Correlation => f.write_str("correlation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Complete,
    Failed,
}

/// Single-signal analysis job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: JobId,
    pub kind: SignalKind,
    pub status: JobStatus,
    /// Persisted raw upload, kept even when the engine fails
    pub input_location: PathBuf,
    /// Set only once the job is complete
    pub result_location: Option<PathBuf>,
    /// Engine stdout from a successful run
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub fn new(id: JobId, kind: SignalKind, input_location: PathBuf) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            input_location,
            result_location: None,
            details: None,
            created_at: biosync_common::time::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, result_location: PathBuf, details: String) {
        self.status = JobStatus::Complete;
        self.result_location = Some(result_location);
        self.details = Some(details);
        self.completed_at = Some(biosync_common::time::now());
    }

    pub fn fail(&mut self) {
        self.status = JobStatus::Failed;
        self.result_location = None;
        self.completed_at = Some(biosync_common::time::now());
    }
}

/// Cross-signal correlation job over one ECG and one EEG analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationJob {
    pub id: JobId,
    pub ecg_job_id: JobId,
    pub eeg_job_id: JobId,
    pub status: JobStatus,
    pub descriptor_location: PathBuf,
    pub result_location: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CorrelationJob {
    pub fn new(id: JobId, ecg_job_id: JobId, eeg_job_id: JobId, descriptor_location: PathBuf) -> Self {
        Self {
            id,
            ecg_job_id,
            eeg_job_id,
            status: JobStatus::Pending,
            descriptor_location,
            result_location: None,
            created_at: biosync_common::time::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, result_location: PathBuf) {
        self.status = JobStatus::Complete;
        self.result_location = Some(result_location);
        self.completed_at = Some(biosync_common::time::now());
    }

    pub fn fail(&mut self) {
        self.status = JobStatus::Failed;
        self.result_location = None;
        self.completed_at = Some(biosync_common::time::now());
    }
}

/// File handed to the correlation engine. Field names are part of the engine
/// contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationDescriptor {
    pub ecg_analysis_id: JobId,
    pub eeg_analysis_id: JobId,
    pub output_path: PathBuf,
}

/// Uploaded signal awaiting analysis
#[derive(Debug, Clone)]
pub struct RawSignalInput {
    pub bytes: Vec<u8>,
    pub kind: SignalKind,
    /// Original client file name, used only for its extension
    pub filename: String,
    /// Overrides the engine's sampling-rate detection when set
    pub sampling_rate: Option<u32>,
}

impl RawSignalInput {
    pub fn new(bytes: Vec<u8>, kind: SignalKind, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            kind,
            filename: filename.into(),
            sampling_rate: None,
        }
    }

    pub fn with_sampling_rate(mut self, hz: u32) -> Self {
        self.sampling_rate = Some(hz);
        self
    }

    /// Lowercased extension of the original file name, if any
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_parse_is_case_insensitive() {
        assert_eq!("ECG".parse::<SignalKind>(), Ok(SignalKind::Ecg));
        assert_eq!(" eeg ".parse::<SignalKind>(), Ok(SignalKind::Eeg));
        assert_eq!("emg".parse::<SignalKind>(), Err("emg".to_string()));
    }

    #[test]
    fn test_analysis_job_lifecycle() {
        let mut job = AnalysisJob::new(JobId::generate(), SignalKind::Ecg, PathBuf::from("in.csv"));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result_location.is_none());

        job.complete(PathBuf::from("out.json"), "done".to_string());
        assert_eq!(job.status, JobStatus::Complete);
        assert_eq!(job.result_location, Some(PathBuf::from("out.json")));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_failed_job_has_no_result_location() {
        let mut job = CorrelationJob::new(
            JobId::generate(),
            JobId::generate(),
            JobId::generate(),
            PathBuf::from("descriptor.json"),
        );
        job.fail();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.result_location.is_none());
    }

    #[test]
    fn test_descriptor_field_names() {
        let descriptor = CorrelationDescriptor {
            ecg_analysis_id: JobId::parse("ecg-1").unwrap(),
            eeg_analysis_id: JobId::parse("eeg-1").unwrap(),
            output_path: PathBuf::from("/data/results/out.json"),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["ecgAnalysisId"], "ecg-1");
        assert_eq!(value["eegAnalysisId"], "eeg-1");
        assert_eq!(value["outputPath"], "/data/results/out.json");
    }

    #[test]
    fn test_extension_lowercased() {
        let raw = RawSignalInput::new(vec![1], SignalKind::Eeg, "Recording.EDF");
        assert_eq!(raw.extension(), Some("edf".to_string()));
        let bare = RawSignalInput::new(vec![1], SignalKind::Eeg, "README");
        assert_eq!(bare.extension(), None);
    }
}
