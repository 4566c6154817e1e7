//! Data models for biosync-jobs

pub mod identifier;
pub mod job;

pub use identifier::{IdentifierError, JobId};
pub use job::{
    AnalysisJob, CorrelationDescriptor, CorrelationJob, JobKind, JobStatus, RawSignalInput,
    SignalKind,
};

/// Schema-free engine result after sanitization
pub type ResultPayload = serde_json::Value;
