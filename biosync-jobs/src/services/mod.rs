//! Job orchestration services
//!
//! - [`job_store`]: flat-file persistence for inputs, descriptors and results
//! - [`engine`]: the external engine seam and its subprocess implementation
//! - [`analysis_invoker`] / [`correlation_coordinator`]: job execution
//! - [`result_parser`] / [`result_gateway`]: NaN-tolerant result retrieval

pub mod analysis_invoker;
pub mod correlation_coordinator;
pub mod engine;
pub mod job_store;
pub mod result_gateway;
pub mod result_parser;

pub use analysis_invoker::{parse_sampling_rate, AnalysisInvoker, InvocationError, ValidationError};
pub use correlation_coordinator::{CorrelationCoordinator, CorrelationError};
pub use engine::{AnalysisRequest, EngineFailure, EngineOutput, ProcessEngine, SignalEngine};
pub use job_store::{JobStore, StoreError};
pub use result_gateway::{FetchError, ResultGateway};
pub use result_parser::ParseError;
