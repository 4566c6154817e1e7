//! HTTP API handlers for biosync-jobs

pub mod analysis;
pub mod correlation;
pub mod health;

pub use analysis::analysis_routes;
pub use correlation::correlation_routes;
pub use health::health_routes;
