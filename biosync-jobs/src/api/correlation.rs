//! Correlation handlers
//!
//! POST /api/correlation, GET /api/correlation/:id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    models::{JobId, JobKind, ResultPayload},
    AppState,
};

/// Correlation request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationRequest {
    #[serde(default)]
    pub ecg_analysis_id: Option<String>,
    #[serde(default)]
    pub eeg_analysis_id: Option<String>,
}

/// Correlation response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationResponse {
    pub success: bool,
    pub correlation_id: JobId,
    pub message: String,
}

/// POST /api/correlation
///
/// Runs the correlation before responding.
pub async fn create_correlation(
    State(state): State<AppState>,
    payload: Result<Json<CorrelationRequest>, JsonRejection>,
) -> ApiResult<Json<CorrelationResponse>> {
    let Json(request) =
        payload.map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e.body_text())))?;
    let (Some(ecg), Some(eeg)) = (request.ecg_analysis_id, request.eeg_analysis_id) else {
        return Err(ApiError::BadRequest(
            "Both ECG and EEG analysis IDs are required".to_string(),
        ));
    };
    let ecg_id = JobId::parse(&ecg)?;
    let eeg_id = JobId::parse(&eeg)?;

    let job = match state.coordinator.correlate(&ecg_id, &eeg_id).await {
        Ok(job) => job,
        Err(e) => {
            state.record_failure("correlation", &e).await;
            return Err(e.into());
        }
    };

    Ok(Json(CorrelationResponse {
        success: true,
        correlation_id: job.id,
        message: "Correlation analysis completed successfully".to_string(),
    }))
}

/// GET /api/correlation/:id
pub async fn get_correlation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultPayload>> {
    let payload = state.gateway.fetch(JobKind::Correlation, &id).await?;
    Ok(Json(payload))
}

/// Build correlation routes
pub fn correlation_routes() -> Router<AppState> {
    Router::new()
        .route("/api/correlation", post(create_correlation))
        .route("/api/correlation/:id", get(get_correlation))
}
