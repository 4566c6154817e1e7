//! Signal upload and analysis result handlers
//!
//! POST /api/upload, GET /api/analysis/:id

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    models::{JobId, JobKind, RawSignalInput, ResultPayload, SignalKind},
    services::{parse_sampling_rate, ValidationError},
    AppState,
};

/// Upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub analysis_id: JobId,
    /// Engine stdout
    pub details: String,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Uploaded file exceeds the size limit".to_string())
    } else {
        ApiError::BadRequest(format!("Malformed upload: {}", err.body_text()))
    }
}

/// POST /api/upload
///
/// Multipart fields: `file` (the signal), `signalType` (`ecg` | `eeg`) and
/// optionally `samplingRate` in Hz. Runs the analysis before responding.
pub async fn upload_signal(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut signal_type: Option<String> = None;
    let mut sampling_rate: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            "signalType" => signal_type = Some(field.text().await.map_err(multipart_error)?),
            "samplingRate" => sampling_rate = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let (Some((filename, bytes)), Some(signal_type)) = (file, signal_type) else {
        return Err(ApiError::BadRequest(
            "File and signal type are required".to_string(),
        ));
    };
    let kind: SignalKind = signal_type
        .parse()
        .map_err(ValidationError::UnknownSignalKind)?;

    let mut raw = RawSignalInput::new(bytes, kind, filename);
    if let Some(rate) = sampling_rate.filter(|rate| !rate.trim().is_empty()) {
        raw = raw.with_sampling_rate(parse_sampling_rate(&rate)?);
    }

    let job = match state.invoker.submit(raw).await {
        Ok(job) => job,
        Err(e) => {
            state.record_failure("analysis", &e).await;
            return Err(e.into());
        }
    };

    Ok(Json(UploadResponse {
        success: true,
        message: format!("{} analysis completed successfully", kind.as_str().to_uppercase()),
        analysis_id: job.id,
        details: job.details.unwrap_or_default(),
    }))
}

/// GET /api/analysis/:id
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ResultPayload>> {
    let payload = state.gateway.fetch(JobKind::Analysis, &id).await?;
    Ok(Json(payload))
}

/// Build upload and analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/upload", post(upload_signal))
        .route("/api/analysis/:id", get(get_analysis))
}
