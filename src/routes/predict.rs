use crate::{labels::Prediction, prediction::PredictionError, server::SharedState};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::instrument;

const ROUTE: &str = "/predict";
const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error("No file part")]
    NoFilePart,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error("prediction task failed: {0}")]
    Task(#[from] JoinError),
}

impl PredictImageError {
    fn status(&self) -> StatusCode {
        match self {
            PredictImageError::NoFilePart | PredictImageError::NoSelectedFile => {
                StatusCode::BAD_REQUEST
            }
            PredictImageError::Multipart(err) => err.status(),
            PredictImageError::Prediction(_) | PredictImageError::Task(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn outcome(&self) -> &'static str {
        if self.status().is_client_error() {
            "rejected"
        } else {
            "failed"
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, PredictImageError> {
    state.metrics.record_request(ROUTE);
    let start = Instant::now();

    let result = run_prediction(&state, multipart).await;

    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, ROUTE);

    match &result {
        Ok(prediction) => {
            state.metrics.record_outcome("success");
            tracing::info!(size = %prediction.size, brand = %prediction.brand, "Prediction served");
        }
        Err(err) if err.status().is_server_error() => {
            state.metrics.record_outcome(err.outcome());
            tracing::error!("Prediction failed: {}", err);
        }
        Err(err) => {
            state.metrics.record_outcome(err.outcome());
            tracing::warn!("Prediction request rejected: {}", err);
        }
    }

    result.map(Json)
}

async fn run_prediction(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Prediction, PredictImageError> {
    // A body that is not multipart carries no file part at all.
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("Multipart rejected: {}", rejection);
        PredictImageError::NoFilePart
    })?;

    let image_data = read_upload(&mut multipart).await?;
    tracing::debug!("Received upload of {} bytes", image_data.len());

    let prediction_service = state.prediction_service.clone();
    let prediction =
        tokio::task::spawn_blocking(move || prediction_service.predict(&image_data)).await??;

    Ok(prediction)
}

/// Returns the bytes of the first `file` part that was sent as an upload.
/// Parts named `file` without a filename are plain form values and are skipped.
async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, PredictImageError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        match file_name.as_deref() {
            None => continue,
            Some("") => return Err(PredictImageError::NoSelectedFile),
            Some(_) => return Ok(field.bytes().await?),
        }
    }

    Err(PredictImageError::NoFilePart)
}
