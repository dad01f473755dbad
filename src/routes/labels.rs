use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct ClassLabels {
    size: Vec<String>,
    brand: Vec<String>,
}

/// Label sets in classifier output order.
pub async fn labels(State(state): State<SharedState>) -> Json<ClassLabels> {
    let service = &state.prediction_service;
    Json(ClassLabels {
        size: service.size_labels().labels().to_vec(),
        brand: service.brand_labels().labels().to_vec(),
    })
}
