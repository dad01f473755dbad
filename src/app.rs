use crate::{
    classifier::{Classifier, ClassifierError},
    config::Config,
    labels::LabelSet,
    ort_service::OrtClassifier,
    prediction::{LabelMismatchError, PredictionService},
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};
use std::sync::Arc;
use thiserror::Error;

/// Failures that keep the process from serving at all.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to load classifier: {0}")]
    Model(#[from] ClassifierError),
    #[error("label configuration does not match classifier: {0}")]
    Labels(#[from] LabelMismatchError),
    #[error("failed to initialize metrics: {0}")]
    Metrics(anyhow::Error),
    #[error("server error: {0}")]
    Server(anyhow::Error),
}

pub fn build_prediction_service(config: &Config) -> Result<PredictionService, StartupError> {
    let model = &config.model;

    let size_classifier: Arc<dyn Classifier> = Arc::new(OrtClassifier::new(
        "size",
        &model.get_size_model_path(),
        model.num_instances,
        model.intra_threads,
    )?);
    let brand_classifier: Arc<dyn Classifier> = Arc::new(OrtClassifier::new(
        "brand",
        &model.get_brand_model_path(),
        model.num_instances,
        model.intra_threads,
    )?);

    let service = PredictionService::new(
        size_classifier,
        LabelSet::new("size", config.labels.size.clone()),
        brand_classifier,
        LabelSet::new("brand", config.labels.brand.clone()),
        model.confidence_threshold,
    )?;

    Ok(service)
}

pub async fn start_app(config: Config) -> Result<(), StartupError> {
    let prediction_service = match build_prediction_service(&config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("Failed to initialize prediction service: {}", e);
            return Err(e);
        }
    };

    let metrics = Arc::new(Metrics::new().map_err(StartupError::Metrics)?);

    let state = SharedState {
        prediction_service,
        metrics,
    };

    let server = HttpServer::new(state, &config.server)
        .await
        .map_err(StartupError::Server)?;
    server.run().await.map_err(StartupError::Server)?;

    tracing::info!("Prediction service stopped");
    Ok(())
}
