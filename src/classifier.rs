use ndarray::{ArrayView, Ix4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("failed to load model {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("failed to build tensor: {0}")]
    Tensor(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to extract tensor: {0}")]
    Extract(String),
    #[error("invalid tensor shape: {0}")]
    Shape(String),
}

/// A fixed-input image classifier returning one probability per class.
///
/// Implementations must be safe to call from several requests at once.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, ClassifierError>;
}
