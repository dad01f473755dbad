use crate::classifier::{Classifier, ClassifierError};
use ndarray::{ArrayView, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// ONNX Runtime classifier backed by a round-robin pool of sessions.
///
/// `Session::run` needs exclusive access, so each session sits behind its
/// own mutex and concurrent requests spread across the pool.
#[derive(Clone)]
pub struct OrtClassifier {
    name: String,
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
}

impl OrtClassifier {
    pub fn new(
        name: &str,
        model_path: &Path,
        num_instances: usize,
        intra_threads: usize,
    ) -> Result<Self, ClassifierError> {
        let load_error = |e: ort::Error| ClassifierError::Load {
            path: model_path.display().to_string(),
            reason: e.to_string(),
        };

        let sessions = (0..num_instances.max(1))
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .with_intra_threads(intra_threads)?
                    .commit_from_file(model_path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(load_error)?;

        tracing::info!(
            classifier = name,
            path = %model_path.display(),
            "Created {} ONNX sessions",
            sessions.len()
        );

        Ok(Self {
            name: name.to_string(),
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl Classifier for OrtClassifier {
    fn classify(&self, input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ClassifierError::Poisoned(e.to_string()))?;

        tracing::debug!(classifier = %self.name, "Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ClassifierError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Extract(e.to_string()))?;

        let array = ndarray::ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| ClassifierError::Shape(e.to_string()))?;

        if array.ndim() == 0 || array.len_of(Axis(0)) != 1 {
            return Err(ClassifierError::Shape(format!(
                "expected a batch of one, got {:?}",
                array.shape()
            )));
        }

        Ok(array.index_axis(Axis(0), 0).iter().copied().collect())
    }
}
