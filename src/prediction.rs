use crate::{
    classifier::{Classifier, ClassifierError},
    labels::{LabelError, LabelSet, Prediction},
    preprocess::{input_shape, transform_image, PreprocessError},
};
use ndarray::Array;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Label(#[from] LabelError),
}

#[derive(Error, Debug)]
pub enum LabelMismatchError {
    #[error("{set} classifier outputs {width} classes but {labels} labels are configured")]
    Width {
        set: String,
        width: usize,
        labels: usize,
    },
    #[error("probing {set} classifier failed: {source}")]
    Probe {
        set: String,
        source: ClassifierError,
    },
}

/// One classifier together with the labels for its output positions.
struct Head {
    classifier: Arc<dyn Classifier>,
    labels: LabelSet,
}

impl Head {
    fn check_width(&self) -> Result<(), LabelMismatchError> {
        let probe = Array::<f32, _>::zeros(input_shape());
        let output = self
            .classifier
            .classify(probe.view())
            .map_err(|source| LabelMismatchError::Probe {
                set: self.labels.name().to_string(),
                source,
            })?;

        if output.len() != self.labels.width() {
            return Err(LabelMismatchError::Width {
                set: self.labels.name().to_string(),
                width: output.len(),
                labels: self.labels.width(),
            });
        }
        Ok(())
    }
}

/// Runs the size and brand classifiers over uploaded images.
pub struct PredictionService {
    size: Head,
    brand: Head,
    threshold: f32,
}

impl PredictionService {
    /// Builds the service and checks that each classifier's output width
    /// matches its label set.
    pub fn new(
        size_classifier: Arc<dyn Classifier>,
        size_labels: LabelSet,
        brand_classifier: Arc<dyn Classifier>,
        brand_labels: LabelSet,
        threshold: f32,
    ) -> Result<Self, LabelMismatchError> {
        let size = Head {
            classifier: size_classifier,
            labels: size_labels,
        };
        let brand = Head {
            classifier: brand_classifier,
            labels: brand_labels,
        };

        size.check_width()?;
        brand.check_width()?;

        Ok(Self {
            size,
            brand,
            threshold,
        })
    }

    pub fn size_labels(&self) -> &LabelSet {
        &self.size.labels
    }

    pub fn brand_labels(&self) -> &LabelSet {
        &self.brand.labels
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub fn predict(&self, image_data: &[u8]) -> Result<Prediction, PredictionError> {
        let input = transform_image(image_data)?;

        let size_probabilities = self.size.classifier.classify(input.view())?;
        let brand_probabilities = self.brand.classifier.classify(input.view())?;

        let size = self.size.labels.decide(&size_probabilities, self.threshold)?;
        let brand = self
            .brand
            .labels
            .decide(&brand_probabilities, self.threshold)?;

        tracing::debug!(%size, %brand, "prediction complete");

        Ok(Prediction { size, brand })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::labels::{BRAND_CLASSES, SIZE_CLASSES, UNKNOWN_LABEL};
    use image::{DynamicImage, ImageBuffer, Rgb};
    use ndarray::{ArrayView, Ix4};
    use std::io::Cursor;

    /// Always returns the same probability vector.
    pub struct FixedClassifier {
        pub output: Vec<f32>,
    }

    impl Classifier for FixedClassifier {
        fn classify(&self, _input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
            Ok(self.output.clone())
        }
    }

    /// Scores each class by how close the mean red channel is to it.
    struct RedChannelClassifier {
        classes: usize,
    }

    impl Classifier for RedChannelClassifier {
        fn classify(&self, input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
            assert_eq!(input.shape(), &[1, 224, 224, 3]);
            let red = input.index_axis(ndarray::Axis(3), 0).mean().unwrap_or(0.0);
            let winner = ((red * (self.classes - 1) as f32).round() as usize).min(self.classes - 1);
            let mut output = vec![0.0; self.classes];
            output[winner] = 1.0;
            Ok(output)
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _input: ArrayView<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
            Err(ClassifierError::Inference("device lost".to_string()))
        }
    }

    pub fn size_labels() -> LabelSet {
        LabelSet::new("size", SIZE_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    pub fn brand_labels() -> LabelSet {
        LabelSet::new("brand", BRAND_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    pub fn size_output() -> Vec<f32> {
        let mut output = vec![0.005; 10];
        output[0] = 0.95;
        output
    }

    pub fn fixed_service(size: Vec<f32>, brand: Vec<f32>) -> PredictionService {
        PredictionService::new(
            Arc::new(FixedClassifier { output: size }),
            size_labels(),
            Arc::new(FixedClassifier { output: brand }),
            brand_labels(),
            0.8,
        )
        .unwrap()
    }

    pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = DynamicImage::from(ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(
            width,
            height,
            Rgb(color),
        ));
        let mut image_data = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    #[test]
    fn test_predict_size_known_brand_unknown() {
        let service = fixed_service(size_output(), vec![0.5; 7]);
        let prediction = service.predict(&png_bytes(224, 224, [0, 0, 0])).unwrap();

        assert_eq!(
            prediction,
            Prediction {
                size: "bottle_1250ml".to_string(),
                brand: UNKNOWN_LABEL.to_string(),
            }
        );
    }

    #[test]
    fn test_predict_is_idempotent() {
        let service = PredictionService::new(
            Arc::new(RedChannelClassifier { classes: 10 }),
            size_labels(),
            Arc::new(RedChannelClassifier { classes: 7 }),
            brand_labels(),
            0.8,
        )
        .unwrap();
        let image = png_bytes(320, 200, [255, 40, 40]);

        let first = service.predict(&image).unwrap();
        let second = service.predict(&image).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.size, "can");
        assert_eq!(first.brand, "oishi");
    }

    #[test]
    fn test_predict_rejects_undecodable_bytes() {
        let service = fixed_service(size_output(), vec![0.5; 7]);
        let err = service.predict(b"not an image").unwrap_err();

        assert!(matches!(err, PredictionError::Preprocess(_)));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_predict_surfaces_classifier_failure() {
        let service = PredictionService {
            size: Head {
                classifier: Arc::new(FailingClassifier),
                labels: size_labels(),
            },
            brand: Head {
                classifier: Arc::new(FixedClassifier {
                    output: vec![0.5; 7],
                }),
                labels: brand_labels(),
            },
            threshold: 0.8,
        };

        let err = service.predict(&png_bytes(8, 8, [1, 2, 3])).unwrap_err();
        assert_eq!(err.to_string(), "inference failed: device lost");
    }

    #[test]
    fn test_new_rejects_label_width_mismatch() {
        let result = PredictionService::new(
            Arc::new(FixedClassifier {
                output: vec![0.1; 9],
            }),
            size_labels(),
            Arc::new(FixedClassifier {
                output: vec![0.5; 7],
            }),
            brand_labels(),
            0.8,
        );

        match result {
            Err(LabelMismatchError::Width { set, width, labels }) => {
                assert_eq!(set, "size");
                assert_eq!(width, 9);
                assert_eq!(labels, 10);
            }
            _ => panic!("expected a width mismatch"),
        }
    }

    #[test]
    fn test_new_rejects_brand_width_mismatch() {
        let result = PredictionService::new(
            Arc::new(FixedClassifier {
                output: size_output(),
            }),
            size_labels(),
            Arc::new(FixedClassifier {
                output: vec![0.5; 8],
            }),
            brand_labels(),
            0.8,
        );

        assert!(matches!(
            result,
            Err(LabelMismatchError::Width { width: 8, labels: 7, .. })
        ));
    }

    #[test]
    fn test_new_reports_probe_failure() {
        let result = PredictionService::new(
            Arc::new(FailingClassifier),
            size_labels(),
            Arc::new(FixedClassifier {
                output: vec![0.5; 7],
            }),
            brand_labels(),
            0.8,
        );

        assert!(matches!(result, Err(LabelMismatchError::Probe { .. })));
    }
}
