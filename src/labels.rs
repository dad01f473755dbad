use serde::Serialize;
use thiserror::Error;

pub const SIZE_CLASSES: [&str; 10] = [
    "bottle_1250ml",
    "bottle_2000ml",
    "bottle_330ml",
    "bottle_345ml",
    "bottle_350ml",
    "bottle_380ml",
    "bottle_450ml",
    "bottle_500ml",
    "bottle_590ml",
    "can",
];

pub const BRAND_CLASSES: [&str; 7] = [
    "7-11", "aura", "coke", "fanta", "gatorade", "mirinda", "oishi",
];

pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug, PartialEq)]
pub enum LabelError {
    #[error("{set} classifier returned an empty probability vector")]
    EmptyOutput { set: String },
    #[error("{set} classifier predicted index {index} but only {len} labels are configured")]
    IndexOutOfRange {
        set: String,
        index: usize,
        len: usize,
    },
}

/// Ordered class names whose positions match a classifier's output positions.
#[derive(Debug, Clone)]
pub struct LabelSet {
    name: String,
    labels: Vec<String>,
}

impl LabelSet {
    pub fn new(name: &str, labels: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            labels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of classes, which must equal the classifier's output width.
    pub fn width(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Maps a probability vector to a label, or `"unknown"` unless the top
    /// probability reaches `threshold`. A NaN anywhere in the vector is never
    /// a confident prediction.
    pub fn decide(&self, probabilities: &[f32], threshold: f32) -> Result<String, LabelError> {
        let (index, confidence) =
            argmax(probabilities).ok_or_else(|| LabelError::EmptyOutput {
                set: self.name.clone(),
            })?;

        let confident = confidence >= threshold;
        if !confident {
            return Ok(UNKNOWN_LABEL.to_string());
        }

        self.labels
            .get(index)
            .cloned()
            .ok_or_else(|| LabelError::IndexOutOfRange {
                set: self.name.clone(),
                index,
                len: self.labels.len(),
            })
    }
}

/// Index and value of the largest element. Ties keep the lowest index.
/// NaN propagates: the first NaN wins over every number.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    if let Some(index) = values.iter().position(|v| v.is_nan()) {
        return Some((index, f32::NAN));
    }

    values
        .iter()
        .copied()
        .enumerate()
        .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub size: String,
    pub brand: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size_set() -> LabelSet {
        LabelSet::new("size", SIZE_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_label_set_sizes() {
        assert_eq!(SIZE_CLASSES.len(), 10);
        assert_eq!(BRAND_CLASSES.len(), 7);
    }

    #[test]
    fn test_argmax_ties_resolve_to_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.5; 7]), Some((0, 0.5)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_propagates_nan() {
        let (index, value) = argmax(&[0.1, 0.9, f32::NAN, f32::NAN]).unwrap();
        assert_eq!(index, 2);
        assert!(value.is_nan());
    }

    #[test]
    fn test_decide_leading_nan_is_unknown() {
        let mut probs = vec![0.0; 10];
        probs[0] = f32::NAN;
        assert_eq!(size_set().decide(&probs, 0.8).unwrap(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_decide_trailing_nan_is_unknown() {
        let mut probs = vec![0.0; 10];
        probs[3] = 0.9;
        probs[5] = f32::NAN;
        assert_eq!(size_set().decide(&probs, 0.8).unwrap(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_decide_above_threshold() {
        let mut probs = vec![0.0; 10];
        probs[9] = 0.9;
        assert_eq!(size_set().decide(&probs, 0.8).unwrap(), "can");
    }

    #[test]
    fn test_decide_at_threshold_is_accepted() {
        let mut probs = vec![0.0; 10];
        probs[3] = 0.8;
        assert_eq!(size_set().decide(&probs, 0.8).unwrap(), "bottle_345ml");
    }

    #[test]
    fn test_decide_below_threshold_is_unknown() {
        let mut probs = vec![0.05; 10];
        probs[2] = 0.79;
        assert_eq!(size_set().decide(&probs, 0.8).unwrap(), UNKNOWN_LABEL);
    }

    #[test]
    fn test_decide_matches_rule_over_many_vectors() {
        let set = size_set();
        for step in 0..=20 {
            let top = step as f32 / 20.0;
            for position in 0..10 {
                let mut probs = vec![0.0; 10];
                probs[position] = top;
                let label = set.decide(&probs, 0.8).unwrap();
                if top >= 0.8 {
                    assert_eq!(label, SIZE_CLASSES[position]);
                } else {
                    assert_eq!(label, UNKNOWN_LABEL);
                }
            }
        }
    }

    #[test]
    fn test_decide_out_of_range_fails() {
        let set = LabelSet::new("brand", vec!["coke".to_string()]);
        let err = set.decide(&[0.1, 0.9], 0.8).unwrap_err();
        assert_eq!(
            err,
            LabelError::IndexOutOfRange {
                set: "brand".to_string(),
                index: 1,
                len: 1
            }
        );
    }

    #[test]
    fn test_decide_empty_output_fails() {
        assert!(matches!(
            size_set().decide(&[], 0.8),
            Err(LabelError::EmptyOutput { .. })
        ));
    }
}
