//! Identity classifier over face embeddings.
//!
//! The classifier is a pre-trained artifact: a multinomial linear model
//! serialized as JSON. Only inference is supported.

use crate::types::{ClassProbabilities, Embedding, EnrolledLabel, EMBEDDING_DIM};
use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier artifact not found: {0}")]
    ArtifactNotFound(String),
    #[error("failed to read classifier artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse classifier artifact: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid classifier artifact: {0}")]
    InvalidArtifact(String),
    #[error("dimension mismatch: classifier expects {expected}-wide embeddings, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One embedding's classification: the argmax label and the full distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: EnrolledLabel,
    pub probabilities: ClassProbabilities,
}

/// Maps embeddings to probability distributions over enrolled identities.
pub trait IdentityClassifier: Send + Sync {
    /// Class labels, in the order probabilities are reported.
    fn classes(&self) -> &[EnrolledLabel];

    /// Per-class probabilities for each embedding.
    fn predict_proba(&self, embeddings: &[Embedding]) -> Result<Vec<ClassProbabilities>, ClassifierError>;

    /// Best-guess label for each embedding. Ties resolve to the lowest class index.
    fn predict(&self, embeddings: &[Embedding]) -> Result<Vec<EnrolledLabel>, ClassifierError> {
        Ok(self
            .classify(embeddings)?
            .into_iter()
            .map(|c| c.label)
            .collect())
    }

    /// Probabilities and argmax label for each embedding, from one batch call.
    fn classify(&self, embeddings: &[Embedding]) -> Result<Vec<Classification>, ClassifierError> {
        let classes = self.classes();
        self.predict_proba(embeddings)?
            .into_iter()
            .map(|probabilities| {
                let label = probabilities
                    .argmax()
                    .and_then(|i| classes.get(i).copied())
                    .ok_or_else(|| {
                        ClassifierError::InvalidArtifact(format!(
                            "probability vector of length {} does not match {} classes",
                            probabilities.values.len(),
                            classes.len()
                        ))
                    })?;
                Ok(Classification { label, probabilities })
            })
            .collect()
    }
}

/// On-disk layout of `classifier.json`.
#[derive(Debug, Deserialize)]
struct LinearArtifact {
    classes: Vec<u32>,
    coef: Vec<Vec<f32>>,
    intercept: Vec<f32>,
}

/// Softmax over an affine map of the embedding (multinomial logistic regression).
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    classes: Vec<EnrolledLabel>,
    /// (num_classes, embedding_dim)
    coef: Array2<f32>,
    intercept: Array1<f32>,
}

impl LinearClassifier {
    /// Build from weight rows, validating that the shapes agree.
    pub fn new(
        classes: Vec<EnrolledLabel>,
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    ) -> Result<Self, ClassifierError> {
        if classes.is_empty() {
            return Err(ClassifierError::InvalidArtifact("no classes".into()));
        }
        if coef.len() != classes.len() || intercept.len() != classes.len() {
            return Err(ClassifierError::InvalidArtifact(format!(
                "{} classes but {} weight rows and {} intercepts",
                classes.len(),
                coef.len(),
                intercept.len()
            )));
        }
        let dim = coef[0].len();
        if dim == 0 || coef.iter().any(|row| row.len() != dim) {
            return Err(ClassifierError::InvalidArtifact(
                "weight rows must be non-empty and of equal width".into(),
            ));
        }

        let flat: Vec<f32> = coef.into_iter().flatten().collect();
        let coef = Array2::from_shape_vec((classes.len(), dim), flat)
            .map_err(|e| ClassifierError::InvalidArtifact(e.to_string()))?;

        Ok(Self {
            classes,
            coef,
            intercept: Array1::from_vec(intercept),
        })
    }

    /// Load a `classifier.json` artifact. The weights must match the
    /// embedder's output width.
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        if !path.exists() {
            return Err(ClassifierError::ArtifactNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let artifact: LinearArtifact = serde_json::from_str(&text)?;
        let classifier = Self::new(
            artifact.classes.into_iter().map(EnrolledLabel).collect(),
            artifact.coef,
            artifact.intercept,
        )?;
        if classifier.input_dim() != EMBEDDING_DIM {
            return Err(ClassifierError::DimensionMismatch {
                expected: EMBEDDING_DIM,
                actual: classifier.input_dim(),
            });
        }

        tracing::info!(
            path = %path.display(),
            classes = classifier.classes.len(),
            dim = classifier.input_dim(),
            "loaded identity classifier"
        );

        Ok(classifier)
    }

    /// Embedding width the weights were trained on.
    pub fn input_dim(&self) -> usize {
        self.coef.ncols()
    }
}

impl IdentityClassifier for LinearClassifier {
    fn classes(&self) -> &[EnrolledLabel] {
        &self.classes
    }

    fn predict_proba(&self, embeddings: &[Embedding]) -> Result<Vec<ClassProbabilities>, ClassifierError> {
        embeddings
            .iter()
            .map(|embedding| {
                if embedding.dim() != self.input_dim() {
                    return Err(ClassifierError::DimensionMismatch {
                        expected: self.input_dim(),
                        actual: embedding.dim(),
                    });
                }
                let logits = self.coef.dot(&ArrayView1::from(&embedding.values[..])) + &self.intercept;
                Ok(ClassProbabilities {
                    values: softmax(&logits.to_vec()),
                })
            })
            .collect()
    }
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.iter().map(|e| e / sum).collect()
    } else {
        exps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn embedding(values: Vec<f32>) -> Embedding {
        Embedding { values }
    }

    fn two_class() -> LinearClassifier {
        LinearClassifier::new(
            vec![EnrolledLabel(0), EnrolledLabel(1)],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![0.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_predict_proba_and_predict() {
        let clf = two_class();
        let batch = vec![embedding(vec![5.0, 0.0]), embedding(vec![0.0, 5.0])];
        let probs = clf.predict_proba(&batch).unwrap();
        assert_eq!(probs.len(), 2);
        assert!(probs[0].values[0] > 0.99);
        assert_eq!(clf.predict(&batch).unwrap(), vec![EnrolledLabel(0), EnrolledLabel(1)]);
    }

    #[test]
    fn test_predict_tie_picks_lowest_index() {
        let clf = two_class();
        let labels = clf.predict(&[embedding(vec![1.0, 1.0])]).unwrap();
        assert_eq!(labels, vec![EnrolledLabel(0)]);
    }

    #[test]
    fn test_classify_maps_through_class_codes() {
        let clf = LinearClassifier::new(
            vec![EnrolledLabel(7), EnrolledLabel(3)],
            vec![vec![0.0], vec![1.0]],
            vec![0.0, 0.0],
        )
        .unwrap();
        let out = clf.classify(&[embedding(vec![4.0])]).unwrap();
        assert_eq!(out[0].label, EnrolledLabel(3));
    }

    #[test]
    fn test_dimension_mismatch() {
        let clf = two_class();
        let err = clf.predict_proba(&[embedding(vec![1.0, 2.0, 3.0])]).unwrap_err();
        assert!(matches!(err, ClassifierError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let err = LinearClassifier::new(
            vec![EnrolledLabel(0), EnrolledLabel(1)],
            vec![vec![1.0, 0.0], vec![1.0]],
            vec![0.0, 0.0],
        )
        .unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidArtifact(_)));
    }

    #[test]
    fn test_new_rejects_count_mismatch() {
        let err = LinearClassifier::new(vec![EnrolledLabel(0)], vec![vec![1.0], vec![2.0]], vec![0.0])
            .unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidArtifact(_)));
    }

    #[test]
    fn test_load_artifact() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let artifact = serde_json::json!({
            "classes": [0, 1, 2],
            "coef": [
                vec![0.01f32; EMBEDDING_DIM],
                vec![-0.01f32; EMBEDDING_DIM],
                vec![0.0f32; EMBEDDING_DIM],
            ],
            "intercept": [0.0, 0.0, -1.0],
        });
        write!(file, "{artifact}").unwrap();
        let clf = LinearClassifier::load(file.path()).unwrap();
        assert_eq!(clf.classes().len(), 3);
        assert_eq!(clf.input_dim(), EMBEDDING_DIM);

        let probs = clf.predict_proba(&[embedding(vec![1.0; EMBEDDING_DIM])]).unwrap();
        assert_eq!(probs[0].argmax(), Some(0));
    }

    #[test]
    fn test_load_rejects_wrong_width() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"classes": [0, 1], "coef": [[1.0, 0.0], [0.0, 1.0]], "intercept": [0.0, 0.0]}}"#
        )
        .unwrap();
        let err = LinearClassifier::load(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::DimensionMismatch { expected: EMBEDDING_DIM, actual: 2 }
        ));
    }

    #[test]
    fn test_load_missing_artifact() {
        let err = LinearClassifier::load(Path::new("/nonexistent/classifier.json")).unwrap_err();
        assert!(matches!(err, ClassifierError::ArtifactNotFound(_)));
    }

    #[test]
    fn test_load_malformed_artifact() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = LinearClassifier::load(file.path()).unwrap_err();
        assert!(matches!(err, ClassifierError::Parse(_)));
    }
}
