//! Recognition engine: detector → crop/resize → embedder → classifier →
//! threshold → label decoding → annotation.

use crate::annotate::{self, Annotation};
use crate::classifier::{ClassifierError, IdentityClassifier, LinearClassifier};
use crate::detector::{DetectorError, FaceDetector, ScrfdDetector};
use crate::embedder::{Embedder, EmbedderError, FaceNetEmbedder, FACE_INPUT_SIZE};
use crate::imaging::{self, ImageFormatError};
use crate::labels::{LabelCodec, LabelError};
use crate::types::{BoundingBox, FinalLabel, NO_CONFIDENT_FACE, NO_FACE_DETECTED};
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Detection confidence a face must exceed to be embedded at all.
pub const DETECTION_CONFIDENCE_GATE: f32 = 0.95;
/// Minimum max-class probability for a face to be named. Probabilities equal
/// to this value are accepted.
pub const CLASSIFICATION_THRESHOLD: f32 = 0.80;

/// Fatal errors while assembling the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("labels: {0}")]
    Labels(#[from] LabelError),
    #[error("classifier class {0} has no enrolled name")]
    UndecodableClass(u32),
}

/// Errors from a single recognition call.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image: {0}")]
    Image(#[from] ImageFormatError),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("label decoding: {0}")]
    Label(#[from] LabelError),
    #[error("{stage} returned {actual} results for {expected} faces")]
    BatchMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Paths of the four artifacts the engine is built from.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub embedder: PathBuf,
    pub classifier: PathBuf,
    pub labels: PathBuf,
}

/// One accepted face and how it was labelled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    /// Box after origin clamping, as cropped and drawn.
    pub bbox: BoundingBox,
    pub detection_confidence: f32,
    /// Largest class probability for this face.
    pub probability: f32,
    pub label: FinalLabel,
}

/// Outcome of recognizing one image.
#[derive(Debug, Clone)]
pub enum Recognition {
    /// The detector found nothing.
    NoFace,
    /// Faces were found but none passed [`DETECTION_CONFIDENCE_GATE`].
    NoConfidentFace,
    /// At least one face was accepted. `faces` is in detection order.
    Recognized { image: RgbImage, faces: Vec<FaceMatch> },
}

impl Recognition {
    /// Final labels in detection order; empty for the sentinel outcomes.
    pub fn labels(&self) -> Vec<FinalLabel> {
        match self {
            Recognition::Recognized { faces, .. } => faces.iter().map(|f| f.label.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Displayable sentinel for the empty outcomes.
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            Recognition::NoFace => Some(NO_FACE_DETECTED),
            Recognition::NoConfidentFace => Some(NO_CONFIDENT_FACE),
            Recognition::Recognized { .. } => None,
        }
    }

    pub fn annotated_image(&self) -> Option<&RgbImage> {
        match self {
            Recognition::Recognized { image, .. } => Some(image),
            _ => None,
        }
    }

    /// Display labels: the final labels, or the sentinel as the only element.
    pub fn display_labels(&self) -> Vec<String> {
        match self.sentinel() {
            Some(sentinel) => vec![sentinel.to_string()],
            None => self.labels().into_iter().map(String::from).collect(),
        }
    }

    pub fn summary(&self) -> RecognitionSummary {
        let (outcome, faces) = match self {
            Recognition::NoFace => ("no_face", Vec::new()),
            Recognition::NoConfidentFace => ("no_confident_face", Vec::new()),
            Recognition::Recognized { faces, .. } => ("recognized", faces.clone()),
        };
        RecognitionSummary {
            outcome,
            labels: self.display_labels(),
            faces,
        }
    }
}

/// Serializable view of a [`Recognition`], without the image.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionSummary {
    pub outcome: &'static str,
    pub labels: Vec<String>,
    pub faces: Vec<FaceMatch>,
}

/// Detector, embedder, classifier and label codec, built once and shared
/// read-only for the life of the process.
pub struct RecognitionEngine {
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn Embedder>,
    classifier: Box<dyn IdentityClassifier>,
    codec: LabelCodec,
}

impl RecognitionEngine {
    /// Assemble an engine, checking that every class the classifier can
    /// emit decodes to an enrolled name.
    pub fn new(
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn Embedder>,
        classifier: Box<dyn IdentityClassifier>,
        codec: LabelCodec,
    ) -> Result<Self, EngineError> {
        for &class in classifier.classes() {
            if codec.decode(class).is_err() {
                return Err(EngineError::UndecodableClass(class.0));
            }
        }
        Ok(Self {
            detector,
            embedder,
            classifier,
            codec,
        })
    }

    /// Load SCRFD, FaceNet, the classifier artifact and the enrollment labels.
    pub fn load(paths: &ModelPaths) -> Result<Self, EngineError> {
        let detector = ScrfdDetector::load(&paths.detector)?;
        let embedder = FaceNetEmbedder::load(&paths.embedder)?;
        let classifier = LinearClassifier::load(&paths.classifier)?;
        let codec = LabelCodec::load(&paths.labels)?;

        tracing::info!(
            identities = codec.len(),
            classes = classifier.classes().len(),
            "recognition engine ready"
        );

        Self::new(Box::new(detector), Box::new(embedder), Box::new(classifier), codec)
    }

    /// Recognize faces in any decoded image. Grayscale and RGBA are converted.
    pub fn recognize(&self, image: &DynamicImage) -> Result<Recognition, PipelineError> {
        let rgb = imaging::normalize(image)?;
        self.recognize_rgb(&rgb)
    }

    /// Decode an image file (e.g. an uploaded photo) and recognize it.
    pub fn recognize_file(&self, path: &Path) -> Result<Recognition, PipelineError> {
        let image = image::open(path)?;
        tracing::debug!(path = %path.display(), width = image.width(), height = image.height(), "decoded photo");
        self.recognize(&image)
    }

    /// Recognize faces in an RGB image. The input is never modified.
    pub fn recognize_rgb(&self, image: &RgbImage) -> Result<Recognition, PipelineError> {
        let candidates = self.detector.detect(image)?;
        if candidates.is_empty() {
            tracing::debug!("no face detected");
            return Ok(Recognition::NoFace);
        }

        let accepted: Vec<_> = candidates
            .iter()
            .filter(|c| c.confidence > DETECTION_CONFIDENCE_GATE)
            .collect();
        if accepted.is_empty() {
            tracing::debug!(detected = candidates.len(), "no face passed the detection gate");
            return Ok(Recognition::NoConfidentFace);
        }

        let boxes: Vec<BoundingBox> = accepted
            .iter()
            .map(|c| c.bbox.clamp_to(image.width(), image.height()))
            .collect();
        let crops: Vec<RgbImage> = boxes
            .iter()
            .map(|b| imaging::crop_face(image, b, FACE_INPUT_SIZE))
            .collect();

        let embeddings = self.embedder.embed_batch(&crops)?;
        check_batch("embedder", accepted.len(), embeddings.len())?;

        let classifications = self.classifier.classify(&embeddings)?;
        check_batch("classifier", accepted.len(), classifications.len())?;

        let mut faces = Vec::with_capacity(accepted.len());
        for ((candidate, bbox), classification) in accepted.iter().zip(boxes).zip(classifications) {
            let probability = classification.probabilities.max();
            let label = if probability < CLASSIFICATION_THRESHOLD {
                FinalLabel::Unknown
            } else {
                FinalLabel::Identity(self.codec.decode(classification.label)?.to_string())
            };
            faces.push(FaceMatch {
                bbox,
                detection_confidence: candidate.confidence,
                probability,
                label,
            });
        }

        tracing::debug!(
            faces = faces.len(),
            labels = ?faces.iter().map(|f| f.label.as_str()).collect::<Vec<_>>(),
            "recognition complete"
        );

        let captions: Vec<String> = faces
            .iter()
            .map(|f| format!("{} ({:.2})", f.label, f.probability))
            .collect();
        let annotations: Vec<Annotation<'_>> = faces
            .iter()
            .zip(&captions)
            .map(|(f, caption)| Annotation {
                bbox: f.bbox,
                caption: caption.as_str(),
            })
            .collect();
        let annotated = annotate::annotate(image, &annotations);

        Ok(Recognition::Recognized {
            image: annotated,
            faces,
        })
    }
}

fn check_batch(stage: &'static str, expected: usize, actual: usize) -> Result<(), PipelineError> {
    if expected != actual {
        return Err(PipelineError::BatchMismatch {
            stage,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted stand-ins for the model-backed components.

    use super::*;
    use crate::types::{ClassProbabilities, DetectionCandidate, Embedding, EnrolledLabel};
    use std::sync::{Arc, Mutex};

    pub struct ScriptedDetector(pub Vec<DetectionCandidate>);

    impl FaceDetector for ScriptedDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    pub struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectionCandidate>, DetectorError> {
            Err(DetectorError::InferenceFailed("scripted failure".into()))
        }
    }

    /// Encodes the crop's top-left red value as a one-dimensional embedding,
    /// so the classifier double can tell faces apart.
    pub struct RedEmbedder;

    impl Embedder for RedEmbedder {
        fn embed_batch(&self, faces: &[RgbImage]) -> Result<Vec<Embedding>, EmbedderError> {
            faces
                .iter()
                .map(|face| {
                    crate::embedder::check_face_shape(face)?;
                    Ok(Embedding {
                        values: vec![face.get_pixel(0, 0).0[0] as f32],
                    })
                })
                .collect()
        }
    }

    /// Returns scripted probability rows in order and records batch sizes.
    pub struct ScriptedClassifier {
        pub classes: Vec<EnrolledLabel>,
        pub rows: Vec<Vec<f32>>,
        pub calls: Arc<Mutex<Vec<usize>>>,
    }

    impl ScriptedClassifier {
        pub fn new(classes: u32, rows: Vec<Vec<f32>>) -> Self {
            Self {
                classes: (0..classes).map(EnrolledLabel).collect(),
                rows,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl IdentityClassifier for ScriptedClassifier {
        fn classes(&self) -> &[EnrolledLabel] {
            &self.classes
        }

        fn predict_proba(&self, embeddings: &[Embedding]) -> Result<Vec<ClassProbabilities>, ClassifierError> {
            self.calls.lock().unwrap().push(embeddings.len());
            Ok(self
                .rows
                .iter()
                .take(embeddings.len())
                .map(|values| ClassProbabilities { values: values.clone() })
                .collect())
        }
    }

    pub fn candidate(x: i32, y: i32, size: u32, confidence: f32) -> DetectionCandidate {
        DetectionCandidate {
            bbox: BoundingBox { x, y, width: size, height: size },
            confidence,
        }
    }

    pub fn engine(
        candidates: Vec<DetectionCandidate>,
        names: &[&str],
        rows: Vec<Vec<f32>>,
    ) -> RecognitionEngine {
        RecognitionEngine::new(
            Box::new(ScriptedDetector(candidates)),
            Box::new(RedEmbedder),
            Box::new(ScriptedClassifier::new(names.len() as u32, rows)),
            LabelCodec::fit(names.iter().copied()).unwrap(),
        )
        .unwrap()
    }
}
