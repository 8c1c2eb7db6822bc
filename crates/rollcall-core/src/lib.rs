//! rollcall-core: face recognition for attendance.
//!
//! SCRFD detection and FaceNet embeddings run on ONNX Runtime; a linear
//! classifier over the embeddings names enrolled identities.

pub mod annotate;
pub mod attendance;
pub mod classifier;
pub mod detector;
pub mod embedder;
pub mod imaging;
pub mod labels;
pub mod live;
pub mod pipeline;
pub mod types;

use std::path::PathBuf;

pub use attendance::{decide, full_name, AttendanceDecision, RejectReason};
pub use imaging::{ChannelOrder, PixelFrame};
pub use labels::LabelCodec;
pub use live::{FrameOutcome, LiveFrameProcessor, LiveState};
pub use pipeline::{
    EngineError, FaceMatch, ModelPaths, PipelineError, Recognition, RecognitionEngine,
    RecognitionSummary, CLASSIFICATION_THRESHOLD, DETECTION_CONFIDENCE_GATE,
};
pub use types::{BoundingBox, Embedding, EnrolledLabel, FinalLabel};

pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
pub const EMBEDDER_MODEL_FILE: &str = "facenet512.onnx";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const LABELS_FILE: &str = "labels.json";

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

impl ModelPaths {
    /// Standard artifact file names inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            embedder: dir.join(EMBEDDER_MODEL_FILE),
            classifier: dir.join(CLASSIFIER_FILE),
            labels: dir.join(LABELS_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths_in_dir() {
        let paths = ModelPaths::in_dir("/opt/models");
        assert_eq!(paths.detector, PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(paths.embedder, PathBuf::from("/opt/models/facenet512.onnx"));
        assert_eq!(paths.classifier, PathBuf::from("/opt/models/classifier.json"));
        assert_eq!(paths.labels, PathBuf::from("/opt/models/labels.json"));
    }

    #[test]
    fn test_default_model_dir_ends_with_rollcall_models() {
        assert!(default_model_dir().ends_with("rollcall/models"));
    }
}
