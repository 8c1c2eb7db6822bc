//! FaceNet face embedder via ONNX Runtime.
//!
//! Maps 160×160 RGB face crops to 512-dimensional identity embeddings.
//! A batch of crops runs through the session in one call.

use crate::types::{Embedding, EMBEDDING_DIM};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

// --- Named constants ---
/// Side length of the square face crop the embedder accepts.
pub const FACE_INPUT_SIZE: u32 = 160;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("face crop must be {expected}x{expected}x3, got {width}x{height}x3")]
    ShapeMismatch { expected: u32, width: u32, height: u32 },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps face crops to identity embeddings.
pub trait Embedder: Send + Sync {
    /// Embed a batch of 160×160 RGB crops, one embedding per crop, in order.
    fn embed_batch(&self, faces: &[RgbImage]) -> Result<Vec<Embedding>, EmbedderError>;

    /// Embed a single 160×160 RGB crop.
    fn embed(&self, face: &RgbImage) -> Result<Embedding, EmbedderError> {
        self.embed_batch(std::slice::from_ref(face))?
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("embedder returned no embedding".into()))
    }
}

/// Reject crops that violate the 160×160×3 input contract.
pub fn check_face_shape(face: &RgbImage) -> Result<(), EmbedderError> {
    if face.width() != FACE_INPUT_SIZE || face.height() != FACE_INPUT_SIZE {
        return Err(EmbedderError::ShapeMismatch {
            expected: FACE_INPUT_SIZE,
            width: face.width(),
            height: face.height(),
        });
    }
    Ok(())
}

/// FaceNet-based embedder.
pub struct FaceNetEmbedder {
    session: Mutex<Session>,
}

impl FaceNetEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Convert crops into a NHWC float tensor with per-image standardization.
    ///
    /// Each crop is shifted to zero mean and divided by its standard deviation,
    /// floored at 1/sqrt(N) so flat crops do not blow up.
    fn preprocess(faces: &[RgbImage]) -> Array4<f32> {
        let size = FACE_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((faces.len(), size, size, 3));

        for (n, face) in faces.iter().enumerate() {
            let raw = face.as_raw();
            let count = raw.len() as f32;
            let mean = raw.iter().map(|&v| v as f32).sum::<f32>() / count;
            let variance = raw.iter().map(|&v| (v as f32 - mean).powi(2)).sum::<f32>() / count;
            let std = variance.sqrt().max(1.0 / count.sqrt());

            for (x, y, pixel) in face.enumerate_pixels() {
                for c in 0..3 {
                    tensor[[n, y as usize, x as usize, c]] = (pixel.0[c] as f32 - mean) / std;
                }
            }
        }

        tensor
    }
}

impl Embedder for FaceNetEmbedder {
    fn embed_batch(&self, faces: &[RgbImage]) -> Result<Vec<Embedding>, EmbedderError> {
        if faces.is_empty() {
            return Ok(Vec::new());
        }
        for face in faces {
            check_face_shape(face)?;
        }

        let input = Self::preprocess(faces);

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmbedderError::InferenceFailed("embedder session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let expected = faces.len() * EMBEDDING_DIM;
        if raw.len() != expected {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {} x {EMBEDDING_DIM} embedding values, got {}",
                faces.len(),
                raw.len()
            )));
        }

        Ok(raw
            .chunks_exact(EMBEDDING_DIM)
            .map(|values| Embedding { values: values.to_vec() })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn face(value: u8) -> RgbImage {
        RgbImage::from_pixel(FACE_INPUT_SIZE, FACE_INPUT_SIZE, Rgb([value, value, value]))
    }

    #[test]
    fn test_preprocess_output_shape() {
        let tensor = FaceNetEmbedder::preprocess(&[face(10), face(200)]);
        assert_eq!(tensor.shape(), &[2, 160, 160, 3]);
    }

    #[test]
    fn test_preprocess_flat_crop_is_zero() {
        let tensor = FaceNetEmbedder::preprocess(&[face(128)]);
        assert!(tensor.iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn test_preprocess_standardizes() {
        let mut crop = face(0);
        for (x, _, pixel) in crop.enumerate_pixels_mut() {
            if x % 2 == 0 {
                *pixel = Rgb([255, 255, 255]);
            }
        }
        let tensor = FaceNetEmbedder::preprocess(&[crop]);
        let n = tensor.len() as f32;
        let mean = tensor.iter().sum::<f32>() / n;
        let var = tensor.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-4, "mean = {mean}");
        assert!((var - 1.0).abs() < 1e-3, "var = {var}");
    }

    #[test]
    fn test_check_face_shape() {
        assert!(check_face_shape(&face(0)).is_ok());
        let wrong = RgbImage::new(112, 160);
        assert!(matches!(
            check_face_shape(&wrong),
            Err(EmbedderError::ShapeMismatch { width: 112, height: 160, .. })
        ));
    }

    #[test]
    fn test_load_missing_model() {
        let result = FaceNetEmbedder::load(Path::new("/nonexistent/facenet512.onnx"));
        assert!(matches!(result, Err(EmbedderError::ModelNotFound(_))));
    }
}
