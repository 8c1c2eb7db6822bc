use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a FaceNet embedding.
pub const EMBEDDING_DIM: usize = 512;

/// Displayed when the detector finds no face at all.
pub const NO_FACE_DETECTED: &str = "No face detected";
/// Displayed when faces were found but none passed the detection gate.
pub const NO_CONFIDENT_FACE: &str = "No high-confidence face detected";
/// Label for a face whose classification probability is below threshold.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Integer pixel rectangle around a detected face.
///
/// The origin is reported as the detector decoded it and may be negative;
/// use [`BoundingBox::clamp_to`] before cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Build a box from floating-point corners. Returns `None` for boxes
    /// narrower or shorter than one pixel (including NaN extents).
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        let width = (x2 - x1).round();
        let height = (y2 - y1).round();
        if !(width >= 1.0 && height >= 1.0) {
            return None;
        }
        Some(Self {
            x: x1.round() as i32,
            y: y1.round() as i32,
            width: width as u32,
            height: height as u32,
        })
    }

    /// Clamp the origin to non-negative coordinates and clip the extent to
    /// the image. The result is always at least 1×1 and lies inside a
    /// non-empty image.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Self {
        let x = (self.x.max(0) as u32).min(image_width.saturating_sub(1));
        let y = (self.y.max(0) as u32).min(image_height.saturating_sub(1));
        let width = self.width.min(image_width.saturating_sub(x)).max(1);
        let height = self.height.min(image_height.saturating_sub(y)).max(1);
        Self {
            x: x as i32,
            y: y as i32,
            width,
            height,
        }
    }
}

/// A face box together with the detector's confidence that it is a face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub bbox: BoundingBox,
    /// Detection confidence in [0, 1]. Not an identity score.
    pub confidence: f32,
}

/// Face embedding vector (512-dimensional for FaceNet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Opaque integer code of an enrolled identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnrolledLabel(pub u32);

impl fmt::Display for EnrolledLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-class probabilities for one embedding, in the classifier's class order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub values: Vec<f32>,
}

impl ClassProbabilities {
    /// Largest probability, or 0.0 for an empty vector.
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0f32, f32::max)
    }

    /// Index of the largest probability. Ties resolve to the lowest index;
    /// NaN entries are never selected.
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (i, &p) in self.values.iter().enumerate() {
            if p.is_nan() {
                continue;
            }
            match best {
                Some((_, best_p)) if p <= best_p => {}
                _ => best = Some((i, p)),
            }
        }
        best.map(|(i, _)| i)
    }
}

/// Final per-face label after thresholding and decoding. Serializes as the
/// display string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum FinalLabel {
    Unknown,
    Identity(String),
}

impl FinalLabel {
    pub fn as_str(&self) -> &str {
        match self {
            FinalLabel::Unknown => UNKNOWN_LABEL,
            FinalLabel::Identity(name) => name,
        }
    }
}

impl From<FinalLabel> for String {
    fn from(label: FinalLabel) -> Self {
        match label {
            FinalLabel::Unknown => UNKNOWN_LABEL.to_string(),
            FinalLabel::Identity(name) => name,
        }
    }
}

impl fmt::Display for FinalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: i32, y: i32, width: u32, height: u32) -> BoundingBox {
        BoundingBox { x, y, width, height }
    }

    #[test]
    fn test_from_corners_rounds() {
        let b = BoundingBox::from_corners(10.4, 20.6, 50.4, 80.6).unwrap();
        assert_eq!(b, bbox(10, 21, 40, 60));
    }

    #[test]
    fn test_from_corners_rejects_degenerate() {
        assert!(BoundingBox::from_corners(10.0, 10.0, 10.2, 50.0).is_none());
        assert!(BoundingBox::from_corners(10.0, 10.0, 50.0, 5.0).is_none());
        assert!(BoundingBox::from_corners(f32::NAN, 0.0, 10.0, 10.0).is_none());
    }

    #[test]
    fn test_clamp_negative_origin() {
        let b = bbox(-5, -3, 20, 10).clamp_to(100, 100);
        assert_eq!(b, bbox(0, 0, 20, 10));
    }

    #[test]
    fn test_clamp_clips_extent() {
        let b = bbox(90, 95, 20, 20).clamp_to(100, 100);
        assert_eq!(b, bbox(90, 95, 10, 5));
    }

    #[test]
    fn test_clamp_outside_image_keeps_one_pixel() {
        let b = bbox(500, 500, 20, 20).clamp_to(100, 80);
        assert_eq!(b, bbox(99, 79, 1, 1));
    }

    #[test]
    fn test_argmax_lowest_index_on_tie() {
        let p = ClassProbabilities { values: vec![0.1, 0.45, 0.45] };
        assert_eq!(p.argmax(), Some(1));
        assert!((p.max() - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_skips_nan() {
        let p = ClassProbabilities { values: vec![0.9, f32::NAN] };
        assert_eq!(p.argmax(), Some(0));
        assert!((p.max() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_empty() {
        let p = ClassProbabilities { values: vec![] };
        assert_eq!(p.argmax(), None);
        assert_eq!(p.max(), 0.0);
    }

    #[test]
    fn test_final_label_display() {
        assert_eq!(FinalLabel::Unknown.to_string(), "Unknown");
        assert_eq!(FinalLabel::Identity("Carol Lee".into()).to_string(), "Carol Lee");
        assert_eq!(serde_json::to_string(&FinalLabel::Unknown).unwrap(), "\"Unknown\"");
    }
}
