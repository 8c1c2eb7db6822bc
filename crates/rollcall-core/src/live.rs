//! Per-frame recognition for a continuous video stream.
//!
//! Each incoming frame is recognized synchronously and replaces the retained
//! result. Nothing is queued or retried; a failed frame passes through with a
//! diagnostic overlay and the next frame supersedes it.

use crate::annotate;
use crate::imaging::PixelFrame;
use crate::pipeline::{PipelineError, Recognition, RecognitionEngine};
use crate::types::{FinalLabel, NO_CONFIDENT_FACE, NO_FACE_DETECTED};
use std::sync::Arc;

/// Displayed when recognition fails on a frame. Details go to the log only.
pub const RECOGNITION_FAILED: &str = "Error: recognition failed";

/// What the most recent frame produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    NoFace,
    NoConfidentFace,
    Recognized { labels: Vec<FinalLabel> },
    Failed { message: String },
}

impl FrameOutcome {
    /// Labels for downstream decisions; sentinel outcomes yield their
    /// diagnostic string as the only element.
    pub fn labels(&self) -> Vec<String> {
        match self {
            FrameOutcome::NoFace => vec![NO_FACE_DETECTED.to_string()],
            FrameOutcome::NoConfidentFace => vec![NO_CONFIDENT_FACE.to_string()],
            FrameOutcome::Recognized { labels } => labels.iter().map(ToString::to_string).collect(),
            FrameOutcome::Failed { message } => vec![message.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveState {
    /// No frame processed yet.
    Idle,
    HasResult(FrameOutcome),
}

pub struct LiveFrameProcessor {
    engine: Arc<RecognitionEngine>,
    state: LiveState,
    frames_processed: u64,
}

impl LiveFrameProcessor {
    pub fn new(engine: Arc<RecognitionEngine>) -> Self {
        Self {
            engine,
            state: LiveState::Idle,
            frames_processed: 0,
        }
    }

    /// Recognize one frame, overwrite the retained result and return the
    /// frame to display, in the same channel order as the input.
    pub fn process_frame(&mut self, frame: &PixelFrame) -> PixelFrame {
        self.frames_processed += 1;

        let (outcome, output) = match self.recognize(frame) {
            Ok((outcome, output)) => (outcome, output),
            Err(err) => {
                tracing::warn!(error = %err, frame = self.frames_processed, "recognition failed on frame");
                (
                    FrameOutcome::Failed {
                        message: RECOGNITION_FAILED.to_string(),
                    },
                    self.pass_through(frame, RECOGNITION_FAILED),
                )
            }
        };

        self.state = LiveState::HasResult(outcome);
        output
    }

    fn recognize(&self, frame: &PixelFrame) -> Result<(FrameOutcome, PixelFrame), PipelineError> {
        let rgb = frame.to_rgb()?;
        let out_order = frame.order;

        Ok(match self.engine.recognize_rgb(&rgb)? {
            Recognition::Recognized { image, faces } => (
                FrameOutcome::Recognized {
                    labels: faces.into_iter().map(|f| f.label).collect(),
                },
                PixelFrame::from_rgb(&image, out_order),
            ),
            empty => {
                let outcome = match empty {
                    Recognition::NoConfidentFace => FrameOutcome::NoConfidentFace,
                    _ => FrameOutcome::NoFace,
                };
                let message = empty.sentinel().unwrap_or(NO_FACE_DETECTED);
                let mut overlaid = rgb;
                annotate::overlay_message(&mut overlaid, message);
                (outcome, PixelFrame::from_rgb(&overlaid, out_order))
            }
        })
    }

    /// Return the frame unannotated apart from `message`. Frames that cannot
    /// be decoded at all are returned byte-for-byte.
    fn pass_through(&self, frame: &PixelFrame, message: &str) -> PixelFrame {
        match frame.to_rgb() {
            Ok(mut rgb) => {
                annotate::overlay_message(&mut rgb, message);
                PixelFrame::from_rgb(&rgb, frame.order)
            }
            Err(_) => frame.clone(),
        }
    }

    pub fn latest(&self) -> &LiveState {
        &self.state
    }

    /// Labels of the latest frame; `["No face detected"]` before the first frame.
    pub fn latest_labels(&self) -> Vec<String> {
        match &self.state {
            LiveState::Idle => vec![NO_FACE_DETECTED.to_string()],
            LiveState::HasResult(outcome) => outcome.labels(),
        }
    }

    /// The single prediction shown to the user: the first label of the
    /// latest frame, or its diagnostic.
    pub fn current_prediction(&self) -> String {
        self.latest_labels()
            .into_iter()
            .next()
            .unwrap_or_else(|| NO_FACE_DETECTED.to_string())
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Forget the retained result, as when a capture session ends.
    pub fn reset(&mut self) {
        self.state = LiveState::Idle;
    }
}
