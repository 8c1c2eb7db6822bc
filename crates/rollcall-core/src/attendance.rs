//! Accept or reject an attendance submission against the latest recognized labels.

use crate::types::NO_FACE_DETECTED;
use serde::Serialize;
use std::fmt;

/// Compose the expected identity the way enrollment names were written:
/// first, middle and last joined by single spaces. An absent middle name
/// leaves two adjacent spaces, which only matches a label enrolled that way.
pub fn full_name(first: &str, middle: &str, last: &str) -> String {
    format!("{first} {middle} {last}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoFace,
    IdentityMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoFace => write!(f, "no face"),
            RejectReason::IdentityMismatch => write!(f, "identity mismatch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AttendanceDecision {
    Accept { name: String },
    Reject { reason: RejectReason },
}

impl AttendanceDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AttendanceDecision::Accept { .. })
    }

    /// Text shown to the submitter.
    pub fn message(&self) -> String {
        match self {
            AttendanceDecision::Accept { name } => format!("Attendance recorded for {name}"),
            AttendanceDecision::Reject { reason: RejectReason::NoFace } => {
                "No face detected. Please face the camera and try again.".to_string()
            }
            AttendanceDecision::Reject { reason: RejectReason::IdentityMismatch } => {
                "Face does not match the submitted name.".to_string()
            }
        }
    }
}

/// Decide on a submission. `labels` are the latest frame's labels in
/// detection order; any match among them is accepted. Both sides are
/// compared after trimming leading and trailing whitespace only.
pub fn decide<S: AsRef<str>>(labels: &[S], expected: &str) -> AttendanceDecision {
    let no_face = labels
        .first()
        .map_or(true, |first| first.as_ref() == NO_FACE_DETECTED);
    if no_face {
        tracing::info!("attendance rejected: no face");
        return AttendanceDecision::Reject {
            reason: RejectReason::NoFace,
        };
    }

    let expected = expected.trim();
    if labels.iter().any(|label| label.as_ref().trim() == expected) {
        tracing::info!(name = expected, "attendance accepted");
        AttendanceDecision::Accept {
            name: expected.to_string(),
        }
    } else {
        tracing::info!(
            expected,
            labels = ?labels.iter().map(AsRef::as_ref).collect::<Vec<&str>>(),
            "attendance rejected: identity mismatch"
        );
        AttendanceDecision::Reject {
            reason: RejectReason::IdentityMismatch,
        }
    }
}
