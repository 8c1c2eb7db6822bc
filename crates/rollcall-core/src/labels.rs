//! Bidirectional mapping between enrolled-identity codes and display names.
//!
//! Fitted once from the enrollment label column: names are de-duplicated and
//! sorted, and a name's code is its index in that order. The mapping never
//! changes after construction.

use crate::types::EnrolledLabel;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("label file not found: {0}")]
    FileNotFound(String),
    #[error("failed to read label file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse label file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("enrollment label set is empty")]
    Empty,
    #[error("name not enrolled: {0}")]
    UnknownName(String),
    #[error("label {0} is outside the enrolled label set")]
    UnknownLabel(EnrolledLabel),
}

/// On-disk layout of `labels.json`: the training label column, duplicates allowed.
#[derive(Debug, Deserialize)]
struct LabelFile {
    labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LabelCodec {
    names: Vec<String>,
    codes: HashMap<String, EnrolledLabel>,
}

impl LabelCodec {
    /// Fit the codec on every known name.
    pub fn fit<I, S>(labels: I) -> Result<Self, LabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = labels
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if names.is_empty() {
            return Err(LabelError::Empty);
        }

        let codes = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), EnrolledLabel(i as u32)))
            .collect();

        Ok(Self { names, codes })
    }

    /// Load and fit from a `labels.json` file.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        if !path.exists() {
            return Err(LabelError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        let file: LabelFile = serde_json::from_str(&text)?;
        let codec = Self::fit(file.labels)?;
        tracing::info!(path = %path.display(), identities = codec.len(), "loaded enrollment labels");
        Ok(codec)
    }

    pub fn encode(&self, name: &str) -> Result<EnrolledLabel, LabelError> {
        self.codes
            .get(name)
            .copied()
            .ok_or_else(|| LabelError::UnknownName(name.to_string()))
    }

    pub fn decode(&self, label: EnrolledLabel) -> Result<&str, LabelError> {
        self.names
            .get(label.0 as usize)
            .map(String::as_str)
            .ok_or(LabelError::UnknownLabel(label))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
