mod display;

use crate::wire::{label_or_unknown, null_as_default, unknown_label};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub(crate) use display::round_pct;
pub use display::{interpret, DisplayMode, DisplayModel, LabelPct, MIXED_SECONDARY_THRESHOLD};

/// One `(label, score)` entry of a ranked classification. Travels on the wire
/// as a two-element JSON array.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(from = "(String, f64)", into = "(String, f64)")]
pub struct ScoredLabel {
    pub label: String,
    pub score: f64,
}

impl ScoredLabel {
    pub fn new<S: Into<String>>(label: S, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

impl From<(String, f64)> for ScoredLabel {
    fn from((label, score): (String, f64)) -> Self {
        Self { label, score }
    }
}

impl From<ScoredLabel> for (String, f64) {
    fn from(value: ScoredLabel) -> Self {
        (value.label, value.score)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Diagnostics {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default, rename = "duration")]
    pub duration_seconds: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub used_fallback: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    #[serde(default = "unknown_label", deserialize_with = "label_or_unknown")]
    pub emotion: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    /// Descending by score.
    #[serde(default, deserialize_with = "null_as_default")]
    pub top: Vec<ScoredLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, rename = "_diag", skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<String, f64>,
}

impl ClassificationResult {
    pub fn single<S: Into<String>>(emotion: S, confidence: f64) -> Self {
        let emotion = emotion.into();
        Self {
            top: vec![ScoredLabel::new(emotion.clone(), confidence)],
            emotion,
            confidence,
            user_id: None,
            transcript: None,
            diagnostics: None,
            scores: BTreeMap::new(),
        }
    }

    pub fn with_top(mut self, top: Vec<ScoredLabel>) -> Self {
        self.top = top;
        self
    }
}
