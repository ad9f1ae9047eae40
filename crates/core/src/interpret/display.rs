use crate::interpret::ClassificationResult;
use serde::Serialize;

/// A runner-up at or above this score turns the display into a mixed pair.
pub const MIXED_SECONDARY_THRESHOLD: f64 = 0.25;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum DisplayMode {
    Single,
    Mixed,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LabelPct {
    pub label: String,
    /// Raw score as received.
    pub score: f64,
    /// `score * 100`, rounded to one decimal.
    pub pct: f64,
}

impl LabelPct {
    fn new(label: &str, score: f64) -> Self {
        Self {
            label: label.to_owned(),
            score,
            pct: round_pct(score),
        }
    }

    pub fn chip_text(&self) -> String {
        format!("{} {:.0}%", self.label, (self.score * 100.0).round())
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DisplayModel {
    pub mode: DisplayMode,
    pub primary: LabelPct,
    pub secondary: Option<LabelPct>,
}

impl DisplayModel {
    pub fn confidence_text(&self) -> String {
        format!("Confidence: {:.1}%", self.primary.pct)
    }

    pub fn chips(&self) -> Vec<String> {
        std::iter::once(&self.primary)
            .chain(self.secondary.as_ref())
            .map(LabelPct::chip_text)
            .collect()
    }
}

pub fn interpret(result: &ClassificationResult) -> DisplayModel {
    match result.top.as_slice() {
        [first, second, ..] if second.score >= MIXED_SECONDARY_THRESHOLD => DisplayModel {
            mode: DisplayMode::Mixed,
            primary: LabelPct::new(&first.label, first.score),
            secondary: Some(LabelPct::new(&second.label, second.score)),
        },
        _ => DisplayModel {
            mode: DisplayMode::Single,
            primary: LabelPct::new(&result.emotion, result.confidence),
            secondary: None,
        },
    }
}

/// `score * 100` rounded to one decimal place.
pub(crate) fn round_pct(score: f64) -> f64 {
    (score * 1000.0).round() / 10.0
}
