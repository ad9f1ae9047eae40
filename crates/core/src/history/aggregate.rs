use crate::history::HistoryLogEntry;
use crate::wire::UNKNOWN_LABEL;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Entries inside the last `since_days` days, in their original order.
/// `since_days == 0` keeps everything, including entries with no timestamp.
pub fn filter(logs: &[HistoryLogEntry], since_days: u32, now: DateTime<Utc>) -> Vec<HistoryLogEntry> {
    if since_days == 0 {
        return logs.to_vec();
    }
    // A window reaching past the representable range keeps every dated entry.
    let cutoff = Duration::try_days(i64::from(since_days)).and_then(|d| now.checked_sub_signed(d));
    logs.iter()
        .filter(|log| {
            log.timestamp
                .is_some_and(|ts| cutoff.map_or(true, |cutoff| ts >= cutoff))
        })
        .cloned()
        .collect()
}

pub fn aggregate_by_emotion(logs: &[HistoryLogEntry]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for log in logs {
        let label = if log.emotion.trim().is_empty() {
            UNKNOWN_LABEL
        } else {
            log.emotion.as_str()
        };
        *counts.entry(label.to_owned()).or_insert(0) += 1;
    }
    counts
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TimelinePoint {
    pub timestamp: DateTime<Utc>,
    pub emotion_index: usize,
}

/// Chart-ready projection: `labels` is the alphabetical category axis and
/// each point's `emotion_index` indexes into it.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Timeline {
    pub labels: Vec<String>,
    pub points: Vec<TimelinePoint>,
}

impl Timeline {
    pub fn label_of(&self, point: &TimelinePoint) -> Option<&str> {
        self.labels.get(point.emotion_index).map(String::as_str)
    }
}

pub fn project_timeline(logs: &[HistoryLogEntry]) -> Timeline {
    let labels: Vec<String> = logs
        .iter()
        .map(|log| log.emotion.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut points: Vec<TimelinePoint> = logs
        .iter()
        .filter_map(|log| {
            let timestamp = log.timestamp?;
            let emotion_index = labels.binary_search(&log.emotion).ok()?;
            Some(TimelinePoint {
                timestamp,
                emotion_index,
            })
        })
        .collect();
    points.sort_by_key(|p| p.timestamp);

    Timeline { labels, points }
}
