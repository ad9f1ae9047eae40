mod aggregate;
mod csv;

use crate::config::PageSize;
use crate::paging::PageState;
use crate::wire::{label_or_unknown, lenient_timestamp, null_as_default, unknown_label};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use aggregate::{aggregate_by_emotion, filter, project_timeline, Timeline, TimelinePoint};
pub use csv::{to_csv, CSV_HEADER};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryLogEntry {
    /// `None` when the record carried no parseable timestamp.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(
        default = "unknown_label",
        alias = "detected_emotion",
        deserialize_with = "label_or_unknown"
    )]
    pub emotion: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_time: Option<String>,
}

impl HistoryLogEntry {
    pub fn new<M, E>(timestamp: DateTime<Utc>, message: M, emotion: E, confidence: f64) -> Self
    where
        M: Into<String>,
        E: Into<String>,
    {
        Self {
            timestamp: Some(timestamp),
            message: message.into(),
            emotion: emotion.into(),
            confidence,
            user_id: None,
            client_time: None,
        }
    }
}

/// The history endpoint answers with either a bare array or an
/// `{ "items": [...] }` envelope; both are accepted.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HistoryPayload {
    Bare(Vec<HistoryLogEntry>),
    Envelope {
        #[serde(default, deserialize_with = "null_as_default")]
        items: Vec<HistoryLogEntry>,
    },
}

impl HistoryPayload {
    pub fn into_items(self) -> Vec<HistoryLogEntry> {
        match self {
            HistoryPayload::Bare(items) | HistoryPayload::Envelope { items } => items,
        }
    }
}

/// Filtered, paginated projection of a loaded history.
///
/// Every mutation re-applies the window filter (where relevant) and clamps
/// the current page into `[1, total_pages]`.
#[derive(Clone, Debug)]
pub struct HistoryView {
    source: Vec<HistoryLogEntry>,
    filtered: Vec<HistoryLogEntry>,
    since_days: u32,
    pages: PageState,
}

impl HistoryView {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            source: Vec::new(),
            filtered: Vec::new(),
            since_days: 0,
            pages: PageState::new(page_size),
        }
    }

    pub fn load(&mut self, logs: Vec<HistoryLogEntry>, now: DateTime<Utc>) {
        self.source = logs;
        self.refilter(now);
    }

    pub fn set_since_days(&mut self, since_days: u32, now: DateTime<Utc>) {
        self.since_days = since_days;
        self.refilter(now);
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.pages.set_size(page_size, self.filtered.len());
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.pages.go_to(page, self.filtered.len());
    }

    pub fn next_page(&mut self) {
        self.pages.next(self.filtered.len());
    }

    pub fn prev_page(&mut self) {
        self.pages.prev(self.filtered.len());
    }

    pub fn since_days(&self) -> u32 {
        self.since_days
    }

    pub fn current_page(&self) -> usize {
        self.pages.current()
    }

    pub fn page_size(&self) -> PageSize {
        self.pages.size()
    }

    pub fn total_pages(&self) -> usize {
        self.pages.total_pages(self.filtered.len())
    }

    pub fn source(&self) -> &[HistoryLogEntry] {
        &self.source
    }

    pub fn filtered(&self) -> &[HistoryLogEntry] {
        &self.filtered
    }

    pub fn current_slice(&self) -> &[HistoryLogEntry] {
        self.pages.slice(&self.filtered)
    }

    /// Nothing to show in the current window. Rendered as an empty state,
    /// never as an error.
    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    pub fn emotion_counts(&self) -> BTreeMap<String, usize> {
        aggregate_by_emotion(&self.filtered)
    }

    pub fn timeline(&self) -> Timeline {
        project_timeline(&self.filtered)
    }

    pub fn to_csv(&self) -> String {
        to_csv(&self.filtered)
    }

    fn refilter(&mut self, now: DateTime<Utc>) {
        self.filtered = filter(&self.source, self.since_days, now);
        self.pages.clamp(self.filtered.len());
        tracing::debug!(
            source = self.source.len(),
            filtered = self.filtered.len(),
            since_days = self.since_days,
            page = self.pages.current(),
            "history view refreshed"
        );
    }
}
