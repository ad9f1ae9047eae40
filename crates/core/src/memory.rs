//! Stored memories: decoding plus a paginated view. Memories are always
//! shown in full (no time window) and are never exported.

use crate::config::PageSize;
use crate::paging::PageState;
use crate::wire::{lenient_timestamp, null_as_default};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    High,
    #[default]
    #[serde(other)]
    Normal,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Normal => "normal",
            Importance::High => "high",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Importance::Low),
            "normal" => Ok(Importance::Normal),
            "high" => Ok(Importance::High),
            other => Err(format!("unknown importance '{other}' (expected low, normal or high)")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub memory_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub importance: Importance,
    #[serde(default, rename = "memory_content", deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Body of a memory save request.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NewMemory {
    pub user_id: String,
    pub memory_type: String,
    #[serde(rename = "memory_content")]
    pub content: String,
    pub importance: Importance,
}

#[derive(Clone, Debug)]
pub struct MemoryView {
    entries: Vec<MemoryEntry>,
    pages: PageState,
}

impl MemoryView {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            entries: Vec::new(),
            pages: PageState::new(page_size),
        }
    }

    pub fn load(&mut self, entries: Vec<MemoryEntry>) {
        self.entries = entries;
        self.pages.clamp(self.entries.len());
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.pages.set_size(page_size, self.entries.len());
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.pages.go_to(page, self.entries.len());
    }

    pub fn next_page(&mut self) {
        self.pages.next(self.entries.len());
    }

    pub fn prev_page(&mut self) {
        self.pages.prev(self.entries.len());
    }

    pub fn current_page(&self) -> usize {
        self.pages.current()
    }

    pub fn total_pages(&self) -> usize {
        self.pages.total_pages(self.entries.len())
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub fn current_slice(&self) -> &[MemoryEntry] {
        self.pages.slice(&self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(n: usize) -> MemoryEntry {
        MemoryEntry {
            created_at: None,
            memory_type: "note".to_owned(),
            importance: Importance::Normal,
            content: format!("memory {n}"),
            user_id: None,
        }
    }

    #[test]
    fn decodes_backend_memory_records() {
        let raw = r#"[
            {"user_id": "u1", "memory_type": "mood_alert", "memory_content": "sustained negative emotions", "importance": "high", "created_at": "2024-05-01T08:00:00"},
            {"user_id": "u1", "memory_type": "note", "memory_content": null, "importance": "urgent", "created_at": null},
            {"memory_type": "note", "importance": null}
        ]"#;
        let entries: Vec<MemoryEntry> = serde_json::from_str(raw).unwrap();
        assert_eq!(entries[0].importance, Importance::High);
        assert_eq!(entries[0].content, "sustained negative emotions");
        assert!(entries[0].created_at.is_some());
        assert_eq!(entries[1].importance, Importance::Normal);
        assert_eq!(entries[1].content, "");
        assert_eq!(entries[2].importance, Importance::Normal);
    }

    #[test]
    fn new_memory_uses_backend_field_names() {
        let body = serde_json::to_value(NewMemory {
            user_id: "u1".to_owned(),
            memory_type: "note".to_owned(),
            content: "likes tea".to_owned(),
            importance: Importance::Low,
        })
        .unwrap();
        assert_eq!(body["memory_content"], "likes tea");
        assert_eq!(body["importance"], "low");
    }

    #[test]
    fn importance_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Importance>(), Ok(Importance::High));
        assert!("urgent".parse::<Importance>().is_err());
    }

    #[test]
    fn pages_cover_every_memory_once() {
        let mut view = MemoryView::new(PageSize::new(3).unwrap());
        view.load((0..8).map(memory).collect());
        assert_eq!(view.total_pages(), 3);

        let mut seen = Vec::new();
        for page in 1..=view.total_pages() {
            view.go_to_page(page);
            assert!(view.current_slice().len() <= 3);
            seen.extend(view.current_slice().iter().map(|m| m.content.clone()));
        }
        let expected: Vec<_> = (0..8).map(|n| format!("memory {n}")).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn empty_memories_render_an_empty_state() {
        let mut view = MemoryView::new(PageSize::new(5).unwrap());
        view.load(Vec::new());
        assert!(view.is_empty());
        view.next_page();
        assert_eq!(view.current_page(), 1);
    }

    #[test]
    fn reload_clamps_the_page() {
        let mut view = MemoryView::new(PageSize::new(2).unwrap());
        view.load((0..6).map(memory).collect());
        view.go_to_page(3);
        view.load((0..2).map(memory).collect());
        assert_eq!(view.current_page(), 1);
        view.set_page_size(PageSize::new(1).unwrap());
        view.next_page();
        assert_eq!(view.current_page(), 2);
    }
}
