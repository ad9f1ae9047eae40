//! Client side of the remote emotion service.

mod http;

use crate::capture::AudioArtifact;
use crate::config::{ConfigError, InsightsWindow};
use crate::history::HistoryLogEntry;
use crate::interpret::ClassificationResult;
use crate::memory::{MemoryEntry, NewMemory};
use crate::wire::null_as_default;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use http::HttpEmotionApi;

/// Shown when a failure carries nothing more specific.
pub const CONNECTIVITY_MESSAGE: &str =
    "Could not reach the emotion service. Check that it is running and try again.";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("HTTP {status}: {}", .detail.as_deref().unwrap_or("<no detail>"))]
    Status { status: u16, detail: Option<String> },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no user id is set")]
    MissingIdentity,

    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] ConfigError),
}

impl ApiError {
    /// Text for the user-visible layer: the server's own explanation when it
    /// sent one, else a generic connectivity message.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                detail: Some(detail),
                ..
            } => detail.clone(),
            ApiError::Status { status, detail: None } if *status == 404 => {
                "Not found on the emotion service.".to_owned()
            }
            ApiError::Status { .. } | ApiError::Network(_) => CONNECTIVITY_MESSAGE.to_owned(),
            ApiError::InvalidResponse(_) => {
                "The emotion service sent a response this client does not understand.".to_owned()
            }
            ApiError::MissingIdentity => "Set a user id first.".to_owned(),
            ApiError::Endpoint(e) => format!("The service address is invalid: {e}"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// Share of positive, negative and neutral classifications.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionMix {
    #[serde(default, deserialize_with = "null_as_default")]
    pub positive: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub negative: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub neutral: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Insights {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(default)]
    pub top_emotion: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub counts: BTreeMap<String, u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mix: EmotionMix,
    #[serde(default, deserialize_with = "null_as_default")]
    pub window_days: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub interaction_style: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub preferences: Vec<String>,
}

/// Confidence-weighted tallies behind an adaptive reply. Empty when the
/// user has no history yet.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReplyStats {
    #[serde(default, deserialize_with = "null_as_default")]
    pub counts: EmotionMix,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pos_pct: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub neg_pct: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveReply {
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stats: ReplyStats,
}

/// Acknowledgement returned by the write endpoints.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Ack {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ok: bool,
    #[serde(default)]
    pub mem_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// One attempt per call; nothing here retries.
pub trait EmotionApi: Send + Sync {
    fn health(&self) -> BoxFuture<'_, Result<HealthStatus, ApiError>>;

    fn classify_text(
        &self,
        text: String,
        user_id: Option<String>,
    ) -> BoxFuture<'_, Result<ClassificationResult, ApiError>>;

    fn classify_speech(
        &self,
        artifact: AudioArtifact,
        user_id: Option<String>,
    ) -> BoxFuture<'_, Result<ClassificationResult, ApiError>>;

    fn fetch_history(
        &self,
        user_id: String,
        page: usize,
        page_size: usize,
    ) -> BoxFuture<'_, Result<Vec<HistoryLogEntry>, ApiError>>;

    fn fetch_insights(
        &self,
        user_id: String,
        window: InsightsWindow,
    ) -> BoxFuture<'_, Result<Insights, ApiError>>;

    fn fetch_memory(
        &self,
        user_id: String,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<MemoryEntry>, ApiError>>;

    fn save_memory(&self, memory: NewMemory) -> BoxFuture<'_, Result<Ack, ApiError>>;

    fn fetch_profile(&self, user_id: String) -> BoxFuture<'_, Result<UserProfile, ApiError>>;

    fn save_profile(&self, profile: UserProfile) -> BoxFuture<'_, Result<Ack, ApiError>>;

    fn respond(&self, user_id: String) -> BoxFuture<'_, Result<AdaptiveReply, ApiError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_prefers_server_detail() {
        let err = ApiError::Status {
            status: 422,
            detail: Some("transcription empty; please try again with clearer audio".to_owned()),
        };
        assert_eq!(
            err.user_message(),
            "transcription empty; please try again with clearer audio"
        );

        let err = ApiError::Status {
            status: 502,
            detail: None,
        };
        assert_eq!(err.user_message(), CONNECTIVITY_MESSAGE);
        assert_eq!(err.to_string(), "HTTP 502: <no detail>");
    }

    #[test]
    fn insights_tolerate_missing_and_null_fields() {
        let insights: Insights = serde_json::from_str(
            r#"{"total": 3, "top_emotion": null, "counts": {"joy": 2, "fear": 1}, "mix": null}"#,
        )
        .unwrap();
        assert_eq!(insights.total, 3);
        assert_eq!(insights.top_emotion, None);
        assert_eq!(insights.counts.get("joy"), Some(&2));
        assert_eq!(insights.mix, EmotionMix::default());
        assert_eq!(insights.window_days, 0);
    }

    #[test]
    fn reply_without_history_has_empty_stats() {
        let reply: AdaptiveReply = serde_json::from_str(
            r#"{"response": "Hello, how are you feeling today?", "reason": "no-history", "stats": {}}"#,
        )
        .unwrap();
        assert_eq!(reply.reason, "no-history");
        assert_eq!(reply.stats, ReplyStats::default());
    }

    #[test]
    fn profile_preferences_default_to_empty() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"user_id": "alice", "name": "Alice", "preferences": null}"#)
                .unwrap();
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        assert!(profile.preferences.is_empty());
    }

    #[test]
    fn health_status_is_case_insensitive() {
        assert!(HealthStatus { status: "OK".to_owned() }.is_ok());
        assert!(!HealthStatus { status: "db-unreachable".to_owned() }.is_ok());
    }
}
