use crate::api::{
    Ack, AdaptiveReply, ApiError, EmotionApi, HealthStatus, Insights, UserProfile,
};
use crate::capture::AudioArtifact;
use crate::config::{ApiBaseUrl, AppConfig, ConfigError, InsightsWindow, DEFAULT_HEALTH_TIMEOUT_MS};
use crate::history::{HistoryLogEntry, HistoryPayload};
use crate::interpret::ClassificationResult;
use crate::memory::{MemoryEntry, NewMemory};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

const FALLBACK_UPLOAD_MIME: &str = "application/octet-stream";

#[derive(Clone)]
pub struct HttpEmotionApi {
    client: Client,
    base_url: ApiBaseUrl,
    health_timeout: Duration,
}

impl HttpEmotionApi {
    pub fn new(base_url: ApiBaseUrl) -> Self {
        Self {
            client: Client::new(),
            base_url,
            health_timeout: Duration::from_millis(DEFAULT_HEALTH_TIMEOUT_MS),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(cfg.api_url.clone()).with_health_timeout(cfg.health_timeout)
    }

    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &ApiBaseUrl {
        &self.base_url
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.endpoint(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn user_url(&self, user_id: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.endpoint("users/")?;
        url.path_segments_mut()
            .map_err(|_| {
                ConfigError::InvalidApiUrl(format!("{} cannot take path segments", self.base_url.as_url()))
            })?
            .pop_if_empty()
            .push(user_id);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        tracing::debug!(%url, "GET");
        let response = self.client.get(url).send().await.map_err(ApiError::Network)?;
        read_json(response).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(ApiError::Network)?;
        read_json(response).await
    }
}

/// Local wall-clock time sent alongside classifications.
fn client_time() -> String {
    chrono::Local::now().to_rfc3339()
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = extract_detail(&body);
        tracing::warn!(status = status.as_u16(), detail = ?detail, "remote request failed");
        return Err(ApiError::Status {
            status: status.as_u16(),
            detail,
        });
    }

    let body = response.bytes().await.map_err(ApiError::Network)?;
    serde_json::from_slice(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Pulls a human-readable reason out of an error body: `{"detail": "..."}`,
/// a validation list `{"detail": [{"msg": "..."}]}`, or short plain text.
fn extract_detail(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_owned()),
            Some(serde_json::Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        },
        Ok(_) => None,
        Err(_) if body.len() <= 200 && !body.starts_with('<') => Some(body.to_owned()),
        Err(_) => None,
    }
}

#[derive(Serialize)]
struct TextRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    text: &'a str,
    client_time: String,
}

fn audio_part(artifact: &AudioArtifact) -> Result<Part, ApiError> {
    let part = || Part::bytes(artifact.bytes().to_vec()).file_name(artifact.upload_filename());
    part()
        .mime_str(artifact.mime_type())
        .or_else(|e| {
            tracing::debug!(mime_type = %artifact.mime_type(), error = %e, "unparseable mime type; uploading as octet-stream");
            part().mime_str(FALLBACK_UPLOAD_MIME)
        })
        .map_err(ApiError::Network)
}

impl EmotionApi for HttpEmotionApi {
    fn health(&self) -> BoxFuture<'_, Result<HealthStatus, ApiError>> {
        async move {
            let url = self.url("health", &[])?;
            let response = self
                .client
                .get(url)
                .timeout(self.health_timeout)
                .send()
                .await
                .map_err(ApiError::Network)?;
            read_json(response).await
        }
        .boxed()
    }

    fn classify_text(
        &self,
        text: String,
        user_id: Option<String>,
    ) -> BoxFuture<'_, Result<ClassificationResult, ApiError>> {
        async move {
            let url = self.url("predict-text", &[("all_scores", "true")])?;
            let body = TextRequest {
                user_id: user_id.as_deref(),
                text: &text,
                client_time: client_time(),
            };
            let result: ClassificationResult = self.post_json(url, &body).await?;
            tracing::info!(
                emotion = %result.emotion,
                confidence = result.confidence,
                chars = text.chars().count(),
                "text classified"
            );
            Ok(result)
        }
        .boxed()
    }

    fn classify_speech(
        &self,
        artifact: AudioArtifact,
        user_id: Option<String>,
    ) -> BoxFuture<'_, Result<ClassificationResult, ApiError>> {
        async move {
            let url = self.url("predict-speech", &[])?;
            let mut form = Form::new()
                .part("audio", audio_part(&artifact)?)
                .text("client_time", client_time());
            if let Some(id) = user_id {
                form = form.text("user_id", id);
            }

            tracing::debug!(
                %url,
                bytes = artifact.len(),
                filename = %artifact.upload_filename(),
                "POST multipart"
            );
            let response = self
                .client
                .post(url)
                .multipart(form)
                .send()
                .await
                .map_err(ApiError::Network)?;
            let result: ClassificationResult = read_json(response).await?;
            tracing::info!(
                emotion = %result.emotion,
                confidence = result.confidence,
                used_fallback = result.diagnostics.as_ref().map(|d| d.used_fallback),
                "speech classified"
            );
            Ok(result)
        }
        .boxed()
    }

    fn fetch_history(
        &self,
        user_id: String,
        page: usize,
        page_size: usize,
    ) -> BoxFuture<'_, Result<Vec<HistoryLogEntry>, ApiError>> {
        async move {
            let page = page.max(1).to_string();
            let page_size = page_size.to_string();
            let url = self.url(
                "history",
                &[
                    ("user_id", user_id.as_str()),
                    ("page", page.as_str()),
                    ("page_size", page_size.as_str()),
                ],
            )?;
            let payload: HistoryPayload = self.get_json(url).await?;
            Ok(payload.into_items())
        }
        .boxed()
    }

    fn fetch_insights(
        &self,
        user_id: String,
        window: InsightsWindow,
    ) -> BoxFuture<'_, Result<Insights, ApiError>> {
        async move {
            let days = window.days.to_string();
            let url = self.url(
                "insights/summary",
                &[("user_id", user_id.as_str()), ("window_days", days.as_str())],
            )?;
            self.get_json(url).await
        }
        .boxed()
    }

    fn fetch_memory(
        &self,
        user_id: String,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<MemoryEntry>, ApiError>> {
        async move {
            let limit = limit.to_string();
            let url = self.url("memory", &[("user_id", user_id.as_str()), ("limit", limit.as_str())])?;
            self.get_json(url).await
        }
        .boxed()
    }

    fn save_memory(&self, memory: NewMemory) -> BoxFuture<'_, Result<Ack, ApiError>> {
        async move {
            let url = self.url("memory", &[])?;
            let ack: Ack = self.post_json(url, &memory).await?;
            tracing::info!(
                user_id = %memory.user_id,
                memory_type = %memory.memory_type,
                mem_id = ?ack.mem_id,
                "memory saved"
            );
            Ok(ack)
        }
        .boxed()
    }

    fn fetch_profile(&self, user_id: String) -> BoxFuture<'_, Result<UserProfile, ApiError>> {
        async move {
            let url = self.user_url(&user_id)?;
            self.get_json(url).await
        }
        .boxed()
    }

    fn save_profile(&self, profile: UserProfile) -> BoxFuture<'_, Result<Ack, ApiError>> {
        async move {
            let url = self.url("users", &[])?;
            self.post_json(url, &profile).await
        }
        .boxed()
    }

    fn respond(&self, user_id: String) -> BoxFuture<'_, Result<AdaptiveReply, ApiError>> {
        async move {
            let url = self.url("respond", &[("user_id", user_id.as_str())])?;
            let response = self.client.post(url).send().await.map_err(ApiError::Network)?;
            read_json(response).await
        }
        .boxed()
    }
}
