//! The end-to-end user workflow: capture or text in, classification out,
//! analytics refreshed.
//!
//! Every operation renders its own failures to the sink before returning
//! them, and leaves the views in a consistent state either way.

mod sink;

use crate::api::{ApiError, EmotionApi, UserProfile};
use crate::capture::{AudioArtifact, CaptureWarning, FinalizedCapture};
use crate::config::{AppConfig, InsightsWindow, PageSize};
use crate::history::HistoryView;
use crate::interpret::{interpret, DisplayModel};
use crate::memory::{Importance, MemoryView, NewMemory};
use crate::session::SessionIdentity;
use crate::verify::{ArtifactVerifier, VerifyOutcome};
use chrono::Utc;

pub use sink::{Connectivity, NoticeLevel, RenderSink};

/// How many history records one reload pulls. Windowing and paging happen
/// locally over this set.
pub const DEFAULT_HISTORY_FETCH_LIMIT: usize = 200;
pub const DEFAULT_MEMORY_FETCH_LIMIT: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum ConsoleError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("nothing to classify: the text is empty")]
    EmptyText,

    #[error("nothing to upload: the recording is empty")]
    EmptyArtifact,
}

impl ConsoleError {
    pub fn user_message(&self) -> String {
        match self {
            ConsoleError::Api(e) => e.user_message(),
            ConsoleError::EmptyText => "Type something to analyze first.".to_owned(),
            ConsoleError::EmptyArtifact => CaptureWarning::EmptyRecording.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageMove {
    Next,
    Prev,
    To(usize),
}

#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub history_page_size: PageSize,
    pub memory_page_size: PageSize,
    pub insights_window: InsightsWindow,
    pub history_fetch_limit: usize,
    pub memory_fetch_limit: usize,
}

impl ConsoleConfig {
    pub fn from_app(app: &AppConfig) -> Self {
        Self {
            history_page_size: app.history_page_size,
            memory_page_size: app.memory_page_size,
            insights_window: app.insights_window,
            history_fetch_limit: DEFAULT_HISTORY_FETCH_LIMIT,
            memory_fetch_limit: DEFAULT_MEMORY_FETCH_LIMIT,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

pub struct EmotionConsole<A, V, S> {
    api: A,
    verifier: V,
    sink: S,
    session: SessionIdentity,
    history: HistoryView,
    memory: MemoryView,
    insights_window: InsightsWindow,
    history_fetch_limit: usize,
    memory_fetch_limit: usize,
    last_result: Option<DisplayModel>,
}

impl<A, V, S> EmotionConsole<A, V, S>
where
    A: EmotionApi,
    V: ArtifactVerifier,
    S: RenderSink,
{
    pub fn new(api: A, verifier: V, sink: S, session: SessionIdentity, config: ConsoleConfig) -> Self {
        Self {
            api,
            verifier,
            sink,
            session,
            history: HistoryView::new(config.history_page_size),
            memory: MemoryView::new(config.memory_page_size),
            insights_window: config.insights_window,
            history_fetch_limit: config.history_fetch_limit.max(1),
            memory_fetch_limit: config.memory_fetch_limit.max(1),
            last_result: None,
        }
    }

    pub fn session(&self) -> &SessionIdentity {
        &self.session
    }

    pub fn history(&self) -> &HistoryView {
        &self.history
    }

    pub fn memory(&self) -> &MemoryView {
        &self.memory
    }

    pub fn last_result(&self) -> Option<&DisplayModel> {
        self.last_result.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub async fn submit_text(
        &mut self,
        text: &str,
        user_id: Option<&str>,
    ) -> Result<DisplayModel, ConsoleError> {
        let text = text.trim();
        if text.is_empty() {
            return self.fail(NoticeLevel::Warning, ConsoleError::EmptyText);
        }
        let user = self.session.resolve(user_id);
        match self.api.classify_text(text.to_owned(), user.clone()).await {
            Ok(result) => Ok(self.show_result(result, user).await),
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    /// Surfaces the capture warning, if any, then submits the artifact.
    pub async fn submit_capture(
        &mut self,
        capture: FinalizedCapture,
        user_id: Option<&str>,
    ) -> Result<DisplayModel, ConsoleError> {
        if capture.warning.is_some() || capture.artifact.is_empty() {
            return self.fail(NoticeLevel::Warning, ConsoleError::EmptyArtifact);
        }
        self.submit_artifact(capture.artifact, user_id).await
    }

    /// Verify, upload, interpret, render. An artifact that fails local
    /// verification is still uploaded, with a warning.
    pub async fn submit_artifact(
        &mut self,
        artifact: AudioArtifact,
        user_id: Option<&str>,
    ) -> Result<DisplayModel, ConsoleError> {
        if artifact.is_empty() {
            return self.fail(NoticeLevel::Warning, ConsoleError::EmptyArtifact);
        }

        let artifact = match self.verifier.verify(artifact.clone()).await {
            VerifyOutcome::Verified { duration: Some(d) } => artifact.with_duration_hint(d),
            VerifyOutcome::Verified { duration: None } => artifact,
            VerifyOutcome::Unverified { reason } => {
                tracing::warn!(%reason, mime_type = %artifact.mime_type(), "uploading unverified artifact");
                self.sink.notice(
                    NoticeLevel::Warning,
                    "The recording could not be checked locally and may be corrupt; sending it anyway.",
                );
                artifact
            }
        };

        let user = self.session.resolve(user_id);
        match self.api.classify_speech(artifact, user.clone()).await {
            Ok(result) => Ok(self.show_result(result, user).await),
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    pub async fn reload_history(&mut self, user_id: Option<&str>) -> Result<(), ConsoleError> {
        let user = self.require_user(user_id)?;
        match self
            .api
            .fetch_history(user.clone(), 1, self.history_fetch_limit)
            .await
        {
            Ok(items) => {
                tracing::info!(user_id = %user, records = items.len(), "history loaded");
                self.history.load(items, Utc::now());
                self.sink.history(&self.history);
                Ok(())
            }
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    pub fn change_since_days(&mut self, since_days: u32) {
        self.history.set_since_days(since_days, Utc::now());
        self.sink.history(&self.history);
    }

    pub fn change_history_page(&mut self, page: PageMove) {
        match page {
            PageMove::Next => self.history.next_page(),
            PageMove::Prev => self.history.prev_page(),
            PageMove::To(n) => self.history.go_to_page(n),
        }
        self.sink.history(&self.history);
    }

    pub fn change_history_page_size(&mut self, page_size: PageSize) {
        self.history.set_page_size(page_size);
        self.sink.history(&self.history);
    }

    /// CSV of the currently filtered history (all pages).
    pub fn export_csv(&self) -> String {
        self.history.to_csv()
    }

    pub async fn reload_memory(&mut self, user_id: Option<&str>) -> Result<(), ConsoleError> {
        let user = self.require_user(user_id)?;
        match self.api.fetch_memory(user, self.memory_fetch_limit).await {
            Ok(entries) => {
                self.memory.load(entries);
                self.sink.memories(&self.memory);
                Ok(())
            }
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    pub fn change_memory_page(&mut self, page: PageMove) {
        match page {
            PageMove::Next => self.memory.next_page(),
            PageMove::Prev => self.memory.prev_page(),
            PageMove::To(n) => self.memory.go_to_page(n),
        }
        self.sink.memories(&self.memory);
    }

    pub async fn save_memory(
        &mut self,
        memory_type: &str,
        content: &str,
        importance: Importance,
        user_id: Option<&str>,
    ) -> Result<(), ConsoleError> {
        let user = self.require_user(user_id)?;
        let memory = NewMemory {
            user_id: user.clone(),
            memory_type: memory_type.trim().to_owned(),
            content: content.trim().to_owned(),
            importance,
        };
        if let Err(e) = self.api.save_memory(memory).await {
            return self.fail(NoticeLevel::Error, e.into());
        }
        self.sink.notice(NoticeLevel::Info, "Memory saved.");
        self.reload_memory(Some(&user)).await
    }

    pub async fn insights(
        &mut self,
        window: Option<InsightsWindow>,
        user_id: Option<&str>,
    ) -> Result<(), ConsoleError> {
        let user = self.require_user(user_id)?;
        let window = window.unwrap_or(self.insights_window);
        match self.api.fetch_insights(user, window).await {
            Ok(insights) => {
                self.sink.insights(&insights);
                Ok(())
            }
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    pub async fn load_profile(&mut self, user_id: Option<&str>) -> Result<UserProfile, ConsoleError> {
        let user = self.require_user(user_id)?;
        match self.api.fetch_profile(user).await {
            Ok(profile) => {
                self.sink.profile(&profile);
                Ok(profile)
            }
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    /// A blank `user_id` on the profile is filled from the session; a
    /// successful save makes the profile's id the session identity.
    pub async fn save_profile(&mut self, mut profile: UserProfile) -> Result<(), ConsoleError> {
        let explicit = profile.user_id.clone();
        profile.user_id = self.require_user(Some(&explicit))?;
        match self.api.save_profile(profile.clone()).await {
            Ok(_) => {
                self.session.set_identity(&profile.user_id);
                self.sink.notice(NoticeLevel::Info, "Profile saved.");
                self.sink.profile(&profile);
                Ok(())
            }
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    pub async fn adaptive_reply(&mut self, user_id: Option<&str>) -> Result<(), ConsoleError> {
        let user = self.require_user(user_id)?;
        match self.api.respond(user).await {
            Ok(reply) => {
                self.sink.reply(&reply);
                Ok(())
            }
            Err(e) => self.fail(NoticeLevel::Error, e.into()),
        }
    }

    /// The only call with a deadline. Never fails; the outcome is rendered
    /// and returned.
    pub async fn check_connectivity(&mut self) -> Connectivity {
        let state = match self.api.health().await {
            Ok(health) if health.is_ok() => Connectivity::Online {
                status: health.status,
            },
            Ok(health) => Connectivity::Degraded {
                status: health.status,
            },
            Err(e) => {
                tracing::warn!(error = %e, "connectivity check failed");
                Connectivity::Offline {
                    message: e.user_message(),
                }
            }
        };
        self.sink.connectivity(&state);
        state
    }

    async fn show_result(
        &mut self,
        result: crate::interpret::ClassificationResult,
        user: Option<String>,
    ) -> DisplayModel {
        let model = interpret(&result);
        self.sink.classification(&result, &model);
        self.last_result = Some(model.clone());

        // An id echoed back by the service becomes the session identity.
        let echoed = result.user_id.as_deref().filter(|id| self.session.set_identity(id));
        let user = echoed.map(|id| id.trim().to_owned()).or(user);

        // The classification already succeeded; a failed refresh is only
        // rendered.
        if let Some(user) = user {
            let _ = self.reload_history(Some(&user)).await;
        }
        model
    }

    fn require_user(&mut self, explicit: Option<&str>) -> Result<String, ConsoleError> {
        match self.session.resolve(explicit) {
            Some(user) => Ok(user),
            None => self.fail(NoticeLevel::Warning, ApiError::MissingIdentity.into()),
        }
    }

    fn fail<T>(&mut self, level: NoticeLevel, err: ConsoleError) -> Result<T, ConsoleError> {
        tracing::debug!(error = %err, "console operation failed");
        self.sink.notice(level, &err.user_message());
        Err(err)
    }
}
