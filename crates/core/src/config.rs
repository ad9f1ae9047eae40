use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 10;
pub const DEFAULT_MEMORY_PAGE_SIZE: usize = 5;
pub const DEFAULT_INSIGHTS_WINDOW_DAYS: u32 = 30;
pub const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 5000;
pub const ENV_API_URL: &str = "EMOTION_API_URL";
pub const ENV_USER_ID: &str = "EMOTION_USER_ID";
pub const ENV_PAGE_SIZE: &str = "EMOTION_PAGE_SIZE";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiBaseUrl(Url);

impl ApiBaseUrl {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyApiUrl);
        }
        let mut url =
            Url::parse(trimmed).map_err(|e| ConfigError::InvalidApiUrl(e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidApiUrl(format!(
                "{trimmed} cannot be used as a base url"
            )));
        }
        // Url::join drops the last path segment unless it ends with '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self(url))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        self.0
            .join(path.trim_start_matches('/'))
            .map_err(|e| ConfigError::InvalidApiUrl(e.to_string()))
    }
}

impl Default for ApiBaseUrl {
    fn default() -> Self {
        Self(Url::parse("http://localhost:8000/").expect("static url is valid"))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageSize(usize);

impl PageSize {
    pub fn new(value: usize) -> Result<Self, ConfigError> {
        if value == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self(DEFAULT_HISTORY_PAGE_SIZE)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsightsWindow {
    pub days: u32,
}

impl InsightsWindow {
    pub fn new(days: u32) -> Result<Self, ConfigError> {
        if days == 0 {
            return Err(ConfigError::ZeroInsightsWindow);
        }
        Ok(Self { days })
    }
}

impl Default for InsightsWindow {
    fn default() -> Self {
        Self {
            days: DEFAULT_INSIGHTS_WINDOW_DAYS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub api_url: ApiBaseUrl,
    pub user_id: Option<String>,
    pub history_page_size: PageSize,
    pub memory_page_size: PageSize,
    pub insights_window: InsightsWindow,
    pub health_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: ApiBaseUrl::default(),
            user_id: None,
            history_page_size: PageSize::default(),
            memory_page_size: PageSize(DEFAULT_MEMORY_PAGE_SIZE),
            insights_window: InsightsWindow::default(),
            health_timeout: Duration::from_millis(DEFAULT_HEALTH_TIMEOUT_MS),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("api url must not be empty")]
    EmptyApiUrl,
    #[error("invalid api url: {0}")]
    InvalidApiUrl(String),
    #[error("page size must be > 0")]
    ZeroPageSize,
    #[error("invalid page size: {0}")]
    InvalidPageSize(String),
    #[error("insights window must be > 0 days")]
    ZeroInsightsWindow,
}

pub trait Env {
    fn var(&self, key: &str) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct StdEnv;

impl Env for StdEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapEnv {
    vars: std::collections::BTreeMap<String, String>,
}

impl MapEnv {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl Env for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn resolve_api_url(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Result<ApiBaseUrl, ConfigError> {
    let raw = resolve_string_with_default(cli_value, env_key, env, DEFAULT_API_URL);
    ApiBaseUrl::parse(&raw)
}

pub fn resolve_page_size(
    cli_value: Option<usize>,
    env_key: &str,
    env: &impl Env,
    default: usize,
) -> Result<PageSize, ConfigError> {
    match cli_value {
        Some(v) => PageSize::new(v),
        None => match env.var(env_key) {
            Some(raw) => {
                let parsed = raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidPageSize(raw.clone()))?;
                PageSize::new(parsed)
            }
            None => PageSize::new(default),
        },
    }
}

pub fn resolve_string_with_default(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
    default: &str,
) -> String {
    match cli_value {
        Some(v) => v,
        None => env.var(env_key).unwrap_or_else(|| default.to_owned()),
    }
}

/// Blank values count as absent so an empty `EMOTION_USER_ID=` does not
/// establish an identity.
pub fn resolve_optional_string(
    cli_value: Option<String>,
    env_key: &str,
    env: &impl Env,
) -> Option<String> {
    cli_value
        .or_else(|| env.var(env_key))
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
