//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};
use crate::transport::DEFAULT_USER_AGENT;

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api/";
pub const DEFAULT_LOGIN_PATH: &str = "auth/login";
pub const DEFAULT_REFRESH_PATH: &str = "auth/refresh";
pub const DEFAULT_LOGIN_REDIRECT: &str = "/login";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP method used for the refresh call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RefreshMethod {
    Get,
    #[default]
    Post,
}

impl RefreshMethod {
    pub fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

/// Endpoints and limits for talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL every relative path is resolved against.
    pub base_url: String,
    /// Login endpoint, relative to `base_url`.
    pub login_path: String,
    /// Refresh endpoint, relative to `base_url`.
    pub refresh_path: String,
    pub refresh_method: RefreshMethod,
    /// Timeout applied to every request, refresh included.
    pub timeout_secs: u64,
    /// Where credentials are persisted; `None` keeps them in memory only.
    pub credentials_file: Option<PathBuf>,
    /// Unauthenticated entry point users are sent to when the session ends.
    pub login_redirect: String,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            refresh_method: RefreshMethod::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            credentials_file: None,
            login_redirect: DEFAULT_LOGIN_REDIRECT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at `base_url` with default endpoints.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override fields from environment variables.
    ///
    /// Environment variables:
    /// - `ESTATE_API_URL`: base URL (default: `http://localhost:8080/api/`)
    /// - `ESTATE_LOGIN_PATH`: login endpoint (default: `auth/login`)
    /// - `ESTATE_REFRESH_PATH`: refresh endpoint (default: `auth/refresh`)
    /// - `ESTATE_REFRESH_METHOD`: `GET` or `POST` (default: `POST`)
    /// - `ESTATE_HTTP_TIMEOUT_SECS`: request timeout in seconds (default: 30)
    /// - `ESTATE_CREDENTIALS_FILE`: credential file path (default: in-memory only)
    /// - `ESTATE_LOGIN_REDIRECT`: login entry point (default: `/login`)
    /// - `ESTATE_USER_AGENT`: user agent header (default: `estate-auth/<version>`)
    ///
    /// Unparsable values leave the current setting untouched.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env`](Self::with_env) with a custom variable lookup.
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = var("ESTATE_API_URL") {
            self.base_url = url;
        }
        if let Some(path) = var("ESTATE_LOGIN_PATH") {
            self.login_path = path;
        }
        if let Some(path) = var("ESTATE_REFRESH_PATH") {
            self.refresh_path = path;
        }
        if let Some(method) = var("ESTATE_REFRESH_METHOD").and_then(|v| RefreshMethod::parse(&v)) {
            self.refresh_method = method;
        }
        if let Some(secs) = var("ESTATE_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        {
            self.timeout_secs = secs;
        }
        if let Some(path) = var("ESTATE_CREDENTIALS_FILE") {
            self.credentials_file = Some(PathBuf::from(path));
        }
        if let Some(target) = var("ESTATE_LOGIN_REDIRECT") {
            self.login_redirect = target;
        }
        if let Some(agent) = var("ESTATE_USER_AGENT") {
            self.user_agent = agent;
        }

        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parsed base URL, always ending in `/` so relative joins keep its path.
    pub fn base(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)?;
        if url.cannot_be_a_base() {
            return Err(AuthError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                self.base_url
            )));
        }
        Ok(url)
    }

    /// Resolve a path (or absolute URL) against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base()?.join(path.trim_start_matches('/'))?)
    }

    pub fn login_url(&self) -> Result<Url> {
        self.endpoint(&self.login_path)
    }

    pub fn refresh_url(&self) -> Result<Url> {
        self.endpoint(&self.refresh_path)
    }
}
