//! Client configuration.
//!
//! A [`ClientConfiguration`] describes one provider API: where it lives, how
//! the key is injected, how versions and beta features are expressed, and
//! which sentinels its event streams use. It is created once, wrapped in an
//! `Arc` by the client, and never mutated afterwards.
//!
//! # Examples
//!
//! Built in code:
//!
//! ```
//! use crudkit::config::{AuthMode, BetaMode, ClientConfiguration, VersionMode};
//!
//! let config = ClientConfiguration::new("OpenAI", "https://api.openai.com/{ver}")
//!     .with_api_key("sk-test")
//!     .with_auth(AuthMode::Bearer)
//!     .with_version(VersionMode::Path, "v1")
//!     .with_beta_header("OpenAI-Beta", "assistants=v2");
//!
//! assert_eq!(config.beta, BetaMode::Header);
//! ```
//!
//! Loaded from JSON:
//!
//! ```
//! use crudkit::config::{AuthMode, ClientConfiguration};
//!
//! let config = ClientConfiguration::from_json_str(r#"{
//!     "api_name": "Gemini",
//!     "base_url": "https://generativelanguage.googleapis.com/{ver}",
//!     "api_key_env": "GEMINI_API_KEY",
//!     "auth": { "mode": "query", "key": "key" },
//!     "version_mode": "path",
//!     "version": "v1beta"
//! }"#).unwrap();
//!
//! assert_eq!(config.auth, AuthMode::Query { key: "key".into() });
//! ```

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, ClientResult};
use crate::request::Header;

/// Default physical attempts per call.
pub const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default initial backoff delay.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default stream completion sentinel.
pub const DEFAULT_DONE_MARKER: &str = "[DONE]";
/// Default SSE field prefix for provider error frames.
pub const DEFAULT_ERROR_PREFIX: &str = "error:";

/// How the API key reaches the provider.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AuthMode {
    /// No key is sent.
    #[default]
    None,
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `<name>: <key>` (e.g. `x-api-key`).
    Header { name: String },
    /// `?<key>=<api key>` query param.
    Query { key: String },
}

/// How the standard API version is expressed.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VersionMode {
    #[default]
    None,
    /// Substituted into `{ver}`.
    Path,
}

/// How beta features are requested.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BetaMode {
    #[default]
    None,
    /// Send the configured beta headers.
    Header,
    /// Substitute the beta version into `{ver}` in place of the standard version.
    Path,
}

/// Sentinels used by the provider's event streams and error payloads.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamMarkers {
    /// Substring in a `data` frame that ends the stream.
    pub done_marker: String,
    /// SSE line prefix carrying provider errors.
    pub error_prefix: String,
    /// Substring identifying an embedded provider error object in fault text.
    pub error_marker: Option<String>,
}

impl Default for StreamMarkers {
    fn default() -> Self {
        Self {
            done_marker: DEFAULT_DONE_MARKER.to_string(),
            error_prefix: DEFAULT_ERROR_PREFIX.to_string(),
            error_marker: None,
        }
    }
}

/// Retry and timeout values applied to requests that leave them unset.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RequestDefaults {
    /// Physical attempts per call.
    pub retry_count: u32,
    /// Initial backoff in milliseconds.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

/// Immutable description of one provider API.
#[derive(Deserialize, Clone)]
pub struct ClientConfiguration {
    /// Display name used in errors and logs.
    pub api_name: String,
    /// Base URL; may contain `{ver}`.
    pub base_url: String,
    /// Inline API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable read when `api_key` is unset.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub auth: AuthMode,
    #[serde(default)]
    pub version_mode: VersionMode,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub beta: BetaMode,
    #[serde(default)]
    pub beta_version: Option<String>,
    #[serde(default)]
    pub beta_headers: Vec<Header>,
    /// Headers sent on every call.
    #[serde(default)]
    pub extra_headers: Vec<Header>,
    #[serde(default)]
    pub stream: StreamMarkers,
    #[serde(default)]
    pub defaults: RequestDefaults,
}

impl fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field("api_name", &self.api_name)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("auth", &self.auth)
            .field("version_mode", &self.version_mode)
            .field("version", &self.version)
            .field("beta", &self.beta)
            .field("beta_version", &self.beta_version)
            .field("beta_headers", &self.beta_headers)
            .field("extra_headers", &self.extra_headers)
            .field("stream", &self.stream)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl ClientConfiguration {
    /// A configuration with no auth, versioning, or beta injection.
    pub fn new(api_name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            base_url: base_url.into(),
            api_key: None,
            api_key_env: None,
            auth: AuthMode::None,
            version_mode: VersionMode::None,
            version: None,
            beta: BetaMode::None,
            beta_version: None,
            beta_headers: Vec::new(),
            extra_headers: Vec::new(),
            stream: StreamMarkers::default(),
            defaults: RequestDefaults::default(),
        }
    }

    /// Parse a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidConfig`] on malformed JSON or an empty base URL.
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ClientError::InvalidConfig(format!("failed to parse configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClientError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> ClientResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::InvalidConfig(format!(
                "{}: base_url must not be empty",
                self.api_name
            )));
        }
        Ok(())
    }

    // ── Builder methods ──

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the key from `var` at call time when no inline key is set.
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_version(mut self, mode: VersionMode, version: impl Into<String>) -> Self {
        self.version_mode = mode;
        self.version = Some(version.into());
        self
    }

    /// Add a beta header and switch beta injection to header mode.
    pub fn with_beta_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.beta = BetaMode::Header;
        self.beta_headers.push(Header::new(name, value));
        self
    }

    /// Use `version` as the `{ver}` segment instead of the standard version.
    pub fn with_beta_path(mut self, version: impl Into<String>) -> Self {
        self.beta = BetaMode::Path;
        self.beta_version = Some(version.into());
        self
    }

    pub fn with_extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push(Header::new(name, value));
        self
    }

    pub fn with_done_marker(mut self, marker: impl Into<String>) -> Self {
        self.stream.done_marker = marker.into();
        self
    }

    pub fn with_error_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream.error_prefix = prefix.into();
        self
    }

    pub fn with_error_marker(mut self, marker: impl Into<String>) -> Self {
        self.stream.error_marker = Some(marker.into());
        self
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    // ── Lookups ──

    /// The API key: the inline key, else the named environment variable.
    /// Empty values count as missing.
    pub fn resolve_api_key(&self) -> Option<Cow<'_, str>> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Some(Cow::Borrowed(key));
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.trim().is_empty())
            .map(Cow::Owned)
    }

    /// The done sentinel, falling back to `[DONE]` when configured empty.
    pub fn done_marker(&self) -> &str {
        if self.stream.done_marker.is_empty() {
            DEFAULT_DONE_MARKER
        } else {
            &self.stream.done_marker
        }
    }
}
