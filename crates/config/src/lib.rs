use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "murmur.toml",
    "config/murmur.toml",
    "crates/config/murmur.toml",
    "../murmur.toml",
    "../config/murmur.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub typing: TypingConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Endpoints of the remote message/presence service.
///
/// ```
/// use murmur_config::ServerConfig;
///
/// let server = ServerConfig::default();
/// assert_eq!(server.api_url, "http://127.0.0.1:5000/api");
/// assert_eq!(server.request_timeout_seconds, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub api_url: String,
    pub socket_url: String,
    #[serde(default = "ServerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    const fn default_request_timeout() -> u64 {
        30
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5000/api".to_string(),
            socket_url: "ws://127.0.0.1:5000".to_string(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingConfig {
    #[serde(default = "TypingConfig::default_debounce")]
    pub debounce_ms: u64,
    /// Unset means remote typing entries only clear on an explicit stop signal.
    ///
    /// Entries are swept every half window, so a stale entry lingers for at
    /// most one and a half times this value.
    #[serde(default)]
    pub remote_expiry_ms: Option<u64>,
}

impl TypingConfig {
    const fn default_debounce() -> u64 {
        1_500
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn remote_expiry(&self) -> Option<Duration> {
        self.remote_expiry_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Period of the stale entry sweep
    pub fn expiry_sweep(&self) -> Option<Duration> {
        self.remote_expiry()
            .map(|max_age| (max_age / 2).max(Duration::from_millis(1)))
    }
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: Self::default_debounce(),
            remote_expiry_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub deduplicate_by_id: bool,
    #[serde(default = "StreamConfig::default_threshold")]
    pub near_bottom_threshold_px: f64,
    #[serde(default = "StreamConfig::default_autoscroll_delay")]
    pub autoscroll_delay_ms: u64,
}

impl StreamConfig {
    const fn default_threshold() -> f64 {
        100.0
    }

    const fn default_autoscroll_delay() -> u64 {
        100
    }

    pub fn autoscroll_delay(&self) -> Duration {
        Duration::from_millis(self.autoscroll_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            deduplicate_by_id: false,
            near_bottom_threshold_px: Self::default_threshold(),
            autoscroll_delay_ms: Self::default_autoscroll_delay(),
        }
    }
}

/// Load the client configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use murmur_config::load;
///
/// std::env::remove_var("MURMUR_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.server.api_url.is_empty());
/// ```
pub fn load() -> anyhow::Result<ClientConfig> {
    load_from(None)
}

/// Like [`load`], but an explicit `path` takes precedence over `MURMUR_CONFIG`
/// and the default file candidates.
pub fn load_from(path: Option<&Path>) -> anyhow::Result<ClientConfig> {
    let defaults = ClientConfig::default();

    let mut builder = config::Config::builder()
        .set_default("server.api_url", defaults.server.api_url.clone())?
        .set_default("server.socket_url", defaults.server.socket_url.clone())?
        .set_default(
            "server.request_timeout_seconds",
            i64::try_from(defaults.server.request_timeout_seconds).unwrap_or(i64::MAX),
        )?
        .set_default(
            "typing.debounce_ms",
            i64::try_from(defaults.typing.debounce_ms).unwrap_or(i64::MAX),
        )?
        .set_default("stream.deduplicate_by_id", defaults.stream.deduplicate_by_id)?
        .set_default(
            "stream.near_bottom_threshold_px",
            defaults.stream.near_bottom_threshold_px,
        )?
        .set_default(
            "stream.autoscroll_delay_ms",
            i64::try_from(defaults.stream.autoscroll_delay_ms).unwrap_or(i64::MAX),
        )?;

    let environment_overrides = config::Environment::with_prefix("MURMUR").separator("__");

    let mut config_file_attached = false;

    if let Some(path) = path {
        debug!(path = %path.display(), "loading configuration from explicit path");
        builder = builder.add_source(config::File::from(path.to_path_buf()));
        config_file_attached = true;
    } else if let Ok(path) = std::env::var("MURMUR_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via MURMUR_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<ClientConfig>()
        .context("invalid configuration")?;

    if config.stream.near_bottom_threshold_px.is_sign_negative() {
        config.stream.near_bottom_threshold_px = 0.0;
    }

    debug!(?config, "loaded client configuration");
    Ok(config)
}
