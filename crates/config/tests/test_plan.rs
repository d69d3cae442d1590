//! Test plan for the `murmur-config` crate.
//!
//! These tests exercise the configuration loader across default handling,
//! file discovery, environment overrides, and validation behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use murmur_config::{load, load_from, ClientConfig, ServerConfig, StreamConfig, TypingConfig};

const ENV_VARS_TO_RESET: &[&str] = &[
    "MURMUR_CONFIG",
    "MURMUR__SERVER__API_URL",
    "MURMUR__SERVER__SOCKET_URL",
    "MURMUR__SERVER__REQUEST_TIMEOUT_SECONDS",
    "MURMUR__TYPING__DEBOUNCE_MS",
    "MURMUR__TYPING__REMOTE_EXPIRY_MS",
    "MURMUR__STREAM__DEDUPLICATE_BY_ID",
    "MURMUR__STREAM__NEAR_BOTTOM_THRESHOLD_PX",
    "MURMUR__STREAM__AUTOSCROLL_DELAY_MS",
];

struct TestContext {
    vars: Vec<(String, Option<String>)>,
    original_dir: Option<PathBuf>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            original_dir: None,
        }
    }

    fn reset_environment(&mut self) {
        for key in ENV_VARS_TO_RESET {
            self.remove_var(key);
        }
    }

    fn set_var(&mut self, key: &str, value: impl AsRef<str>) {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value.as_ref());
        self.vars.push((key.to_string(), previous));
    }

    fn remove_var(&mut self, key: &str) {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        self.vars.push((key.to_string(), previous));
    }

    fn set_current_dir(&mut self, dir: &Path) {
        if self.original_dir.is_none() {
            self.original_dir =
                Some(std::env::current_dir().expect("failed to capture current directory"));
        }
        std::env::set_current_dir(dir).expect("failed to set current directory");
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(original) = self.original_dir.take() {
            let _ = std::env::set_current_dir(original);
        }

        while let Some((key, value)) = self.vars.pop() {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn write_config_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create config directories");
    }
    fs::write(path, contents).expect("failed to write config file");
}

#[test]
#[serial]
fn load_uses_default_values_when_no_files_found() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    let config = load().expect("configuration load should succeed without files");
    let defaults = ClientConfig::default();

    assert_eq!(config.server.api_url, defaults.server.api_url);
    assert_eq!(config.server.socket_url, defaults.server.socket_url);
    assert_eq!(
        config.server.request_timeout_seconds,
        defaults.server.request_timeout_seconds
    );
    assert_eq!(config.typing.debounce_ms, 1_500);
    assert!(config.typing.remote_expiry_ms.is_none());
    assert!(!config.stream.deduplicate_by_id);
    assert_eq!(config.stream.near_bottom_threshold_px, 100.0);
    assert_eq!(config.stream.autoscroll_delay_ms, 100);
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "murmur.toml",
        r#"
        [typing]
        debounce_ms = 900
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "config/murmur.toml",
        r#"
        [typing]
        debounce_ms = 2500
        "#,
    );

    let config = load().expect("configuration load should pick the first file");
    assert_eq!(config.typing.debounce_ms, 900);
}

#[test]
#[serial]
fn load_merges_partial_file_with_defaults() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "murmur.toml",
        r#"
        [server]
        api_url = "https://chat.example.com/api"

        [stream]
        deduplicate_by_id = true
        "#,
    );

    let config = load().expect("configuration load should succeed");
    let defaults = ClientConfig::default();

    assert_eq!(config.server.api_url, "https://chat.example.com/api");
    assert_eq!(config.server.socket_url, defaults.server.socket_url);
    assert!(config.stream.deduplicate_by_id);
    assert_eq!(
        config.stream.autoscroll_delay_ms,
        defaults.stream.autoscroll_delay_ms
    );
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "murmur.toml",
        r#"
        [server]
        socket_url = "ws://file.example.com"
        "#,
    );

    ctx.set_var("MURMUR__SERVER__SOCKET_URL", "wss://env.example.com");
    ctx.set_var("MURMUR__TYPING__REMOTE_EXPIRY_MS", "5000");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.server.socket_url, "wss://env.example.com");
    assert_eq!(config.typing.remote_expiry_ms, Some(5_000));
}

#[test]
#[serial]
fn load_reads_explicit_config_path() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "elsewhere/client.toml",
        r#"
        [stream]
        near_bottom_threshold_px = 40.0
        "#,
    );
    ctx.set_var(
        "MURMUR_CONFIG",
        temp_dir.path().join("elsewhere/client.toml").display().to_string(),
    );

    let config = load().expect("configuration load should read MURMUR_CONFIG");
    assert_eq!(config.stream.near_bottom_threshold_px, 40.0);
}

#[test]
#[serial]
fn load_from_prefers_explicit_path_over_environment() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "from-env.toml",
        r#"
        [typing]
        debounce_ms = 900
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "from-cli.toml",
        r#"
        [typing]
        debounce_ms = 2500
        "#,
    );
    ctx.set_var(
        "MURMUR_CONFIG",
        temp_dir.path().join("from-env.toml").display().to_string(),
    );

    let explicit = temp_dir.path().join("from-cli.toml");
    let config = load_from(Some(explicit.as_path())).expect("explicit configuration should load");
    assert_eq!(config.typing.debounce_ms, 2_500);
}

#[test]
#[serial]
fn load_clamps_negative_threshold_to_zero() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "murmur.toml",
        r#"
        [stream]
        near_bottom_threshold_px = -20.0
        "#,
    );

    let config = load().expect("configuration load should succeed");
    assert_eq!(config.stream.near_bottom_threshold_px, 0.0);
}

#[test]
#[serial]
fn load_errors_on_invalid_toml_contents() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());

    write_config_file(
        temp_dir.path(),
        "murmur.toml",
        r#"
        [typing]
        debounce_ms = "not-a-number
        "#,
    );

    let error = load().expect_err("invalid TOML should cause load to fail");
    let message = error.to_string();
    assert!(
        message.contains("invalid configuration") || message.contains("unable to build configuration"),
        "unexpected error message: {message}"
    );
}

#[test]
fn server_config_exposes_timeout_as_duration() {
    let defaults = ServerConfig::default();
    assert_eq!(defaults.request_timeout().as_secs(), 30);
}

#[test]
fn typing_config_defaults_trust_server_stop_signal() {
    let defaults = TypingConfig::default();
    assert_eq!(defaults.debounce().as_millis(), 1_500);
    assert!(defaults.remote_expiry().is_none());
}

#[test]
fn stream_config_defaults_keep_duplicates() {
    let defaults = StreamConfig::default();
    assert!(!defaults.deduplicate_by_id);
    assert_eq!(defaults.autoscroll_delay().as_millis(), 100);
}
