//! Shared configuration for ipmilink hosts and the operator CLI.
//!
//! TOML connection profiles, credential resolution (env + plaintext),
//! and translation to `ipmilink_core::ConnectionConfig`. Nothing here
//! opens a session; the registry does that once it is handed a config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use ipmilink_api::SessionParams;
use ipmilink_core::{ConnectionConfig, CoreError, Credentials, session_params};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no connection named '{id}' is configured")]
    UnknownConnection { id: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Values every connection inherits unless it overrides them.
    #[serde(default)]
    pub defaults: Defaults,

    /// Controller connections keyed by the id used in address links.
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Inventory cache directory. Unset means `<cwd>/iocBoot/var/ipmi`.
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_auth_type")]
    pub auth_type: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_privilege")]
    pub privilege: String,

    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    #[serde(default = "default_retransmission_timeout_ms")]
    pub retransmission_timeout_ms: u64,

    #[serde(default = "default_workaround_flags")]
    pub workaround_flags: u32,

    #[serde(default = "default_reconnect_cooldown_secs")]
    pub reconnect_cooldown_secs: u64,

    #[serde(default = "default_live_check_interval_secs")]
    pub live_check_interval_secs: u64,

    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            cache_dir: None,
            auth_type: default_auth_type(),
            protocol: default_protocol(),
            privilege: default_privilege(),
            session_timeout_ms: default_session_timeout_ms(),
            retransmission_timeout_ms: default_retransmission_timeout_ms(),
            workaround_flags: default_workaround_flags(),
            reconnect_cooldown_secs: default_reconnect_cooldown_secs(),
            live_check_interval_secs: default_live_check_interval_secs(),
            idle_interval_ms: default_idle_interval_ms(),
        }
    }
}

fn default_auth_type() -> String {
    "none".into()
}
fn default_protocol() -> String {
    "lan".into()
}
fn default_privilege() -> String {
    "operator".into()
}
fn default_session_timeout_ms() -> u64 {
    duration_ms(SessionParams::DEFAULT_SESSION_TIMEOUT)
}
fn default_retransmission_timeout_ms() -> u64 {
    duration_ms(SessionParams::DEFAULT_RETRANSMISSION_TIMEOUT)
}
fn default_workaround_flags() -> u32 {
    SessionParams::DEFAULT_WORKAROUND_FLAGS
}
fn default_reconnect_cooldown_secs() -> u64 {
    ConnectionConfig::DEFAULT_RECONNECT_COOLDOWN.as_secs()
}
fn default_live_check_interval_secs() -> u64 {
    ConnectionConfig::DEFAULT_LIVE_CHECK_INTERVAL.as_secs()
}
fn default_idle_interval_ms() -> u64 {
    duration_ms(ConnectionConfig::DEFAULT_IDLE_INTERVAL)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// One controller connection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConnectionProfile {
    /// Controller hostname or IP address.
    pub hostname: String,

    /// Login name. Missing or empty means an anonymous session.
    pub username: Option<String>,

    /// Password (plaintext, prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    pub auth_type: Option<String>,
    pub protocol: Option<String>,
    pub privilege: Option<String>,

    /// RMCP+ cipher suite for `lan_2.0`.
    pub cipher_suite_id: Option<u8>,

    pub session_timeout_ms: Option<u64>,
    pub retransmission_timeout_ms: Option<u64>,
    pub workaround_flags: Option<u32>,

    /// Overrides `defaults.cache_dir`.
    pub cache_dir: Option<PathBuf>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "ipmilink", "ipmilink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ipmilink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment.
///
/// Environment variables use a double underscore between levels, e.g.
/// `IPMILINK_DEFAULTS__SESSION_TIMEOUT_MS=30000`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("IPMILINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password: named env var first, then plaintext config.
/// Neither is an empty password.
pub fn resolve_password(profile: &ConnectionProfile, id: &str) -> SecretString {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        match std::env::var(env_name) {
            Ok(val) => return SecretString::from(val),
            Err(_) => debug!(connection = id, env = %env_name, "password variable not set"),
        }
    }

    // 2. Plaintext in config
    if let Some(ref pw) = profile.password {
        return SecretString::from(pw.clone());
    }

    SecretString::from(String::new())
}

pub fn resolve_credentials(profile: &ConnectionProfile, id: &str) -> Credentials {
    let username = profile.username.clone().unwrap_or_default();
    if username.is_empty() {
        return Credentials::anonymous();
    }
    Credentials {
        username,
        password: resolve_password(profile, id),
    }
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ConnectionConfig` from a profile, filling gaps from `defaults`.
pub fn profile_to_connection_config(
    id: &str,
    profile: &ConnectionProfile,
    defaults: &Defaults,
) -> Result<ConnectionConfig, ConfigError> {
    let session_timeout_ms = profile
        .session_timeout_ms
        .unwrap_or(defaults.session_timeout_ms);
    if session_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            field: "session_timeout_ms".into(),
            reason: format!("connection '{id}' needs a non-zero session timeout"),
        });
    }

    let mut session = session_params(
        &profile.hostname,
        resolve_credentials(profile, id),
        profile.auth_type.as_deref().unwrap_or(&defaults.auth_type),
        profile.protocol.as_deref().unwrap_or(&defaults.protocol),
        profile.privilege.as_deref().unwrap_or(&defaults.privilege),
    )?;
    session.session_timeout = Duration::from_millis(session_timeout_ms);
    session.retransmission_timeout = Duration::from_millis(
        profile
            .retransmission_timeout_ms
            .unwrap_or(defaults.retransmission_timeout_ms),
    );
    session.workaround_flags = profile
        .workaround_flags
        .unwrap_or(defaults.workaround_flags);
    if let Some(suite) = profile.cipher_suite_id {
        session.cipher_suite_id = suite;
    }

    let mut config = ConnectionConfig::new(id, session);
    if let Some(dir) = profile.cache_dir.as_ref().or(defaults.cache_dir.as_ref()) {
        config = config.with_cache_dir(dir);
    }
    config.reconnect_cooldown = Duration::from_secs(defaults.reconnect_cooldown_secs);
    config.live_check_interval = Duration::from_secs(defaults.live_check_interval_secs);
    config.idle_interval = Duration::from_millis(defaults.idle_interval_ms);

    config.validate()?;
    Ok(config)
}

impl Config {
    /// Translate one named connection.
    pub fn connection(&self, id: &str) -> Result<ConnectionConfig, ConfigError> {
        let profile = self
            .connections
            .get(id)
            .ok_or_else(|| ConfigError::UnknownConnection { id: id.into() })?;
        profile_to_connection_config(id, profile, &self.defaults)
    }

    /// Translate every connection, in id order. Stops at the first
    /// invalid profile.
    pub fn connection_configs(&self) -> Result<Vec<ConnectionConfig>, ConfigError> {
        self.connections
            .iter()
            .map(|(id, profile)| profile_to_connection_config(id, profile, &self.defaults))
            .collect()
    }
}
