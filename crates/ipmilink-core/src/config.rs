// ── Runtime connection configuration ──
//
// These types describe *how* to reach one controller and how its
// worker paces itself. They carry credential data but never read
// config files: ipmilink-config or the embedding host builds a
// `ConnectionConfig` and hands it in.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ipmilink_api::{AuthType, PrivilegeLevel, Protocol, SessionParams};
use secrecy::SecretString;

use crate::error::CoreError;

/// Cache directory relative to the process working directory.
pub const DEFAULT_CACHE_SUBDIR: &str = "iocBoot/var/ipmi";

/// Login credentials. An empty username means an anonymous session.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            password: SecretString::from(String::new()),
        }
    }
}

/// Configuration for one controller connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection identifier used in address links.
    pub id: String,
    /// Session parameters, including the hostname.
    pub session: SessionParams,
    /// Directory holding `{id}.{hostname}.cache`.
    pub cache_dir: PathBuf,
    /// Minimum time between a disconnect and the next reconnect attempt.
    pub reconnect_cooldown: Duration,
    /// How often the catalog compares its header with the live controller.
    pub live_check_interval: Duration,
    /// How long the worker waits for work before running maintenance again.
    pub idle_interval: Duration,
}

impl ConnectionConfig {
    pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(60);
    pub const DEFAULT_LIVE_CHECK_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(id: impl Into<String>, session: SessionParams) -> Self {
        Self {
            id: id.into(),
            session,
            cache_dir: default_cache_dir(),
            reconnect_cooldown: Self::DEFAULT_RECONNECT_COOLDOWN,
            live_check_interval: Self::DEFAULT_LIVE_CHECK_INTERVAL,
            idle_interval: Self::DEFAULT_IDLE_INTERVAL,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn hostname(&self) -> &str {
        &self.session.hostname
    }

    pub fn cache_path(&self) -> PathBuf {
        cache_path(&self.cache_dir, &self.id, self.hostname())
    }

    /// Reject configurations no address link could ever name.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.is_empty() || !self.id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CoreError::Config {
                message: format!(
                    "connection id '{}' must be non-empty and alphanumeric",
                    self.id
                ),
            });
        }
        if self.hostname().trim().is_empty() {
            return Err(CoreError::Config {
                message: format!("connection '{}' has no hostname", self.id),
            });
        }
        Ok(())
    }
}

/// `{dir}/{connection}.{hostname}.cache`
pub fn cache_path(dir: &Path, connection: &str, hostname: &str) -> PathBuf {
    dir.join(format!("{connection}.{hostname}.cache"))
}

/// `<working dir>/iocBoot/var/ipmi`, or the relative path if the working
/// directory is unavailable.
pub fn default_cache_dir() -> PathBuf {
    std::env::current_dir()
        .map(|cwd| cwd.join(DEFAULT_CACHE_SUBDIR))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_SUBDIR))
}

/// Build session parameters from the string options a host passes to
/// `connect`. Unknown authentication types, protocols or privilege
/// levels are configuration errors.
pub fn session_params(
    hostname: &str,
    credentials: Credentials,
    auth_type: &str,
    protocol: &str,
    privilege: &str,
) -> Result<SessionParams, CoreError> {
    let auth_type = AuthType::resolve(auth_type, &credentials.username)?;
    let protocol = Protocol::resolve(protocol)?;
    let privilege = PrivilegeLevel::resolve(privilege)?;

    Ok(SessionParams {
        username: credentials.username,
        password: credentials.password,
        auth_type,
        privilege,
        protocol,
        ..SessionParams::new(hostname)
    })
}
