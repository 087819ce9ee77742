//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use ipmilink_config::ConfigError;
use ipmilink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const INVALID_DATA: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Address links ────────────────────────────────────────────────
    #[error("{failed} of {total} link(s) did not parse")]
    #[diagnostic(
        code(ipmilink::invalid_link),
        help(
            "Links look like:\n  \
             crate1 SENSOR 30:97 'CU TEMP1'\n  \
             crate1 PICMG_LED 130:0\n  \
             crate1 OEM_CMD vt reboot"
        )
    )]
    InvalidLinks { failed: usize, total: usize },

    // ── Inventory cache ──────────────────────────────────────────────
    #[error("Cache file not found: {path}")]
    #[diagnostic(
        code(ipmilink::cache_not_found),
        help("Caches are written to <working dir>/iocBoot/var/ipmi/<connection>.<host>.cache")
    )]
    CacheNotFound { path: String },

    #[error("Cache file {path} is unusable: {reason}")]
    #[diagnostic(
        code(ipmilink::cache_invalid),
        help("The engine recreates an invalid cache on its next connect.")
    )]
    CacheInvalid { path: String, reason: String },

    #[error("Inventory does not decode: {message}")]
    #[diagnostic(code(ipmilink::inventory))]
    Inventory { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(ipmilink::config),
        help("Check the file printed by: ipmilink config path")
    )]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render JSON: {0}")]
    #[diagnostic(code(ipmilink::json))]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    #[diagnostic(code(ipmilink::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidLinks { .. } => exit_code::USAGE,
            Self::Config(ConfigError::UnknownConnection { .. }) | Self::CacheNotFound { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Config(_) => exit_code::CONFIG,
            Self::CacheInvalid { .. } | Self::Inventory { .. } => exit_code::INVALID_DATA,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Cache { path, source } => {
                let path = path.display().to_string();
                if source.kind() == std::io::ErrorKind::NotFound {
                    CliError::CacheNotFound { path }
                } else {
                    CliError::CacheInvalid {
                        path,
                        reason: source.to_string(),
                    }
                }
            }
            CoreError::Protocol { .. } => CliError::Inventory {
                message: err.to_string(),
            },
            CoreError::Config { .. } => CliError::Config(ConfigError::Core(err)),
            other => CliError::Internal(other.to_string()),
        }
    }
}
