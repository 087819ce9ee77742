// ── Core error types ──
//
// Errors surfaced by ipmilink-core. Transport-layer failures arrive as
// `ipmilink_api::Error` and are wrapped with the connection and sensor
// they concern, so a single log line is enough to find the hardware.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Where an error happened: which connection, and which sensor if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub connection: String,
    pub host: String,
    pub sensor: Option<SensorLabel>,
}

/// Identity of a sensor as an operator would look it up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorLabel {
    pub entity_id: u8,
    pub entity_instance: u8,
    pub id_string: String,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.connection.is_empty() && self.host.is_empty() {
            return Ok(());
        }
        write!(f, " ['{}' @ '{}'", self.connection, self.host)?;
        if let Some(sensor) = &self.sensor {
            write!(
                f,
                ", sensor {}:{} '{}'",
                sensor.entity_id, sensor.entity_instance, sensor.id_string
            )?;
        }
        f.write_str("]")
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Address errors ───────────────────────────────────────────────
    /// Malformed link, or a link naming something that does not exist.
    #[error("Invalid address '{link}': {reason}")]
    AddressSyntax { link: String, reason: String },

    // ── Transport errors ─────────────────────────────────────────────
    #[error("Transport error{context}: {source}")]
    Transport {
        context: ErrorContext,
        #[source]
        source: ipmilink_api::Error,
    },

    #[error("Device is disconnected{context}")]
    Disconnected { context: ErrorContext },

    // ── Protocol errors ──────────────────────────────────────────────
    /// Non-zero completion code or a field that does not decode.
    #[error("Protocol error{context}: {message}")]
    Protocol {
        context: ErrorContext,
        message: String,
    },

    // ── Cache errors ─────────────────────────────────────────────────
    #[error("Cache error for {}: {source}", .path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn address(link: &str, reason: impl Into<String>) -> Self {
        Self::AddressSyntax {
            link: link.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            context: ErrorContext::default(),
            message: message.into(),
        }
    }

    pub(crate) fn cache(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Cache {
            path: path.into(),
            source,
        }
    }

    /// Attach connection/sensor context, keeping any context already set.
    pub fn with_context(mut self, ctx: &ErrorContext) -> Self {
        match &mut self {
            Self::Transport { context, .. }
            | Self::Disconnected { context }
            | Self::Protocol { context, .. } => {
                if *context == ErrorContext::default() {
                    *context = ctx.clone();
                }
            }
            _ => {}
        }
        self
    }

    /// Returns `true` if the session this came from is gone.
    pub fn is_session_loss(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_session_loss(),
            Self::Disconnected { .. } => true,
            _ => false,
        }
    }

    /// The context attached to this error, if it carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Transport { context, .. }
            | Self::Disconnected { context }
            | Self::Protocol { context, .. } => Some(context),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ipmilink_api::Error> for CoreError {
    fn from(err: ipmilink_api::Error) -> Self {
        match err {
            ipmilink_api::Error::InvalidParameter { field, value } => CoreError::Config {
                message: format!("invalid {field} '{value}'"),
            },
            ipmilink_api::Error::Malformed { command, message } => {
                CoreError::protocol(format!("malformed {command} response: {message}"))
            }
            other => CoreError::Transport {
                context: ErrorContext::default(),
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext {
            connection: "crate1".into(),
            host: "mch-1".into(),
            sensor: Some(SensorLabel {
                entity_id: 30,
                entity_instance: 97,
                id_string: "CU TEMP1".into(),
            }),
        }
    }

    #[test]
    fn transport_error_carries_full_context() {
        let err = CoreError::from(ipmilink_api::Error::Command {
            code: 16,
            message: "internal IPMI error".into(),
        })
        .with_context(&ctx());

        assert!(err.is_session_loss());
        assert_eq!(
            err.to_string(),
            "Transport error ['crate1' @ 'mch-1', sensor 30:97 'CU TEMP1']: IPMI error 16: internal IPMI error"
        );
    }

    #[test]
    fn existing_context_is_not_overwritten() {
        let first = ErrorContext {
            connection: "a".into(),
            host: "h".into(),
            sensor: None,
        };
        let err = CoreError::protocol("bad").with_context(&first).with_context(&ctx());
        assert_eq!(err.context(), Some(&first));
    }

    #[test]
    fn parameter_errors_become_config_errors() {
        let err = CoreError::from(ipmilink_api::Error::InvalidParameter {
            field: "protocol",
            value: "serial".into(),
        });
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(!err.is_session_loss());
    }

    #[test]
    fn empty_context_renders_nothing() {
        assert_eq!(CoreError::protocol("x").to_string(), "Protocol error: x");
    }
}
