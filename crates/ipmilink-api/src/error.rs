use thiserror::Error;

/// Top-level error type for the `ipmilink-api` crate.
///
/// Covers every failure mode a transport can report: session setup,
/// command exchange, and response decoding. `ipmilink-core` attaches
/// connection and sensor context before surfacing these to callers.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// The out-of-band session could not be opened (bad credentials,
    /// unreachable host, unsupported cipher suite...).
    #[error("Cannot open session to {host}: {message}")]
    SessionOpen { host: String, message: String },

    /// A command was issued while no session was open.
    #[error("No session is open")]
    NotConnected,

    /// A session parameter string was not recognised.
    #[error("Invalid {field} '{value}'")]
    InvalidParameter { field: &'static str, value: String },

    // ── Transport ───────────────────────────────────────────────────
    /// The codec reported a failure with a numeric diagnostic code.
    #[error("IPMI error {code}: {message}")]
    Command { code: i32, message: String },

    /// No response within the retransmission budget.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Data ────────────────────────────────────────────────────────
    /// The response could not be decoded into the expected shape.
    #[error("Malformed {command} response: {message}")]
    Malformed {
        command: &'static str,
        message: String,
    },
}

impl Error {
    /// Diagnostic code the codec uses when the session has silently
    /// expired on the controller side.
    pub const SESSION_TIMEOUT_CODE: i32 = 16;

    /// Diagnostic code for "sensor reading unavailable".
    pub const READING_UNAVAILABLE_CODE: i32 = 5;

    /// Returns `true` if the session is dead and must be re-established.
    ///
    /// Not every read failure means the session is gone: a sensor that
    /// is still initialising reports its own code and the session stays up.
    pub fn is_session_loss(&self) -> bool {
        match self {
            Self::Command { code, .. } => *code == Self::SESSION_TIMEOUT_CODE,
            Self::NotConnected | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SessionOpen { .. } | Self::Timeout { .. }) || self.is_session_loss()
    }

    /// Extract the codec's diagnostic code, if available.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Command { code, .. } => Some(*code),
            _ => None,
        }
    }
}
