// ── Session parameters ──
//
// Everything a transport needs to open an out-of-band session:
// credentials, authentication and privilege, protocol revision, timing.

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::error::Error;

/// IPMI 1.5 session authentication type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    #[strum(serialize = "none")]
    None,
    #[strum(
        to_string = "plain",
        serialize = "straight_password_key",
        serialize = "straight_password"
    )]
    #[serde(alias = "straight_password_key")]
    Plain,
    #[strum(serialize = "md2")]
    Md2,
    #[strum(serialize = "md5")]
    Md5,
}

impl AuthType {
    /// Resolve the requested authentication type for `username`.
    ///
    /// An anonymous login (empty username) always uses `none`, whatever
    /// was requested.
    pub fn resolve(requested: &str, username: &str) -> Result<Self, Error> {
        if username.is_empty() {
            if !requested.eq_ignore_ascii_case("none") {
                debug!(requested, "empty username, authentication type forced to none");
            }
            return Ok(Self::None);
        }
        requested.parse().map_err(|_| Error::InvalidParameter {
            field: "authentication type",
            value: requested.to_owned(),
        })
    }
}

/// Requested session privilege level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum PrivilegeLevel {
    User,
    #[default]
    Operator,
    Admin,
}

impl PrivilegeLevel {
    pub fn resolve(requested: &str) -> Result<Self, Error> {
        requested.parse().map_err(|_| Error::InvalidParameter {
            field: "privilege level",
            value: requested.to_owned(),
        })
    }
}

/// LAN protocol revision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    /// IPMI 1.5 LAN.
    #[default]
    #[strum(serialize = "lan")]
    #[serde(rename = "lan")]
    Lan,
    /// IPMI 2.0 RMCP+.
    #[strum(to_string = "lan_2.0", serialize = "lanplus")]
    #[serde(rename = "lan_2.0", alias = "lanplus")]
    Lan20,
}

impl Protocol {
    pub fn resolve(requested: &str) -> Result<Self, Error> {
        requested.parse().map_err(|_| Error::InvalidParameter {
            field: "protocol",
            value: requested.to_owned(),
        })
    }
}

/// Parameters for opening one out-of-band session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub hostname: String,
    pub username: String,
    pub password: SecretString,
    pub auth_type: AuthType,
    pub privilege: PrivilegeLevel,
    pub protocol: Protocol,
    /// RMCP+ cipher suite, only meaningful for [`Protocol::Lan20`].
    pub cipher_suite_id: u8,
    pub session_timeout: Duration,
    pub retransmission_timeout: Duration,
    pub workaround_flags: u32,
    pub flags: u32,
}

impl SessionParams {
    pub const DEFAULT_CIPHER_SUITE_ID: u8 = 3;
    pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_millis(20_000);
    pub const DEFAULT_RETRANSMISSION_TIMEOUT: Duration = Duration::from_millis(1_000);
    pub const DEFAULT_WORKAROUND_FLAGS: u32 = 1;

    /// Parameters for `hostname` with default timing and no credentials.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: String::new(),
            password: SecretString::from(String::new()),
            auth_type: AuthType::None,
            privilege: PrivilegeLevel::default(),
            protocol: Protocol::default(),
            cipher_suite_id: Self::DEFAULT_CIPHER_SUITE_ID,
            session_timeout: Self::DEFAULT_SESSION_TIMEOUT,
            retransmission_timeout: Self::DEFAULT_RETRANSMISSION_TIMEOUT,
            workaround_flags: Self::DEFAULT_WORKAROUND_FLAGS,
            flags: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn auth_type_accepts_aliases() {
        assert_eq!(AuthType::resolve("plain", "root").unwrap(), AuthType::Plain);
        assert_eq!(
            AuthType::resolve("straight_password_key", "root").unwrap(),
            AuthType::Plain
        );
        assert_eq!(AuthType::resolve("MD5", "root").unwrap(), AuthType::Md5);
        assert_eq!(AuthType::Plain.to_string(), "plain");
    }

    #[test]
    fn anonymous_login_forces_none() {
        assert_eq!(AuthType::resolve("md5", "").unwrap(), AuthType::None);
        assert_eq!(AuthType::resolve("bogus", "").unwrap(), AuthType::None);
    }

    #[test]
    fn unknown_auth_type_is_rejected() {
        let err = AuthType::resolve("sha1", "root").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidParameter {
                field: "authentication type",
                ..
            }
        ));
    }

    #[test]
    fn privilege_and_protocol_parse() {
        assert_eq!(PrivilegeLevel::resolve("admin").unwrap(), PrivilegeLevel::Admin);
        assert!(PrivilegeLevel::resolve("root").is_err());
        assert_eq!(Protocol::resolve("lan_2.0").unwrap(), Protocol::Lan20);
        assert_eq!(Protocol::resolve("lan").unwrap(), Protocol::Lan);
        assert_eq!(Protocol::Lan20.to_string(), "lan_2.0");
        assert!(Protocol::resolve("serial").is_err());
    }

    #[test]
    fn defaults_match_controller_expectations() {
        let params = SessionParams::new("mch.example");
        assert_eq!(params.session_timeout, Duration::from_secs(20));
        assert_eq!(params.cipher_suite_id, 3);
        assert_eq!(params.workaround_flags, 1);
        assert_eq!(params.privilege, PrivilegeLevel::Operator);
        assert_eq!(params.protocol, Protocol::Lan);
    }
}
