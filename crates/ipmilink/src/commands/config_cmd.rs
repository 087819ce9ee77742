//! Config subcommand handlers.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Serialize;
use tabled::Tabled;

use ipmilink_config as config;
use ipmilink_core::ConnectionConfig;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Views ───────────────────────────────────────────────────────────

/// A resolved connection, minus the password itself.
#[derive(Debug, Serialize)]
struct ConnectionView {
    id: String,
    hostname: String,
    username: String,
    password_set: bool,
    auth_type: String,
    protocol: String,
    privilege: String,
    cipher_suite_id: u8,
    session_timeout_ms: u64,
    retransmission_timeout_ms: u64,
    workaround_flags: u32,
    reconnect_cooldown_secs: u64,
    live_check_interval_secs: u64,
    cache_file: PathBuf,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl From<&ConnectionConfig> for ConnectionView {
    fn from(c: &ConnectionConfig) -> Self {
        let s = &c.session;
        Self {
            id: c.id.clone(),
            hostname: s.hostname.clone(),
            username: s.username.clone(),
            password_set: !s.password.expose_secret().is_empty(),
            auth_type: s.auth_type.to_string(),
            protocol: s.protocol.to_string(),
            privilege: s.privilege.to_string(),
            cipher_suite_id: s.cipher_suite_id,
            session_timeout_ms: millis(s.session_timeout),
            retransmission_timeout_ms: millis(s.retransmission_timeout),
            workaround_flags: s.workaround_flags,
            reconnect_cooldown_secs: c.reconnect_cooldown.as_secs(),
            live_check_interval_secs: c.live_check_interval.as_secs(),
            cache_file: c.cache_path(),
        }
    }
}

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Host")]
    hostname: String,
    #[tabled(rename = "User")]
    username: String,
    #[tabled(rename = "Auth")]
    auth: String,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Privilege")]
    privilege: String,
    #[tabled(rename = "Cache")]
    cache_file: String,
}

impl From<&ConnectionView> for ConnectionRow {
    fn from(v: &ConnectionView) -> Self {
        let username = if v.username.is_empty() {
            "(anonymous)".into()
        } else {
            v.username.clone()
        };
        Self {
            id: v.id.clone(),
            hostname: v.hostname.clone(),
            username,
            auth: v.auth_type.clone(),
            protocol: v.protocol.clone(),
            privilege: v.privilege.clone(),
            cache_file: v.cache_file.display().to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

fn resolved_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let path = resolved_path(global);
            let cfg = config::load_config_from(&path)?;
            let views: Vec<ConnectionView> = cfg
                .connection_configs()?
                .iter()
                .map(ConnectionView::from)
                .collect();
            if views.is_empty() && !global.quiet {
                eprintln!("No connections configured in {}", path.display());
            }
            let out = output::render_list(
                &global.output,
                &views,
                |v| ConnectionRow::from(v),
                |v| v.id.clone(),
            )?;
            output::print_output(&out, global.quiet)
        }

        ConfigCommand::Path => {
            output::print_output(&resolved_path(global).display().to_string(), global.quiet)
        }
    }
}
