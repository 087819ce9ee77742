//! `ipmilink address`: parse record links offline.

use serde::Serialize;
use tabled::Tabled;

use ipmilink_core::{Address, CoreError};

use crate::cli::{AddressArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LinkReport {
    link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl LinkReport {
    fn parse(link: &str) -> Self {
        match Address::parse(link) {
            Ok(address) => Self {
                link: link.to_owned(),
                address: Some(address),
                error: None,
            },
            Err(CoreError::AddressSyntax { reason, .. }) => Self::failed(link, reason),
            Err(e) => Self::failed(link, e.to_string()),
        }
    }

    fn failed(link: &str, reason: String) -> Self {
        Self {
            link: link.to_owned(),
            address: None,
            error: Some(reason),
        }
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Link")]
    link: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Connection")]
    connection: String,
    #[tabled(rename = "Target")]
    target: String,
}

impl LinkRow {
    fn new(report: &LinkReport, color: bool) -> Self {
        let Some(address) = &report.address else {
            return Self {
                link: report.link.clone(),
                status: output::bad("invalid", color),
                kind: String::new(),
                connection: String::new(),
                target: report.error.clone().unwrap_or_default(),
            };
        };
        let (kind, target) = match address {
            Address::Sensor(a) => ("sensor", a.key()),
            Address::Led(a) => (
                "led",
                format!("fru {} led {}", a.fru_slave_address, a.led_id),
            ),
            Address::VendorCommand(a) => {
                let mut words = vec![a.vendor_id.as_str(), a.command_id.as_str()];
                words.extend(a.args.iter().map(String::as_str));
                ("vendor command", words.join(" "))
            }
        };
        Self {
            link: report.link.clone(),
            status: output::ok("ok", color),
            kind: kind.into(),
            connection: address.connection_id().into(),
            target,
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: &AddressArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let reports: Vec<LinkReport> = args.links.iter().map(|l| LinkReport::parse(l)).collect();
    let color = output::should_color(&global.color);

    let out = output::render_list(
        &global.output,
        &reports,
        |r| LinkRow::new(r, color),
        |r| match (&r.address, &r.error) {
            (Some(address), _) => address.to_string(),
            (None, error) => format!("error: {}", error.as_deref().unwrap_or_default()),
        },
    )?;
    output::print_output(&out, global.quiet)?;

    let failed = reports.iter().filter(|r| r.address.is_none()).count();
    if failed > 0 {
        return Err(CliError::InvalidLinks {
            failed,
            total: reports.len(),
        });
    }
    Ok(())
}
