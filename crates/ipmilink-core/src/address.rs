// ── Address resolution ──
//
// A record link names what to read or write, and on which connection:
//
//   <conn> SENSOR <entity-id>:<entity-instance> '<id-string>'
//   <conn> PICMG_LED <fru-slave-address>:<led-id>
//   <conn> OEM_CMD <vendor> <command> [arg ...]
//
// Keywords are case-insensitive, numbers are decimal and masked to one
// byte. Parsing is pure; it never touches a connection.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::CoreError;

const SENSOR: &str = "SENSOR";
const PICMG_LED: &str = "PICMG_LED";
const OEM_CMD: &str = "OEM_CMD";

/// Catalog lookup key for a sensor: `entityId:entityInstance:idString`.
pub fn sensor_key(entity_id: u8, entity_instance: u8, id_string: &str) -> String {
    format!("{entity_id}:{entity_instance}:{id_string}")
}

// ── Address ─────────────────────────────────────────────────────────

/// A parsed record link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Address {
    Sensor(SensorAddress),
    Led(LedAddress),
    VendorCommand(VendorCommandAddress),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SensorAddress {
    pub connection_id: String,
    pub entity_id: u8,
    pub entity_instance: u8,
    /// Verbatim, including any padding the controller reports.
    pub id_string: String,
}

impl SensorAddress {
    pub fn key(&self) -> String {
        sensor_key(self.entity_id, self.entity_instance, &self.id_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LedAddress {
    pub connection_id: String,
    pub fru_slave_address: u8,
    pub led_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VendorCommandAddress {
    pub connection_id: String,
    /// Lowercase.
    pub vendor_id: String,
    /// Lowercase.
    pub command_id: String,
    /// Lowercase, whitespace-split.
    pub args: Vec<String>,
}

impl Address {
    /// Parse one link string.
    ///
    /// A leading `@` (as found in instrument I/O links) is ignored.
    pub fn parse(link: &str) -> Result<Self, CoreError> {
        let text = link.trim();
        let text = text.strip_prefix('@').unwrap_or(text).trim_start();
        let mut cur = Cursor::new(text);

        let connection_id = cur.take_while(|c| c.is_ascii_alphanumeric());
        if connection_id.is_empty() {
            return Err(CoreError::address(link, "missing connection id"));
        }
        if cur.skip_whitespace() == 0 {
            return Err(CoreError::address(
                link,
                "expected whitespace after connection id",
            ));
        }

        let keyword = cur.take_while(|c| c.is_ascii_alphabetic() || c == '_');
        if keyword.eq_ignore_ascii_case(SENSOR) {
            parse_sensor(link, connection_id, cur)
        } else if keyword.eq_ignore_ascii_case(PICMG_LED) {
            parse_led(link, connection_id, cur)
        } else if keyword.eq_ignore_ascii_case(OEM_CMD) {
            parse_vendor_command(link, connection_id, cur)
        } else if keyword.is_empty() {
            Err(CoreError::address(link, "missing address type"))
        } else {
            Err(CoreError::address(
                link,
                format!("unknown address type '{keyword}'"),
            ))
        }
    }

    pub fn connection_id(&self) -> &str {
        match self {
            Self::Sensor(a) => &a.connection_id,
            Self::Led(a) => &a.connection_id,
            Self::VendorCommand(a) => &a.connection_id,
        }
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(a) => write!(
                f,
                "{} {SENSOR} {}:{} '{}'",
                a.connection_id, a.entity_id, a.entity_instance, a.id_string
            ),
            Self::Led(a) => write!(
                f,
                "{} {PICMG_LED} {}:{}",
                a.connection_id, a.fru_slave_address, a.led_id
            ),
            Self::VendorCommand(a) => {
                write!(f, "{} {OEM_CMD} {} {}", a.connection_id, a.vendor_id, a.command_id)?;
                for arg in &a.args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

// ── Grammars ────────────────────────────────────────────────────────

fn parse_sensor(link: &str, connection_id: &str, mut cur: Cursor<'_>) -> Result<Address, CoreError> {
    let (entity_id, entity_instance) = cur.pair(link, "entity id", "entity instance")?;
    cur.skip_whitespace();

    let quoted = cur.rest();
    let inner = quoted
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .ok_or_else(|| CoreError::address(link, "sensor id-string must be single-quoted"))?;

    Ok(Address::Sensor(SensorAddress {
        connection_id: connection_id.to_owned(),
        entity_id,
        entity_instance,
        id_string: inner.replace('\'', ""),
    }))
}

fn parse_led(link: &str, connection_id: &str, mut cur: Cursor<'_>) -> Result<Address, CoreError> {
    let (fru_slave_address, led_id) = cur.pair(link, "FRU slave address", "LED id")?;
    if !cur.rest().trim_end().is_empty() {
        return Err(CoreError::address(
            link,
            format!("unexpected trailing text '{}'", cur.rest()),
        ));
    }
    Ok(Address::Led(LedAddress {
        connection_id: connection_id.to_owned(),
        fru_slave_address,
        led_id,
    }))
}

fn parse_vendor_command(
    link: &str,
    connection_id: &str,
    mut cur: Cursor<'_>,
) -> Result<Address, CoreError> {
    if cur.skip_whitespace() == 0 {
        return Err(CoreError::address(link, "expected vendor id"));
    }
    let vendor_id = cur.take_while(|c| c.is_ascii_alphanumeric());
    if vendor_id.is_empty() {
        return Err(CoreError::address(link, "expected vendor id"));
    }
    if cur.skip_whitespace() == 0 {
        return Err(CoreError::address(link, "expected command id"));
    }
    let command_id = cur.take_while(|c| c.is_ascii_alphanumeric() || c == '-');
    if command_id.is_empty() {
        return Err(CoreError::address(link, "expected command id"));
    }

    let rest = cur.rest();
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(CoreError::address(
            link,
            format!("invalid character in command id '{command_id}{rest}'"),
        ));
    }

    let mut args = Vec::new();
    for arg in rest.split_whitespace() {
        if !arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::address(
                link,
                format!("invalid command argument '{arg}'"),
            ));
        }
        args.push(arg.to_ascii_lowercase());
    }

    Ok(Address::VendorCommand(VendorCommandAddress {
        connection_id: connection_id.to_owned(),
        vendor_id: vendor_id.to_ascii_lowercase(),
        command_id: command_id.to_ascii_lowercase(),
        args,
    }))
}

// ── Cursor ──────────────────────────────────────────────────────────

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn rest(&self) -> &'a str {
        self.rest
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let end = self.rest.find(|c: char| !pred(c)).unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        head
    }

    fn skip_whitespace(&mut self) -> usize {
        self.take_while(char::is_whitespace).len()
    }

    fn eat(&mut self, ch: char) -> bool {
        match self.rest.strip_prefix(ch) {
            Some(tail) => {
                self.rest = tail;
                true
            }
            None => false,
        }
    }

    /// A decimal number, keeping only its low byte.
    fn byte(&mut self, link: &str, field: &str) -> Result<u8, CoreError> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(CoreError::address(link, format!("expected a number for {field}")));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| CoreError::address(link, format!("{field} '{digits}' is out of range")))?;
        let [low, ..] = value.to_le_bytes();
        Ok(low)
    }

    /// `<a> : <b>` with optional spaces around the colon.
    fn pair(&mut self, link: &str, first: &str, second: &str) -> Result<(u8, u8), CoreError> {
        self.skip_whitespace();
        let a = self.byte(link, first)?;
        self.skip_whitespace();
        if !self.eat(':') {
            return Err(CoreError::address(
                link,
                format!("expected ':' between {first} and {second}"),
            ));
        }
        self.skip_whitespace();
        let b = self.byte(link, second)?;
        Ok((a, b))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sensor(link: &str) -> SensorAddress {
        match Address::parse(link).unwrap() {
            Address::Sensor(s) => s,
            other => panic!("expected sensor address, got {other:?}"),
        }
    }

    #[test]
    fn sensor_id_string_keeps_padding() {
        let s = sensor("@dev SENSOR 30:97 'CU TEMP1 '");
        assert_eq!(s.connection_id, "dev");
        assert_eq!(s.entity_id, 30);
        assert_eq!(s.entity_instance, 97);
        assert_eq!(s.id_string, "CU TEMP1 ");
        assert_eq!(s.key(), "30:97:CU TEMP1 ");
    }

    #[test]
    fn sensor_keyword_is_case_insensitive_and_spacing_flexible() {
        let a = sensor("crate1 sensor 3 : 1 'Temp'");
        let b = sensor("crate1 SeNsOr 3:1'Temp'");
        assert_eq!(a, b);
    }

    #[test]
    fn sensor_numbers_are_masked_to_one_byte() {
        let s = sensor("c SENSOR 256:513 'x'");
        assert_eq!((s.entity_id, s.entity_instance), (0, 1));
    }

    #[test]
    fn embedded_quotes_are_stripped() {
        let s = sensor("c SENSOR 1:1 'it's hot'");
        assert_eq!(s.id_string, "its hot");
    }

    #[test]
    fn led_address() {
        let addr = Address::parse("mch PICMG_LED 130:2").unwrap();
        assert_eq!(
            addr,
            Address::Led(LedAddress {
                connection_id: "mch".into(),
                fru_slave_address: 130,
                led_id: 2,
            })
        );
        assert_eq!(addr.connection_id(), "mch");
    }

    #[test]
    fn vendor_command_is_lowercased() {
        let addr = Address::parse("vt811 OEM_CMD VadaTech Set-Power-State AMC 3").unwrap();
        assert_eq!(
            addr,
            Address::VendorCommand(VendorCommandAddress {
                connection_id: "vt811".into(),
                vendor_id: "vadatech".into(),
                command_id: "set-power-state".into(),
                args: vec!["amc".into(), "3".into()],
            })
        );
    }

    #[test]
    fn vendor_command_without_args() {
        let addr = Address::parse("vt811 oem_cmd vt reboot").unwrap();
        let Address::VendorCommand(cmd) = addr else {
            panic!("expected vendor command");
        };
        assert!(cmd.args.is_empty());
        assert_eq!(cmd.command_id, "reboot");
    }

    #[test]
    fn display_round_trips() {
        for link in [
            "dev SENSOR 30:97 'CU TEMP1 '",
            "mch PICMG_LED 130:2",
            "vt811 OEM_CMD vt set-power-state amc 3",
        ] {
            let addr = Address::parse(link).unwrap();
            assert_eq!(addr.to_string(), link);
            assert_eq!(Address::parse(&addr.to_string()).unwrap(), addr);
        }
    }

    #[test]
    fn malformed_links_are_rejected() {
        for link in [
            "",
            "dev",
            "dev SENSOR 30:97 CU TEMP1",
            "dev SENSOR 30:97 'CU TEMP1",
            "dev SENSOR x:97 'a'",
            "dev SENSOR 30 97 'a'",
            "dev SENSOR 99999999999999999999999:1 'a'",
            "dev THERMAL 30:97 'a'",
            "dev PICMG_LED 130:",
            "dev PICMG_LED 130:2 extra",
            "dev OEM_CMD",
            "dev OEM_CMD vt",
            "dev OEM_CMD vt reboot!",
            "dev OEM_CMD vt reboot am$c",
            "d-ev SENSOR 1:1 'a'",
        ] {
            let err = Address::parse(link).unwrap_err();
            assert!(
                matches!(err, CoreError::AddressSyntax { .. }),
                "{link:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn from_str_matches_parse() {
        let addr: Address = "c PICMG_LED 1:0".parse().unwrap();
        assert_eq!(addr, Address::parse("c PICMG_LED 1:0").unwrap());
    }
}
