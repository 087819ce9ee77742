// ── Typed command responses ──
//
// What the codec hands back for each command the engine issues. Every
// response carries the controller's completion code; callers decide
// whether a non-zero code is fatal.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Successful completion code.
pub const COMPLETION_OK: u8 = 0x00;

/// Net functions the engine addresses directly through [`crate::IpmiTransport::raw`].
pub mod net_fn {
    pub const OEM_GROUP_RQ: u8 = 0x2E;
}

/// Record id that starts an SDR walk.
pub const SDR_FIRST_RECORD: u16 = 0x0000;
/// `next_record_id` value marking the end of the repository.
pub const SDR_LAST_RECORD: u16 = 0xFFFF;

/// Destination of a bridged (IPMB) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IpmbTarget {
    pub channel: u8,
    /// 8-bit slave address (7-bit address shifted left by one).
    pub slave_address: u8,
    pub lun: u8,
}

impl IpmbTarget {
    /// BMC LUN on the primary IPMB channel.
    pub const LUN_BMC: u8 = 0x00;
    pub const CHANNEL_PRIMARY_IPMB: u8 = 0x00;
    /// The BMC's own slave address. Requests here are not bridged.
    pub const BMC_SLAVE_ADDRESS: u8 = 0x20;

    pub const fn new(channel: u8, slave_address: u8, lun: u8) -> Self {
        Self {
            channel,
            slave_address,
            lun,
        }
    }

    /// The local BMC.
    pub const fn bmc() -> Self {
        Self::new(
            Self::CHANNEL_PRIMARY_IPMB,
            Self::BMC_SLAVE_ADDRESS,
            Self::LUN_BMC,
        )
    }
}

/// Response to "Get SDR Repository Info".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SdrRepositoryInfo {
    pub completion_code: u8,
    /// SDR version in BCD (0x51 = 1.5).
    pub sdr_version: u8,
    pub record_count: u16,
    pub free_space: u16,
    /// Seconds since the epoch.
    pub most_recent_addition: u32,
    /// Seconds since the epoch.
    pub most_recent_erase: u32,
}

/// Response to "Get SDR": one raw record plus the id of the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdrEntry {
    pub completion_code: u8,
    pub next_record_id: u16,
    pub data: Bytes,
}

/// Response to "Get Sensor Reading".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorReading {
    pub completion_code: u8,
    /// Raw analog reading byte.
    pub raw: u8,
    pub reading_unavailable: bool,
    pub scanning_enabled: bool,
    /// Discrete state bits (threshold comparison status for threshold sensors).
    pub event_mask: u16,
}

/// Response to "Get Sensor Thresholds". Raw, unscaled values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorThresholds {
    pub completion_code: u8,
    /// Bit 0 lnc, 1 lc, 2 lnr, 3 unc, 4 uc, 5 unr.
    pub readable: u8,
    pub lower_non_critical: u8,
    pub lower_critical: u8,
    pub lower_non_recoverable: u8,
    pub upper_non_critical: u8,
    pub upper_critical: u8,
    pub upper_non_recoverable: u8,
}

/// Response to "Get Sensor Hysteresis". Raw counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorHysteresis {
    pub completion_code: u8,
    pub positive_going: u8,
    pub negative_going: u8,
}

/// Response to PICMG "Get FRU LED Properties".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedProperties {
    pub completion_code: u8,
    /// Bit n set: status LED n (0..=3) is present.
    pub status_leds: u8,
    pub application_leds: u8,
}

/// Response to PICMG "Get LED Color Capabilities".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedColorCapabilities {
    pub completion_code: u8,
    /// Bit n set: color n supported (1 blue ... 6 white).
    pub colors: u8,
    pub default_local_color: u8,
    pub default_override_color: u8,
}

/// Response to PICMG "Get FRU LED State".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedState {
    pub completion_code: u8,
    /// Bit 0 local control enabled, bit 1 override enabled, bit 2 lamp test.
    pub states: u8,
    pub local_function: u8,
    pub local_on_duration: u8,
    pub local_color: u8,
    pub override_function: u8,
    pub override_on_duration: u8,
    pub override_color: u8,
}

impl LedState {
    const OVERRIDE_ENABLED: u8 = 0x02;

    pub fn override_active(&self) -> bool {
        self.states & Self::OVERRIDE_ENABLED != 0
    }

    /// `(function, color)` currently driving the LED.
    pub fn effective(&self) -> (u8, u8) {
        if self.override_active() {
            (self.override_function, self.override_color)
        } else {
            (self.local_function, self.local_color)
        }
    }
}
