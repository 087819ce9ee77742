// ── Sensor value scaling ──
//
// Converts raw one-byte readings, thresholds and hysteresis counts into
// physical units using the decoding parameters of a full sensor record:
//
//   y = L[(M * x + B * 10^Bexp) * 10^Rexp]
//
// Hysteresis uses `M * x` only. Applying the offset to hysteresis
// produces wrong values on real controllers.

use serde::Serialize;
use strum::Display;

use crate::error::CoreError;

/// How the raw byte encodes its sign (sensor units 1, bits 7:6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AnalogFormat {
    Unsigned,
    OnesComplement,
    TwosComplement,
    /// No analog reading. Thresholds are still decoded as two's complement.
    NotAnalog,
}

impl AnalogFormat {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Unsigned,
            1 => Self::OnesComplement,
            2 => Self::TwosComplement,
            _ => Self::NotAnalog,
        }
    }
}

/// Non-linear transform applied after the linear formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Linearization {
    Linear,
    Ln,
    Log10,
    Log2,
    E,
    Exp10,
    Exp2,
    Inverse,
    Sqr,
    Cube,
    Sqrt,
    CubeRoot,
    /// OEM or reserved code; the value is left untouched.
    #[strum(to_string = "oem({0:#04x})")]
    Other(u8),
}

impl Linearization {
    pub fn from_code(code: u8) -> Self {
        match code & 0x7F {
            0 => Self::Linear,
            1 => Self::Ln,
            2 => Self::Log10,
            3 => Self::Log2,
            4 => Self::E,
            5 => Self::Exp10,
            6 => Self::Exp2,
            7 => Self::Inverse,
            8 => Self::Sqr,
            9 => Self::Cube,
            10 => Self::Sqrt,
            11 => Self::CubeRoot,
            other => Self::Other(other),
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Ln => x.ln(),
            Self::Log10 => x.log10(),
            Self::Log2 => x.log2(),
            Self::E => x.exp(),
            Self::Exp10 => 10_f64.powf(x),
            Self::Exp2 => x.exp2(),
            Self::Inverse if x != 0.0 => 1.0 / x,
            Self::Sqr => x * x,
            Self::Cube => x * x * x,
            Self::Sqrt => x.sqrt(),
            Self::CubeRoot => x.cbrt(),
            Self::Linear | Self::Inverse | Self::Other(_) => x,
        }
    }
}

/// Decoding parameters of a full sensor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodingParams {
    pub analog_format: AnalogFormat,
    pub linearization: Linearization,
    pub m: i16,
    pub b: i16,
    pub r_exponent: i8,
    pub b_exponent: i8,
}

impl DecodingParams {
    /// Identity scaling: unsigned, `m = 1`, no offset, linear.
    pub const IDENTITY: Self = Self {
        analog_format: AnalogFormat::Unsigned,
        linearization: Linearization::Linear,
        m: 1,
        b: 0,
        r_exponent: 0,
        b_exponent: 0,
    };

    /// Scale a raw threshold or reading byte with the full formula.
    pub fn scale(&self, raw: u8) -> f64 {
        let x = match self.analog_format {
            AnalogFormat::Unsigned => f64::from(raw),
            AnalogFormat::OnesComplement => {
                let adjusted = if raw & 0x80 != 0 {
                    raw.wrapping_add(1)
                } else {
                    raw
                };
                f64::from(as_signed(adjusted))
            }
            AnalogFormat::TwosComplement | AnalogFormat::NotAnalog => f64::from(as_signed(raw)),
        };

        let mut y = x * f64::from(self.m);
        y += f64::from(self.b) * 10_f64.powi(i32::from(self.b_exponent));
        y *= 10_f64.powi(i32::from(self.r_exponent));
        self.linearization.apply(y)
    }

    /// Scale a raw hysteresis count: sign by format, then `* m`.
    pub fn scale_hysteresis(&self, raw: u8) -> Result<f64, CoreError> {
        let x = match self.analog_format {
            AnalogFormat::Unsigned => f64::from(raw),
            AnalogFormat::TwosComplement => {
                if raw & 0x80 != 0 {
                    -f64::from((!raw).wrapping_add(1))
                } else {
                    f64::from(raw)
                }
            }
            AnalogFormat::OnesComplement => {
                return Err(CoreError::protocol(
                    "cannot scale hysteresis: one's complement analog format is not supported",
                ));
            }
            AnalogFormat::NotAnalog => {
                return Err(CoreError::protocol(
                    "cannot scale hysteresis: sensor has no analog reading",
                ));
            }
        };
        Ok(x * f64::from(self.m))
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn as_signed(raw: u8) -> i8 {
    i8::from_ne_bytes([raw])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn params(format: AnalogFormat, m: i16, b: i16, r_exp: i8, b_exp: i8) -> DecodingParams {
        DecodingParams {
            analog_format: format,
            linearization: Linearization::Linear,
            m,
            b,
            r_exponent: r_exp,
            b_exponent: b_exp,
        }
    }

    #[test]
    fn identity_fixture_yields_raw_value() {
        assert_eq!(round2(DecodingParams::IDENTITY.scale(42)), 42.00);
    }

    #[test]
    fn linear_formula_with_offset_and_exponents() {
        // (2 * 100 + 5 * 10^1) * 10^-1 = 25.0
        let p = params(AnalogFormat::Unsigned, 2, 5, -1, 1);
        assert_eq!(round2(p.scale(100)), 25.0);
    }

    #[test]
    fn signed_formats() {
        let twos = params(AnalogFormat::TwosComplement, 1, 0, 0, 0);
        assert_eq!(twos.scale(0xFE), -2.0);

        // One's complement 0xFE is -1.
        let ones = params(AnalogFormat::OnesComplement, 1, 0, 0, 0);
        assert_eq!(ones.scale(0xFE), -1.0);
        assert_eq!(ones.scale(0x05), 5.0);
    }

    #[test]
    fn linearizations() {
        let mut p = DecodingParams::IDENTITY;
        p.linearization = Linearization::from_code(8);
        assert_eq!(p.scale(3), 9.0);
        p.linearization = Linearization::from_code(7);
        assert_eq!(p.scale(4), 0.25);
        assert_eq!(p.scale(0), 0.0);
        p.linearization = Linearization::from_code(10);
        assert_eq!(p.scale(16), 4.0);
        p.linearization = Linearization::from_code(0x70);
        assert_eq!(p.linearization, Linearization::Other(0x70));
        assert_eq!(p.scale(16), 16.0);
    }

    #[test]
    fn hysteresis_ignores_offset() {
        let p = params(AnalogFormat::Unsigned, 2, 100, 0, 3);
        assert_eq!(p.scale_hysteresis(3).unwrap(), 6.0);

        let twos = params(AnalogFormat::TwosComplement, 1, 0, 0, 0);
        assert_eq!(twos.scale_hysteresis(0xFD).unwrap(), -3.0);
    }

    #[test]
    fn hysteresis_rejects_unsupported_formats() {
        let ones = params(AnalogFormat::OnesComplement, 1, 0, 0, 0);
        assert!(matches!(
            ones.scale_hysteresis(1),
            Err(CoreError::Protocol { .. })
        ));
        let none = params(AnalogFormat::NotAnalog, 1, 0, 0, 0);
        assert!(none.scale_hysteresis(1).is_err());
    }

    #[test]
    fn rounding() {
        assert_eq!(round2(21.456), 21.46);
        assert_eq!(round2(-0.004), -0.0);
    }
}
