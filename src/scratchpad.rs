use crate::{
    crc8,
    error::{Error, Result},
};

const NINE: u8 = 0x00;
const TEN: u8 = 0x20;
const ELEVEN: u8 = 0x40;
const TWELVE: u8 = 0x60;

/// Bits 5..6 of the configuration register hold the resolution.
const RESOLUTION_MASK: u8 = 0x60;

/// Temperature resolution: 9, 10, 11 or 12 bits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Resolution {
    Nine,
    Ten,
    Eleven,
    #[default]
    Twelve,
}

impl Resolution {
    /// Decodes bits 5..6 of the configuration register.
    pub fn from_config(config: u8) -> Self {
        match config & RESOLUTION_MASK {
            NINE => Self::Nine,
            TEN => Self::Ten,
            ELEVEN => Self::Eleven,
            _ => Self::Twelve,
        }
    }

    /// The resolution bits, positioned for the configuration register.
    pub fn config_bits(&self) -> u8 {
        match self {
            Self::Nine => NINE,
            Self::Ten => TEN,
            Self::Eleven => ELEVEN,
            Self::Twelve => TWELVE,
        }
    }

    /// Number of bits, `9..=12`.
    pub fn bits(&self) -> u8 {
        match self {
            Self::Nine => 9,
            Self::Ten => 10,
            Self::Eleven => 11,
            Self::Twelve => 12,
        }
    }

    /// Worst-case conversion time of a DS18B20 in milliseconds.
    pub fn max_conversion_time_ms(&self) -> u16 {
        match self {
            Self::Nine => 94,
            Self::Ten => 188,
            Self::Eleven => 375,
            Self::Twelve => 750,
        }
    }
}

impl TryFrom<u8> for Resolution {
    type Error = Error;

    /// Number of bits, `9..=12`.
    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            9 => Ok(Self::Nine),
            10 => Ok(Self::Ten),
            11 => Ok(Self::Eleven),
            12 => Ok(Self::Twelve),
            _ => Err(Error::ConfigurationRegister),
        }
    }
}

/// Decoded view of the nine scratchpad bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Scratchpad {
    pub temperature: f32,
    /// Alarm high trigger register (TH)
    pub alarm_high_trigger: i8,
    /// Alarm low trigger register (TL)
    pub alarm_low_trigger: i8,
    pub resolution: Resolution,
    pub crc: u8,
}

impl TryFrom<[u8; 9]> for Scratchpad {
    type Error = Error;

    fn try_from(value: [u8; 9]) -> Result<Self> {
        crc8::check(&value)?;
        let resolution = Resolution::from_config(value[4]);
        Ok(Scratchpad {
            temperature: temperature(value[0], value[1], resolution),
            alarm_high_trigger: value[2] as _,
            alarm_low_trigger: value[3] as _,
            resolution,
            crc: value[8],
        })
    }
}

/// Decodes the raw temperature word in degrees Celsius.
///
/// Integer degrees live in bits 4..10 of the magnitude; the fraction
/// occupies as many of bits 0..3 as the resolution provides, in steps of
/// 0.5 down to 0.0625 degrees.
pub fn temperature(lsb: u8, msb: u8, resolution: Resolution) -> f32 {
    let raw = u16::from_le_bytes([lsb, msb]);
    let (raw, negative) = if raw & 0x8000 != 0 {
        ((!raw).wrapping_add(1), true)
    } else {
        (raw, false)
    };
    let integer = (raw >> 4 & 0x7F) as f32;
    let fraction = match resolution {
        Resolution::Nine => (raw >> 3 & 0x01) as f32 * 0.5,
        Resolution::Ten => (raw >> 2 & 0x03) as f32 * 0.25,
        Resolution::Eleven => (raw >> 1 & 0x07) as f32 * 0.125,
        Resolution::Twelve => (raw & 0x0F) as f32 * 0.0625,
    };
    let degrees = integer + fraction;
    if negative {
        -degrees
    } else {
        degrees
    }
}
