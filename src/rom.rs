use crate::{crc8, error::Result};

/// Lasered ROM
///
/// The permanent 64-bit address of a 1-Wire device: family code first,
/// 48-bit serial number, CRC of the preceding seven bytes last.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Rom {
    pub family_code: u8,
    pub serial_number: [u8; 6],
    pub crc: u8,
}

impl Rom {
    /// Checks the trailing CRC byte against the rest of the address.
    ///
    /// Enumeration hands out addresses as read off the wire; a collision
    /// or a device removed mid-search can produce a corrupt one, so
    /// callers that need identity guarantees verify.
    pub fn verify(&self) -> Result<()> {
        crc8::check(&<[u8; 8]>::from(*self))
    }
}

impl From<[u8; 8]> for Rom {
    fn from(value: [u8; 8]) -> Self {
        Self {
            family_code: value[0],
            serial_number: [value[1], value[2], value[3], value[4], value[5], value[6]],
            crc: value[7],
        }
    }
}

impl From<u64> for Rom {
    fn from(value: u64) -> Self {
        value.to_le_bytes().into()
    }
}

impl From<Rom> for [u8; 8] {
    fn from(value: Rom) -> Self {
        [
            value.family_code,
            value.serial_number[0],
            value.serial_number[1],
            value.serial_number[2],
            value.serial_number[3],
            value.serial_number[4],
            value.serial_number[5],
            value.crc,
        ]
    }
}

impl From<Rom> for u64 {
    fn from(value: Rom) -> Self {
        u64::from_le_bytes(value.into())
    }
}
