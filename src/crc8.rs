pub use crate::{Error, Result};

/// Calculates the crc8 of the input data.
///
/// `CRC = X^8 + X^5 + X^4 + X^0`, reflected (0x8C), zero initial value.
pub fn calculate(data: &[u8]) -> u8 {
    let mut crc = 0;
    for byte in data {
        crc = TABLE[(crc ^ byte) as usize];
    }
    crc
}

/// Checks to see if data (including the crc byte) passes the crc check.
///
/// A nice property of this crc8 algorithm is that if you include the crc
/// value in the data it will always return 0, so it's not needed to
/// separate the data from the crc value
pub fn check(data: &[u8]) -> Result<()> {
    match calculate(data) {
        0 => Ok(()),
        crc8 => Err(Error::MismatchedCrc { crc8 }),
    }
}

const TABLE: [u8; 256] = table();

const fn table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = index as u8;
        let mut bit = 0;
        while bit < 8 {
            let feedback = crc & 0x01;
            crc >>= 1;
            if feedback != 0 {
                crc ^= 0x8C;
            }
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}
