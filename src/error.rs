use thiserror::Error;

/// Result
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Error
///
/// Bus operations report one of these kinds; callers compare by identity.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("no presence pulse inside the reset slot")]
    Presence,
    #[error("there are no devices attached to the 1-Wire bus")]
    NoDevice,
    #[error("data exchange with the line driver failed")]
    Transfer,
    #[error("the line driver rejected the baudrate change")]
    Baudrate,
    #[error("invalid configuration register (resolution)")]
    ConfigurationRegister,
    #[error("family code mismatch")]
    MismatchedFamilyCode,
    #[error("CRC mismatch {{ crc8={crc8} }}")]
    MismatchedCrc { crc8: u8 },
    #[error("temperature conversion is still in progress")]
    ConversionInProgress,
    #[error("timeout expired")]
    Timeout,
    #[error("line driver initialization failed")]
    Driver,
}
