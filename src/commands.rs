//! 1-Wire command bytes.

/// Conditional search; only devices in an alarm state answer.
pub const COMMAND_ALARM_SEARCH: u8 = 0xEC;
/// Read the ROM of the only device on the bus.
pub const COMMAND_ROM_READ: u8 = 0x33;
/// Select the device whose ROM follows.
pub const COMMAND_ROM_MATCH: u8 = 0x55;
/// Select every device at once.
pub const COMMAND_ROM_SKIP: u8 = 0xCC;
/// Enumerate device ROMs by elimination.
pub const COMMAND_ROM_SEARCH: u8 = 0xF0;

/// Start a temperature conversion.
pub const COMMAND_MEMORY_CONVERT: u8 = 0x44;
/// Recall TH, TL and configuration from EEPROM into the scratchpad.
pub const COMMAND_MEMORY_RECALL: u8 = 0xB8;
/// Report the power supply mode.
pub const COMMAND_MEMORY_POWER_SUPPLY_READ: u8 = 0xB4;
/// Copy TH, TL and configuration from the scratchpad to EEPROM.
pub const COMMAND_MEMORY_SCRATCHPAD_COPY: u8 = 0x48;
/// Read the scratchpad including the CRC byte.
pub const COMMAND_MEMORY_SCRATCHPAD_READ: u8 = 0xBE;
/// Write TH, TL and configuration into the scratchpad.
pub const COMMAND_MEMORY_SCRATCHPAD_WRITE: u8 = 0x4E;
