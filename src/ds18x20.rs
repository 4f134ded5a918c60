//! DS18B20/DS18S20 temperature sensor operations.
//!
//! Every operation resets the bus, addresses the target (or all devices
//! when no ROM is given), and issues the function command. Operations come
//! in `_raw` and thread-safe pairs like the bus primitives they are built
//! from.

use crate::{
    commands::{
        COMMAND_ALARM_SEARCH, COMMAND_MEMORY_CONVERT, COMMAND_MEMORY_POWER_SUPPLY_READ,
        COMMAND_MEMORY_RECALL, COMMAND_MEMORY_SCRATCHPAD_COPY, COMMAND_MEMORY_SCRATCHPAD_READ,
        COMMAND_MEMORY_SCRATCHPAD_WRITE,
    },
    error::{Error, Result},
    link::Link,
    mutex::BusMutex,
    rom::Rom,
    scratchpad::{Resolution, Scratchpad},
    OneWire,
};
use log::warn;

/// The DS18B20 family code (configurable resolution).
pub const DS18B20_FAMILY_CODE: u8 = 0x28;
/// The DS18S20 family code (fixed 9-bit resolution).
pub const DS18S20_FAMILY_CODE: u8 = 0x10;

/// Lowest measurable temperature and alarm threshold, degrees Celsius.
pub const TEMP_MIN: i8 = -55;
/// Highest measurable temperature and alarm threshold, degrees Celsius.
pub const TEMP_MAX: i8 = 125;

/// In-band threshold sentinel: disable the alarm.
pub const ALARM_DISABLE: i8 = -128;
/// In-band threshold sentinel: keep the stored value.
pub const ALARM_NOCHANGE: i8 = -127;

const READ_SLOT_DURATION_MICROS: u16 = 70;

/// An alarm threshold selection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Alarm {
    /// Park the threshold at the end of the measurable range so it can
    /// never trigger.
    Disable,
    /// Keep the byte currently stored in the scratchpad.
    NoChange,
    /// Trigger temperature in degrees Celsius, clamped to
    /// [[`TEMP_MIN`], [`TEMP_MAX`]].
    Value(i8),
}

impl From<i8> for Alarm {
    /// Maps the in-band sentinels −128 (disable) and −127 (no change);
    /// every other value is a plain threshold.
    fn from(value: i8) -> Self {
        match value {
            ALARM_DISABLE => Self::Disable,
            ALARM_NOCHANGE => Self::NoChange,
            value => Self::Value(value),
        }
    }
}

impl Alarm {
    /// The byte to store given the currently stored one; `high` selects
    /// which end of the range a disabled threshold parks at.
    fn resolve(self, stored: i8, high: bool) -> i8 {
        match self {
            Self::NoChange => stored,
            Self::Disable if high => TEMP_MAX,
            Self::Disable => TEMP_MIN,
            Self::Value(value) => value.clamp(TEMP_MIN, TEMP_MAX),
        }
    }
}

/// Checks if a ROM address belongs to a DS18B20.
pub fn is_b(rom: &Rom) -> bool {
    rom.family_code == DS18B20_FAMILY_CODE
}

/// Checks if a ROM address belongs to a DS18S20.
pub fn is_s(rom: &Rom) -> bool {
    rom.family_code == DS18S20_FAMILY_CODE
}

/// Worst-case conversion time in milliseconds; how long to wait between
/// starting a conversion and reading the temperature back.
///
/// A DS18S20 always converts at its fixed resolution and takes the full
/// 750 ms.
pub fn conversion_time_ms(rom: &Rom, resolution: Resolution) -> u16 {
    if is_b(rom) {
        resolution.max_conversion_time_ms()
    } else {
        750
    }
}

impl<L: Link, M: BusMutex> OneWire<L, M> {
    /// Starts a temperature conversion.
    ///
    /// With no ROM this is the broadcast form: every device on the bus
    /// starts converting at once.
    pub fn ds18x20_start_raw(&mut self, rom: Option<&Rom>) -> Result<()> {
        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_CONVERT)?;
        Ok(())
    }

    /// Thread-safe [`OneWire::ds18x20_start_raw`].
    pub fn ds18x20_start(&mut self, rom: Option<&Rom>) -> Result<()> {
        self.locked(|bus| bus.ds18x20_start_raw(rom))
    }

    /// Reads the temperature measured by an earlier conversion.
    ///
    /// The conversion status is polled first: a device still converting
    /// answers read slots with 0 and the call fails with
    /// [`Error::ConversionInProgress`] without resetting the bus, so the
    /// caller can simply retry later. A scratchpad that fails its CRC
    /// check is also a retryable failure.
    pub fn ds18x20_read_raw(&mut self, rom: Option<&Rom>) -> Result<f32> {
        if let Some(rom) = rom {
            if !is_b(rom) && !is_s(rom) {
                return Err(Error::MismatchedFamilyCode);
            }
        }
        if !self.read_bit_raw()? {
            return Err(Error::ConversionInProgress);
        }
        let scratchpad = self.ds18x20_read_scratchpad_raw(rom)?;
        Ok(scratchpad.temperature)
    }

    /// Thread-safe [`OneWire::ds18x20_read_raw`].
    pub fn ds18x20_read(&mut self, rom: Option<&Rom>) -> Result<f32> {
        self.locked(|bus| bus.ds18x20_read_raw(rom))
    }

    /// Reads and decodes the whole scratchpad, CRC included.
    pub fn ds18x20_read_scratchpad_raw(&mut self, rom: Option<&Rom>) -> Result<Scratchpad> {
        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_READ)?;
        let mut bytes = [0; 9];
        self.read_bytes_raw(&mut bytes)?;
        let scratchpad = Scratchpad::try_from(bytes);
        if let Err(Error::MismatchedCrc { crc8 }) = scratchpad {
            warn!("scratchpad rejected, crc residual {crc8:#04X}");
        }
        scratchpad
    }

    /// Thread-safe [`OneWire::ds18x20_read_scratchpad_raw`].
    pub fn ds18x20_read_scratchpad(&mut self, rom: Option<&Rom>) -> Result<Scratchpad> {
        self.locked(|bus| bus.ds18x20_read_scratchpad_raw(rom))
    }

    /// The resolution a device is configured for.
    ///
    /// A DS18S20 is fixed at 9 bits and answered without bus traffic.
    pub fn ds18x20_get_resolution_raw(&mut self, rom: &Rom) -> Result<Resolution> {
        if is_s(rom) {
            return Ok(Resolution::Nine);
        }
        if !is_b(rom) {
            return Err(Error::MismatchedFamilyCode);
        }
        self.reset_raw()?;
        self.match_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_READ)?;
        // The leading scratchpad bytes are read only to stay aligned with
        // the configuration register.
        let mut config = 0;
        for _ in 0..5 {
            config = self.read_byte_raw()?;
        }
        Ok(Resolution::from_config(config))
    }

    /// Thread-safe [`OneWire::ds18x20_get_resolution_raw`].
    pub fn ds18x20_get_resolution(&mut self, rom: &Rom) -> Result<Resolution> {
        self.locked(|bus| bus.ds18x20_get_resolution_raw(rom))
    }

    /// Configures the measurement resolution and stores it to EEPROM.
    ///
    /// The current TH and TL bytes are read back first and rewritten
    /// untouched, since the scratchpad write always carries all three.
    /// A DS18S20 ignores the configuration bits; the call still reports
    /// success when the write sequence completes. With no ROM the new
    /// resolution is broadcast to every device.
    pub fn ds18x20_set_resolution_raw(
        &mut self,
        rom: Option<&Rom>,
        resolution: Resolution,
    ) -> Result<()> {
        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_READ)?;
        let mut bytes = [0; 5];
        self.read_bytes_raw(&mut bytes)?;
        let [_, _, high, low, config] = bytes;
        let config = config & !0x60 | resolution.config_bits();

        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_WRITE)?;
        self.write_bytes_raw(&[high, low, config])?;

        self.ds18x20_copy_scratchpad_raw(rom)
    }

    /// Thread-safe [`OneWire::ds18x20_set_resolution_raw`].
    pub fn ds18x20_set_resolution(&mut self, rom: Option<&Rom>, resolution: Resolution) -> Result<()> {
        self.locked(|bus| bus.ds18x20_set_resolution_raw(rom, resolution))
    }

    /// Programs the alarm trigger thresholds and stores them to EEPROM.
    ///
    /// Either threshold may independently be set, disabled or left
    /// unchanged; values clamp to the measurable range. When both are
    /// [`Alarm::NoChange`] the bus is not touched at all. DS18B20 only.
    pub fn ds18x20_set_alarm_temp_raw(
        &mut self,
        rom: Option<&Rom>,
        low: Alarm,
        high: Alarm,
    ) -> Result<()> {
        if let Some(rom) = rom {
            if !is_b(rom) {
                return Err(Error::MismatchedFamilyCode);
            }
        }
        if low == Alarm::NoChange && high == Alarm::NoChange {
            return Ok(());
        }

        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_READ)?;
        let mut bytes = [0; 5];
        self.read_bytes_raw(&mut bytes)?;
        let [_, _, stored_high, stored_low, config] = bytes;
        let high = high.resolve(stored_high as i8, true);
        let low = low.resolve(stored_low as i8, false);

        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_WRITE)?;
        self.write_bytes_raw(&[high as u8, low as u8, config])?;

        self.ds18x20_copy_scratchpad_raw(rom)
    }

    /// Thread-safe [`OneWire::ds18x20_set_alarm_temp_raw`].
    pub fn ds18x20_set_alarm_temp(
        &mut self,
        rom: Option<&Rom>,
        low: Alarm,
        high: Alarm,
    ) -> Result<()> {
        self.locked(|bus| bus.ds18x20_set_alarm_temp_raw(rom, low, high))
    }

    /// Reads the programmed alarm thresholds as `(low, high)`.
    /// DS18B20 only.
    pub fn ds18x20_get_alarm_temp_raw(&mut self, rom: Option<&Rom>) -> Result<(i8, i8)> {
        if let Some(rom) = rom {
            if !is_b(rom) {
                return Err(Error::MismatchedFamilyCode);
            }
        }
        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_READ)?;
        let mut bytes = [0; 4];
        self.read_bytes_raw(&mut bytes)?;
        Ok((bytes[3] as i8, bytes[2] as i8))
    }

    /// Thread-safe [`OneWire::ds18x20_get_alarm_temp_raw`].
    pub fn ds18x20_get_alarm_temp(&mut self, rom: Option<&Rom>) -> Result<(i8, i8)> {
        self.locked(|bus| bus.ds18x20_get_alarm_temp_raw(rom))
    }

    /// One step of the alarm-conditional enumeration: only devices whose
    /// last conversion crossed a programmed threshold answer.
    pub fn ds18x20_search_alarm_raw(&mut self) -> Result<Rom> {
        self.search_with_command_raw(COMMAND_ALARM_SEARCH)
    }

    /// Thread-safe [`OneWire::ds18x20_search_alarm_raw`].
    pub fn ds18x20_search_alarm(&mut self) -> Result<Rom> {
        self.locked(Self::ds18x20_search_alarm_raw)
    }

    /// Recalls TH, TL and the configuration register from EEPROM into the
    /// scratchpad, polling the status slot until the device reports done.
    pub fn ds18x20_recall_eeprom_raw(&mut self, rom: Option<&Rom>) -> Result<()> {
        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_RECALL)?;
        // The recall takes up to 10 ms.
        let max_retries = 10_000 / READ_SLOT_DURATION_MICROS + 1;
        for _ in 0..max_retries {
            if self.read_bit_raw()? {
                return Ok(());
            }
        }
        Err(Error::Timeout)
    }

    /// Thread-safe [`OneWire::ds18x20_recall_eeprom_raw`].
    pub fn ds18x20_recall_eeprom(&mut self, rom: Option<&Rom>) -> Result<()> {
        self.locked(|bus| bus.ds18x20_recall_eeprom_raw(rom))
    }

    /// Asks the addressed devices how they are powered; reads back
    /// `false` when at least one of them runs on parasite power.
    pub fn ds18x20_read_power_supply_raw(&mut self, rom: Option<&Rom>) -> Result<bool> {
        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_POWER_SUPPLY_READ)?;
        self.read_bit_raw()
    }

    /// Thread-safe [`OneWire::ds18x20_read_power_supply_raw`].
    pub fn ds18x20_read_power_supply(&mut self, rom: Option<&Rom>) -> Result<bool> {
        self.locked(|bus| bus.ds18x20_read_power_supply_raw(rom))
    }

    /// Copy the scratchpad triggers and configuration to non-volatile
    /// memory.
    fn ds18x20_copy_scratchpad_raw(&mut self, rom: Option<&Rom>) -> Result<()> {
        self.reset_raw()?;
        self.match_or_skip_rom_raw(rom)?;
        self.write_byte_raw(COMMAND_MEMORY_SCRATCHPAD_COPY)?;
        Ok(())
    }
}
