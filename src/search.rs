//! Enumeration of device ROMs: a binary-tree walk over the 64-bit address
//! space, resolving collisions one disagreement bit at a time.

use crate::{
    commands::COMMAND_ROM_SEARCH,
    error::{Error, Result},
    link::Link,
    mutex::BusMutex,
    rom::Rom,
    OneWire,
};
use log::debug;

/// Discrepancy seed: no step taken yet, walk from scratch.
pub(crate) const FIRST_DEVICE: u8 = 0xFF;
/// Terminal discrepancy: the previous step left no fork unexplored.
pub(crate) const LAST_DEVICE: u8 = 0x00;

impl<L: Link, M: BusMutex> OneWire<L, M> {
    /// Rewinds the enumeration so the next step starts from scratch.
    pub fn search_reset_raw(&mut self) {
        self.discrepancy = FIRST_DEVICE;
    }

    /// Thread-safe [`OneWire::search_reset_raw`].
    pub fn search_reset(&mut self) {
        self.locked(Self::search_reset_raw)
    }

    /// Advances the enumeration by one device.
    pub fn search_raw(&mut self) -> Result<Rom> {
        self.search_with_command_raw(COMMAND_ROM_SEARCH)
    }

    /// Thread-safe [`OneWire::search_raw`].
    pub fn search(&mut self) -> Result<Rom> {
        self.locked(Self::search_raw)
    }

    /// One enumeration step with a custom search command (0xF0, or 0xEC
    /// to restrict the walk to alarming devices).
    ///
    /// Each step resets the bus, issues the command and walks all 64
    /// address positions. At every position the still-active devices
    /// answer with the wired-AND of their next bit and of its complement;
    /// the master writes the chosen direction back and devices on the
    /// other branch go silent until the next reset. Forks are revisited
    /// across steps through the discrepancy marker kept on the handle.
    ///
    /// Returns the next ROM, or [`Error::NoDevice`] once the tree is
    /// exhausted, which also rewinds the state for the next enumeration.
    /// The ROM is handed out as read off the wire, without CRC
    /// verification; callers that need identity guarantees use
    /// [`Rom::verify`].
    pub fn search_with_command_raw(&mut self, command: u8) -> Result<Rom> {
        if self.discrepancy == LAST_DEVICE {
            self.search_reset_raw();
            return Err(Error::NoDevice);
        }
        self.reset_raw()?;
        self.write_byte_raw(command)?;

        // Position of the bit in flight: 64 for the first on the wire
        // (LSB of byte 0) down to 1 (MSB of byte 7).
        let mut position = 64u8;
        let mut next_discrepancy = LAST_DEVICE;
        'walk: for index in 0..8 {
            for _ in 0..8 {
                let bit = self.exchange_bit_raw(true)?;
                let complement = self.exchange_bit_raw(true)?;
                let chosen = match (bit, complement) {
                    // Nobody answered: every device dropped out, or the
                    // bus emptied under us.
                    (true, true) => break 'walk,
                    // Fork: both branches are populated. Take the
                    // 1-branch below the recorded discrepancy, or where
                    // the previous ROM went 1 (its bit for this position
                    // has been shifted down to bit 0 of the scratch
                    // byte); remember the fork for the next step.
                    (false, false) => {
                        if position < self.discrepancy
                            || (self.rom[index] & 0x01 != 0 && self.discrepancy != position)
                        {
                            next_discrepancy = position;
                            true
                        } else {
                            false
                        }
                    }
                    // Unanimous bit.
                    (bit, _) => bit,
                };
                self.exchange_bit_raw(chosen)?;
                self.rom[index] = self.rom[index] >> 1 | (chosen as u8) << 7;
                position -= 1;
            }
        }
        self.discrepancy = next_discrepancy;
        if position == 0 {
            let rom = Rom::from(self.rom);
            debug!("search step: {rom:02X?}, discrepancy {next_discrepancy}");
            Ok(rom)
        } else {
            Err(Error::NoDevice)
        }
    }

    /// Thread-safe [`OneWire::search_with_command_raw`].
    pub fn search_with_command(&mut self, command: u8) -> Result<Rom> {
        self.locked(|bus| bus.search_with_command_raw(command))
    }

    /// Restarts the enumeration and fills `roms` with the devices found.
    ///
    /// Stops when the slice is full or the walk is exhausted and returns
    /// the number of ROMs stored; exhaustion is not an error once at
    /// least one device was found.
    pub fn search_devices_raw(&mut self, roms: &mut [Rom]) -> Result<usize> {
        self.search_devices_with_command_raw(COMMAND_ROM_SEARCH, roms)
    }

    /// Thread-safe [`OneWire::search_devices_raw`].
    pub fn search_devices(&mut self, roms: &mut [Rom]) -> Result<usize> {
        self.locked(|bus| bus.search_devices_raw(roms))
    }

    /// [`OneWire::search_devices_raw`] with a custom search command.
    pub fn search_devices_with_command_raw(
        &mut self,
        command: u8,
        roms: &mut [Rom],
    ) -> Result<usize> {
        self.search_reset_raw();
        let mut found = 0;
        for rom in roms.iter_mut() {
            match self.search_with_command_raw(command) {
                Ok(next) => {
                    *rom = next;
                    found += 1;
                }
                Err(Error::NoDevice) if found > 0 => break,
                Err(error) => return Err(error),
            }
        }
        Ok(found)
    }

    /// Thread-safe [`OneWire::search_devices_with_command_raw`].
    pub fn search_devices_with_command(&mut self, command: u8, roms: &mut [Rom]) -> Result<usize> {
        self.locked(|bus| bus.search_devices_with_command_raw(command, roms))
    }

    /// Returns an iterator over the devices on the bus.
    ///
    /// The enumeration is restarted first; each step yields one ROM until
    /// the walk is exhausted. A bus failure is yielded once and ends the
    /// iteration.
    pub fn devices(&mut self) -> Devices<'_, L, M> {
        self.devices_with_command(COMMAND_ROM_SEARCH)
    }

    /// [`OneWire::devices`] with a custom search command.
    pub fn devices_with_command(&mut self, command: u8) -> Devices<'_, L, M> {
        self.search_reset_raw();
        Devices {
            bus: self,
            command,
            finished: false,
        }
    }
}

/// Devices
pub struct Devices<'a, L, M> {
    bus: &'a mut OneWire<L, M>,
    command: u8,
    finished: bool,
}

impl<L: Link, M: BusMutex> Iterator for Devices<'_, L, M> {
    type Item = Result<Rom>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.bus.search_with_command_raw(self.command) {
            Ok(rom) => Some(Ok(rom)),
            Err(Error::NoDevice) => {
                self.finished = true;
                None
            }
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}
