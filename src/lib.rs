//! A 1-Wire bus master on top of a UART byte loopback.
//!
//! The transmitter and receiver of an ordinary serial peripheral are tied
//! to one open-drain line. A carefully chosen frame then *is* a 1-Wire
//! time slot: the start bit makes the low pulse, the data bits stretch or
//! release it, and the byte echoed on the receiver tells what the bus did
//! during the slot. One 0xF0 frame at 9600 baud is a reset pulse; 0xFF
//! and 0x00 frames at 115200 baud are write-1/read and write-0 slots.
//! Slot timing is delegated entirely to the UART hardware, which keeps it
//! intact under interrupts, preemption and scheduler jitter.
//!
//! The line driver behind the [`Link`] trait is either a real UART in
//! open-drain mode or the [`BitBang`] fallback that synthesizes the same
//! frames on a GPIO. On top of the bus primitives sits a driver for the
//! DS18B20/DS18S20 temperature sensors in [`ds18x20`].
//!
//! [1-Wire](https://www.analog.com/en/resources/technical-articles/guide-to-1wire-communication.html)

#![no_std]

#[cfg(test)]
extern crate std;

pub use self::{
    ds18x20::Alarm,
    error::{Error, Result},
    link::{BitBang, Link, LinkError, BAUDRATE_DATA, BAUDRATE_RESET},
    mutex::{BusMutex, NoMutex},
    rom::Rom,
    scratchpad::{Resolution, Scratchpad},
    search::Devices,
};

use commands::{COMMAND_ROM_MATCH, COMMAND_ROM_READ, COMMAND_ROM_SKIP};
use log::debug;

/// Reset frame payload; at 9600 baud the start bit and the four low data
/// bits make a ≈520 µs low pulse.
const RESET_BYTE: u8 = 0xF0;

/// A 1-Wire bus handle.
///
/// Owns the line driver and the enumeration state; one handle per
/// physical bus. Operations come in pairs: the `_raw` form assumes the
/// caller already holds the bus (or is the only context touching it), the
/// plain form wraps the raw form between [`BusMutex::lock`] and
/// [`BusMutex::unlock`].
pub struct OneWire<L, M = NoMutex> {
    link: L,
    mutex: M,
    /// ROM of the last found device; a search step follows it up to the
    /// recorded discrepancy.
    rom: [u8; 8],
    discrepancy: u8,
}

impl<L: Link> OneWire<L> {
    /// Initializes the line driver and returns an idle bus handle.
    pub fn new(link: L) -> Result<Self> {
        Self::with_mutex(link, NoMutex)
    }
}

impl<L: Link, M: BusMutex> OneWire<L, M> {
    /// [`OneWire::new`] for a handle shared between contexts.
    pub fn with_mutex(mut link: L, mutex: M) -> Result<Self> {
        link.init().map_err(|_| Error::Driver)?;
        debug!("1-wire bus initialized");
        Ok(Self {
            link,
            mutex,
            rom: [0; 8],
            discrepancy: search::FIRST_DEVICE,
        })
    }

    /// Releases the line driver and hands it back.
    pub fn deinit(mut self) -> Result<L> {
        self.link.deinit().map_err(|_| Error::Driver)?;
        debug!("1-wire bus deinitialized");
        Ok(self.into_inner())
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Takes the bus lock when `protect` is set; no-op otherwise.
    ///
    /// The cleared flag is for callers that already hold the lock and are
    /// composing raw operations themselves.
    pub fn protect(&mut self, protect: bool) {
        if protect {
            self.mutex.lock();
        }
    }

    /// Releases the bus lock when `protect` is set; no-op otherwise.
    pub fn unprotect(&mut self, protect: bool) {
        if protect {
            self.mutex.unlock();
        }
    }

    /// Runs `op` under the bus lock.
    pub(crate) fn locked<T>(&mut self, op: impl FnOnce(&mut Self) -> T) -> T {
        self.mutex.lock();
        let result = op(self);
        self.mutex.unlock();
        result
    }

    /// Resets the bus and samples the presence pulse.
    ///
    /// The frame goes out at 9600 baud so its low run lasts ≈520 µs; any
    /// device answering inside the following high period pulls bit times
    /// low, so the echo differs from the sent byte. An untouched echo
    /// means nobody answered; an all-zero echo means the line is stuck.
    pub fn reset_raw(&mut self) -> Result<()> {
        self.link
            .set_baudrate(BAUDRATE_RESET)
            .map_err(|_| Error::Baudrate)?;
        let mut echo = [0];
        self.link
            .tx_rx(&[RESET_BYTE], &mut echo)
            .map_err(|_| Error::Transfer)?;
        self.link
            .set_baudrate(BAUDRATE_DATA)
            .map_err(|_| Error::Baudrate)?;
        match echo[0] {
            0x00 | RESET_BYTE => Err(Error::Presence),
            _ => Ok(()),
        }
    }

    /// Thread-safe [`OneWire::reset_raw`].
    pub fn reset(&mut self) -> Result<()> {
        self.locked(Self::reset_raw)
    }

    /// Exchanges one bit slot and returns the level sampled back.
    ///
    /// A 1 releases the line after the start bit, so the echo also
    /// carries whatever a device drove into the slot; that single frame
    /// is both the write-1 and the read slot.
    pub(crate) fn exchange_bit_raw(&mut self, bit: bool) -> Result<bool> {
        let tx = [if bit { 0xFF } else { 0x00 }];
        let mut rx = [0];
        self.link.tx_rx(&tx, &mut rx).map_err(|_| Error::Transfer)?;
        Ok(rx[0] == 0xFF)
    }

    /// Reads one bit from the bus.
    pub fn read_bit_raw(&mut self) -> Result<bool> {
        self.exchange_bit_raw(true)
    }

    /// Thread-safe [`OneWire::read_bit_raw`].
    pub fn read_bit(&mut self) -> Result<bool> {
        self.locked(Self::read_bit_raw)
    }

    /// Writes one byte LSB first and returns the byte echoed by the bus.
    ///
    /// All eight slots go out in a single exchange; the UART aligns every
    /// slot to its own start bit, so the idle gap between frames does not
    /// matter to the protocol.
    pub fn write_byte_raw(&mut self, byte: u8) -> Result<u8> {
        let mut tx = [0; 8];
        for (index, slot) in tx.iter_mut().enumerate() {
            *slot = if byte & 1 << index != 0 { 0xFF } else { 0x00 };
        }
        let mut rx = [0; 8];
        self.link.tx_rx(&tx, &mut rx).map_err(|_| Error::Transfer)?;
        let mut echo = 0;
        for (index, slot) in rx.iter().enumerate() {
            if *slot == 0xFF {
                echo |= 1 << index;
            }
        }
        Ok(echo)
    }

    /// Thread-safe [`OneWire::write_byte_raw`].
    pub fn write_byte(&mut self, byte: u8) -> Result<u8> {
        self.locked(|bus| bus.write_byte_raw(byte))
    }

    /// Reads one byte: eight read slots, reassembled LSB first.
    pub fn read_byte_raw(&mut self) -> Result<u8> {
        self.write_byte_raw(0xFF)
    }

    /// Thread-safe [`OneWire::read_byte_raw`].
    pub fn read_byte(&mut self) -> Result<u8> {
        self.locked(Self::read_byte_raw)
    }

    pub fn read_bytes_raw(&mut self, bytes: &mut [u8]) -> Result<()> {
        for byte in bytes {
            *byte = self.read_byte_raw()?;
        }
        Ok(())
    }

    /// Thread-safe [`OneWire::read_bytes_raw`].
    pub fn read_bytes(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.locked(|bus| bus.read_bytes_raw(bytes))
    }

    pub fn write_bytes_raw(&mut self, bytes: &[u8]) -> Result<()> {
        for byte in bytes {
            self.write_byte_raw(*byte)?;
        }
        Ok(())
    }

    /// Thread-safe [`OneWire::write_bytes_raw`].
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.locked(|bus| bus.write_bytes_raw(bytes))
    }

    /// Selects exactly one device; every other device waits for the next
    /// reset.
    pub fn match_rom_raw(&mut self, rom: &Rom) -> Result<()> {
        self.write_byte_raw(COMMAND_ROM_MATCH)?;
        self.write_bytes_raw(&<[u8; 8]>::from(*rom))
    }

    /// Thread-safe [`OneWire::match_rom_raw`].
    pub fn match_rom(&mut self, rom: &Rom) -> Result<()> {
        self.locked(|bus| bus.match_rom_raw(rom))
    }

    /// Addresses every device at once. Valid with a single device on the
    /// bus, or for broadcast commands that trigger no reply.
    pub fn skip_rom_raw(&mut self) -> Result<()> {
        self.write_byte_raw(COMMAND_ROM_SKIP)?;
        Ok(())
    }

    /// Thread-safe [`OneWire::skip_rom_raw`].
    pub fn skip_rom(&mut self) -> Result<()> {
        self.locked(Self::skip_rom_raw)
    }

    /// The canonical addressing prologue: skip when no ROM is given,
    /// match otherwise.
    pub fn match_or_skip_rom_raw(&mut self, rom: Option<&Rom>) -> Result<()> {
        match rom {
            Some(rom) => self.match_rom_raw(rom),
            None => self.skip_rom_raw(),
        }
    }

    /// Reads the ROM of the only device on the bus, CRC-verified.
    ///
    /// With more than one device the open-drain line wire-ANDs all
    /// replies into garbage; the CRC check catches that.
    pub fn read_rom_raw(&mut self) -> Result<Rom> {
        self.reset_raw()?;
        self.write_byte_raw(COMMAND_ROM_READ)?;
        let mut bytes = [0; 8];
        self.read_bytes_raw(&mut bytes)?;
        let rom = Rom::from(bytes);
        rom.verify()?;
        Ok(rom)
    }

    /// Thread-safe [`OneWire::read_rom_raw`].
    pub fn read_rom(&mut self) -> Result<Rom> {
        self.locked(Self::read_rom_raw)
    }
}

pub mod commands;
pub mod crc8;
pub mod ds18x20;
pub mod link;

mod error;
mod mutex;
mod rom;
mod scratchpad;
mod search;

#[cfg(test)]
pub(crate) mod testutil;
