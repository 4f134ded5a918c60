//! Test doubles: a scripted byte-loopback link, and a simulated bus with
//! DS18x20 slave state machines behind it.

use crate::{
    commands::{
        COMMAND_ALARM_SEARCH, COMMAND_MEMORY_CONVERT, COMMAND_MEMORY_POWER_SUPPLY_READ,
        COMMAND_MEMORY_RECALL, COMMAND_MEMORY_SCRATCHPAD_COPY, COMMAND_MEMORY_SCRATCHPAD_READ,
        COMMAND_MEMORY_SCRATCHPAD_WRITE, COMMAND_ROM_MATCH, COMMAND_ROM_READ, COMMAND_ROM_SEARCH,
        COMMAND_ROM_SKIP,
    },
    crc8,
    link::{Link, LinkError, BAUDRATE_DATA, BAUDRATE_RESET},
    mutex::BusMutex,
    rom::Rom,
};
use std::{cell::Cell, collections::VecDeque, vec::Vec};

/// Builds a ROM with a valid trailing CRC.
pub fn rom(family_code: u8, serial_number: [u8; 6]) -> Rom {
    let mut bytes = [0; 8];
    bytes[0] = family_code;
    bytes[1..7].copy_from_slice(&serial_number);
    bytes[7] = crc8::calculate(&bytes[..7]);
    Rom::from(bytes)
}

/// Observes lock traffic through the blanket `&T` mutex impl.
#[derive(Debug, Default)]
pub struct CountingMutex {
    pub locks: Cell<usize>,
    pub unlocks: Cell<usize>,
}

impl BusMutex for CountingMutex {
    fn lock(&self) {
        self.locks.set(self.locks.get() + 1);
    }

    fn unlock(&self) {
        self.unlocks.set(self.unlocks.get() + 1);
    }
}

/// Records every exchange and answers from a script; with no scripted
/// reply a byte echoes back untouched, like an idle bus.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    pub sent: Vec<u8>,
    /// Length of each tx_rx call, to observe frame batching.
    pub exchanges: Vec<usize>,
    pub baudrates: Vec<u32>,
    pub replies: VecDeque<u8>,
    pub fail_init: bool,
    pub deinited: bool,
}

impl Link for ScriptedLink {
    fn init(&mut self) -> Result<(), LinkError> {
        if self.fail_init {
            return Err(LinkError::Transfer);
        }
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), LinkError> {
        self.deinited = true;
        Ok(())
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), LinkError> {
        self.baudrates.push(baudrate);
        Ok(())
    }

    fn tx_rx(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), LinkError> {
        self.exchanges.push(tx.len());
        for (tx, rx) in tx.iter().zip(rx) {
            self.sent.push(*tx);
            *rx = self.replies.pop_front().unwrap_or(*tx);
        }
        Ok(())
    }
}

/// What a [`SimDevice`] is doing between two slots.
#[derive(Clone, Copy, Debug)]
enum State {
    /// Waiting for a reset pulse.
    Idle,
    /// Collecting a command byte; ROM commands right after reset,
    /// function commands once addressed.
    Command { byte: u8, bit: u8, rom_layer: bool },
    /// Search triplet at bit `position`: own bit, complement, then the
    /// master's decision.
    Search { position: u8, phase: u8 },
    /// Match ROM comparison at bit `position`.
    Match { position: u8 },
    /// Driving `source` out, bit `position`.
    Read { source: Source, position: u8 },
    /// Collecting scratchpad bytes 2..=4 (TH, TL, configuration).
    Write { index: u8, byte: u8, bit: u8 },
    /// A conversion was started; read slots answer the busy status.
    Convert,
    /// Status slots that always read 1 (recall done, external power).
    Done,
}

#[derive(Clone, Copy, Debug)]
enum Source {
    Rom,
    Scratchpad,
}

/// One emulated DS18x20 on the simulated bus.
#[derive(Debug)]
pub struct SimDevice {
    pub rom: [u8; 8],
    /// The eight data bytes; the CRC is computed on the way out.
    pub scratchpad: [u8; 8],
    /// Stored TH, TL, configuration.
    pub eeprom: [u8; 3],
    /// Read-slot polls left before a started conversion reports done.
    pub busy_polls: u32,
    /// Answers the alarm-conditional search.
    pub alarm: bool,
    /// Flip the outgoing scratchpad CRC byte.
    pub corrupt_crc: bool,
    /// Accepts the configuration byte of a scratchpad write; the DS18S20
    /// does not.
    config_writable: bool,
    state: State,
}

impl SimDevice {
    /// A DS18B20 fresh out of power-up: +85 °C, 12-bit resolution.
    pub fn ds18b20(rom: Rom) -> Self {
        Self {
            rom: rom.into(),
            scratchpad: [0x50, 0x05, 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10],
            eeprom: [0x4B, 0x46, 0x7F],
            busy_polls: 0,
            alarm: false,
            corrupt_crc: false,
            config_writable: true,
            state: State::Idle,
        }
    }

    /// A DS18S20: fixed resolution, byte 4 reads as reserved 0xFF and the
    /// scratchpad write carries only TH and TL.
    pub fn ds18s20(rom: Rom) -> Self {
        Self {
            rom: rom.into(),
            scratchpad: [0xAA, 0x00, 0x4B, 0x46, 0xFF, 0xFF, 0x0C, 0x10],
            eeprom: [0x4B, 0x46, 0xFF],
            busy_polls: 0,
            alarm: false,
            corrupt_crc: false,
            config_writable: false,
            state: State::Idle,
        }
    }

    fn reset(&mut self) {
        self.state = State::Command {
            byte: 0,
            bit: 0,
            rom_layer: true,
        };
    }

    fn rom_bit(&self, position: u8) -> bool {
        self.rom[(position / 8) as usize] & 1 << (position % 8) != 0
    }

    fn output_bit(&self, source: Source, position: u8) -> bool {
        let index = (position / 8) as usize;
        let byte = match source {
            Source::Rom => self.rom[index],
            Source::Scratchpad if index == 8 => {
                let crc = crc8::calculate(&self.scratchpad);
                if self.corrupt_crc {
                    !crc
                } else {
                    crc
                }
            }
            Source::Scratchpad => self.scratchpad[index],
        };
        byte & 1 << (position % 8) != 0
    }

    fn command(&mut self, byte: u8, bit: u8, rom_layer: bool) -> State {
        State::Command {
            byte,
            bit,
            rom_layer,
        }
    }

    fn dispatch(&mut self, command: u8, rom_layer: bool) -> State {
        if rom_layer {
            match command {
                COMMAND_ROM_SEARCH => State::Search {
                    position: 0,
                    phase: 0,
                },
                COMMAND_ALARM_SEARCH if self.alarm => State::Search {
                    position: 0,
                    phase: 0,
                },
                COMMAND_ROM_MATCH => State::Match { position: 0 },
                COMMAND_ROM_SKIP => self.command(0, 0, false),
                COMMAND_ROM_READ => State::Read {
                    source: Source::Rom,
                    position: 0,
                },
                _ => State::Idle,
            }
        } else {
            match command {
                COMMAND_MEMORY_CONVERT => State::Convert,
                COMMAND_MEMORY_SCRATCHPAD_READ => State::Read {
                    source: Source::Scratchpad,
                    position: 0,
                },
                COMMAND_MEMORY_SCRATCHPAD_WRITE => State::Write {
                    index: 0,
                    byte: 0,
                    bit: 0,
                },
                COMMAND_MEMORY_SCRATCHPAD_COPY => {
                    self.eeprom.copy_from_slice(&self.scratchpad[2..5]);
                    State::Idle
                }
                COMMAND_MEMORY_RECALL => {
                    let [high, low, config] = self.eeprom;
                    self.scratchpad[2] = high;
                    self.scratchpad[3] = low;
                    if self.config_writable {
                        self.scratchpad[4] = config;
                    }
                    State::Done
                }
                COMMAND_MEMORY_POWER_SUPPLY_READ => State::Done,
                _ => State::Idle,
            }
        }
    }

    /// Advances the state machine by one slot. `master` is the level the
    /// master drives (true = released/read slot). Returns false when the
    /// device pulls the line low for this slot.
    fn slot(&mut self, master: bool) -> bool {
        match self.state {
            State::Idle => true,
            State::Command {
                mut byte,
                mut bit,
                rom_layer,
            } => {
                if master {
                    byte |= 1 << bit;
                }
                bit += 1;
                self.state = if bit == 8 {
                    self.dispatch(byte, rom_layer)
                } else {
                    self.command(byte, bit, rom_layer)
                };
                true
            }
            State::Search { position, phase } => {
                let own = self.rom_bit(position);
                match phase {
                    // Drive the address bit, then its complement.
                    0 => {
                        self.state = State::Search { position, phase: 1 };
                        own
                    }
                    1 => {
                        self.state = State::Search { position, phase: 2 };
                        !own
                    }
                    // Sample the master's direction; a mismatch drops
                    // this device out until the next reset.
                    _ => {
                        self.state = if master != own {
                            State::Idle
                        } else if position == 63 {
                            self.command(0, 0, false)
                        } else {
                            State::Search {
                                position: position + 1,
                                phase: 0,
                            }
                        };
                        true
                    }
                }
            }
            State::Match { position } => {
                self.state = if master != self.rom_bit(position) {
                    State::Idle
                } else if position == 63 {
                    self.command(0, 0, false)
                } else {
                    State::Match {
                        position: position + 1,
                    }
                };
                true
            }
            State::Read { source, position } => {
                let last = match source {
                    Source::Rom => 63,
                    Source::Scratchpad => 71,
                };
                self.state = if position == last {
                    State::Idle
                } else {
                    State::Read {
                        source,
                        position: position + 1,
                    }
                };
                self.output_bit(source, position)
            }
            State::Write {
                index,
                mut byte,
                mut bit,
            } => {
                if master {
                    byte |= 1 << bit;
                }
                bit += 1;
                if bit == 8 {
                    self.scratchpad[2 + index as usize] = byte;
                    let last = if self.config_writable { 2 } else { 1 };
                    self.state = if index == last {
                        State::Idle
                    } else {
                        State::Write {
                            index: index + 1,
                            byte: 0,
                            bit: 0,
                        }
                    };
                } else {
                    self.state = State::Write { index, byte, bit };
                }
                true
            }
            State::Convert => {
                if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    false
                } else {
                    true
                }
            }
            State::Done => true,
        }
    }
}

/// A byte-loopback line with simulated devices attached.
///
/// At 9600 baud the one-byte reset frame resets every device and the echo
/// reports presence; at 115200 baud every byte is one bit slot wire-ANDed
/// across the master and all devices.
#[derive(Debug)]
pub struct SimLink {
    pub devices: Vec<SimDevice>,
    baudrate: u32,
    /// Reset frames exchanged so far.
    pub resets: usize,
    /// Force the stuck-low presence echo.
    pub shorted: bool,
    /// Fail the byte exchange after this many more bytes.
    pub fail_in: Option<usize>,
    pub reject_baudrate: bool,
}

impl SimLink {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        Self {
            devices,
            baudrate: BAUDRATE_DATA,
            resets: 0,
            shorted: false,
            fail_in: None,
            reject_baudrate: false,
        }
    }
}

impl Link for SimLink {
    fn init(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), LinkError> {
        if self.reject_baudrate {
            return Err(LinkError::Baudrate);
        }
        match baudrate {
            BAUDRATE_RESET | BAUDRATE_DATA => {
                self.baudrate = baudrate;
                Ok(())
            }
            _ => Err(LinkError::Baudrate),
        }
    }

    fn tx_rx(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), LinkError> {
        for (tx, rx) in tx.iter().zip(rx) {
            if let Some(count) = &mut self.fail_in {
                if *count == 0 {
                    self.fail_in = None;
                    return Err(LinkError::Transfer);
                }
                *count -= 1;
            }
            *rx = if self.baudrate == BAUDRATE_RESET {
                self.resets += 1;
                for device in &mut self.devices {
                    device.reset();
                }
                if self.shorted {
                    0x00
                } else if self.devices.is_empty() {
                    *tx
                } else {
                    // Presence pulls some bit times of the echo low.
                    *tx & !0x30
                }
            } else {
                let master = *tx == 0xFF;
                let mut bus = master;
                for device in &mut self.devices {
                    bus &= device.slot(master);
                }
                if bus {
                    0xFF
                } else {
                    0x00
                }
            };
        }
        Ok(())
    }
}
