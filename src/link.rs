//! The serial line the 1-Wire bus is looped back over.

use embedded_hal::{
    delay::DelayNs,
    digital::{ErrorType, InputPin, OutputPin},
};
use thiserror::Error;

/// Baudrate of the reset/presence frame.
pub const BAUDRATE_RESET: u32 = 9_600;
/// Baudrate of data bit frames.
pub const BAUDRATE_DATA: u32 = 115_200;

/// Line driver failure.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum LinkError {
    #[error("unsupported baudrate")]
    Baudrate,
    #[error("byte exchange failed")]
    Transfer,
}

/// A byte-loopback transport.
///
/// The transmitter and receiver are tied to the same open-drain line, so
/// every transmitted frame is simultaneously observed back: the i-th
/// received byte is sampled while the i-th transmitted byte is on the
/// wire. The frame must be 8N1, LSB first.
///
/// The usual implementation is a UART with an open-drain transmitter;
/// [`BitBang`] synthesizes the same frames on a plain GPIO.
pub trait Link {
    /// Acquires the hardware and configures the frame.
    fn init(&mut self) -> Result<(), LinkError>;

    /// Releases the hardware.
    fn deinit(&mut self) -> Result<(), LinkError>;

    /// Selects the frame timing; at least [`BAUDRATE_RESET`] and
    /// [`BAUDRATE_DATA`] must be accepted.
    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), LinkError>;

    /// Sends `tx` and records the byte observed on the line for each
    /// transmitted byte into `rx`. The slices have the same length.
    fn tx_rx(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), LinkError>;
}

impl<T: Link + ?Sized> Link for &mut T {
    fn init(&mut self) -> Result<(), LinkError> {
        (**self).init()
    }

    fn deinit(&mut self) -> Result<(), LinkError> {
        (**self).deinit()
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), LinkError> {
        (**self).set_baudrate(baudrate)
    }

    fn tx_rx(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), LinkError> {
        (**self).tx_rx(tx, rx)
    }
}

/// One time slot on the wire, in microseconds: initial low pulse, wait
/// from release to sample, wait after the sample.
#[derive(Clone, Copy, Debug)]
struct Slot {
    low: u32,
    sample: u32,
    tail: u32,
}

/// Reset pulse and presence sample; what a 0xF0 frame at 9600 baud does.
const RESET: Slot = Slot {
    low: 480,
    sample: 70,
    tail: 410,
};
/// Write-1 / read slot; what a 0xFF frame at 115200 baud does.
const ONE: Slot = Slot {
    low: 6,
    sample: 9,
    tail: 55,
};
/// Write-0 slot; what a 0x00 frame at 115200 baud does.
const ZERO: Slot = Slot {
    low: 60,
    sample: 0,
    tail: 10,
};

/// A [`Link`] bit-banged on a single open-drain pin.
///
/// Reproduces the two UART frame timings with busy-waits. `set_low`
/// drives the line, `set_high` releases it to the pull-up resistor.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitBang<P, D> {
    pin: P,
    delay: D,
    baudrate: u32,
}

impl<P: InputPin + OutputPin, D: DelayNs> BitBang<P, D> {
    pub fn new(pin: P, delay: D) -> Self {
        Self {
            pin,
            delay,
            baudrate: BAUDRATE_DATA,
        }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }

    /// Runs one slot with interrupts masked. The slot widths are protocol
    /// timing and must not stretch; a stretched low pulse turns a write-1
    /// into a write-0.
    fn exchange(&mut self, slot: Slot) -> Result<bool, LinkError> {
        let pin = &mut self.pin;
        let delay = &mut self.delay;
        critical_section::with(|_| -> Result<bool, <P as ErrorType>::Error> {
            pin.set_low()?;
            delay.delay_us(slot.low);
            pin.set_high()?;
            delay.delay_us(slot.sample);
            let level = pin.is_high()?;
            delay.delay_us(slot.tail);
            Ok(level)
        })
        .map_err(|_| LinkError::Transfer)
    }
}

impl<P: InputPin + OutputPin, D: DelayNs> Link for BitBang<P, D> {
    fn init(&mut self) -> Result<(), LinkError> {
        // Pin should be high during idle.
        self.pin.set_high().map_err(|_| LinkError::Transfer)?;
        self.baudrate = BAUDRATE_DATA;
        Ok(())
    }

    fn deinit(&mut self) -> Result<(), LinkError> {
        self.pin.set_high().map_err(|_| LinkError::Transfer)
    }

    fn set_baudrate(&mut self, baudrate: u32) -> Result<(), LinkError> {
        match baudrate {
            BAUDRATE_RESET | BAUDRATE_DATA => {
                self.baudrate = baudrate;
                Ok(())
            }
            _ => Err(LinkError::Baudrate),
        }
    }

    fn tx_rx(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), LinkError> {
        debug_assert_eq!(tx.len(), rx.len());
        if self.baudrate == BAUDRATE_RESET {
            // Only the single-byte reset frame fits the 9600 baud timing.
            if tx.len() != 1 {
                return Err(LinkError::Transfer);
            }
            let level = self.exchange(RESET)?;
            // A low sample is the presence pulse; echo a byte the upper
            // layer cannot mistake for "untouched" or "stuck low".
            rx[0] = if level { tx[0] } else { 0x01 };
        } else {
            for (tx, rx) in tx.iter().zip(rx) {
                let level = self.exchange(if *tx != 0 { ONE } else { ZERO })?;
                *rx = if level { 0xFF } else { 0x00 };
            }
        }
        Ok(())
    }
}
