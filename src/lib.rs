//! An interrupt-driven, non-blocking driver for on-chip EEPROM.
//!
//! Writing a byte to the EEPROM of a typical AVR part takes several
//! milliseconds. Instead of spinning on the write-in-progress flag, this
//! driver starts the first byte of a buffer and returns. Every following byte
//! is started from the "EEPROM ready" interrupt, and a registered callback is
//! invoked exactly once when the last byte has been committed.
//!
//! Reads are fast and stay synchronous.
//!
//! The driver only talks to the hardware through the [`Hal`] trait. The
//! [`avr`] module implements it on top of the memory-mapped EEPROM registers,
//! and the `sim` feature adds an in-memory model for host-side tests.
//!
//! # Example
//!
//! ```ignore
//! use nb_eeprom::{avr::Registers, Eeprom, SharedEeprom};
//!
//! static EEPROM: SharedEeprom<'static, Registers> = SharedEeprom::new();
//! static CONFIG: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];
//!
//! fn saved(_: ()) {
//!     // Runs in interrupt context, keep it short.
//! }
//!
//! fn main() {
//!     let mut eeprom = Eeprom::new(unsafe { Registers::atmega328p() });
//!     eeprom.begin();
//!     EEPROM.init(eeprom);
//!     EEPROM.set_callback(Some(saved), ()).unwrap();
//!     EEPROM.write(0x10, &CONFIG).unwrap();
//! }
//!
//! #[avr_device::interrupt(atmega328p)]
//! fn EE_READY() {
//!     EEPROM.on_interrupt();
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/nb-eeprom/0.1.0")]
#![warn(missing_debug_implementations, rust_2018_idioms)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
pub mod avr;
mod eeprom;
mod error;
mod shared;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod utils;

pub use crate::eeprom::{Eeprom, Transfer};
pub use crate::error::Error;
pub use crate::shared::SharedEeprom;

/// EEPROM programming modes, as selected by the `EEPM1:0` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProgrammingMode {
    /// Erase and write in one atomic operation.
    EraseWrite = 0,
    /// Erase only, leaving the cell at `0xFF`.
    EraseOnly = 1,
    /// Write only. Bits can only be cleared, never set.
    WriteOnly = 2,
}

/// Capabilities the driver needs from the EEPROM peripheral.
///
/// Implementations are expected to be thin: every method maps onto one or two
/// register accesses, and none of them may block.
pub trait Hal {
    /// Highest valid EEPROM address (inclusive).
    const MAX_ADDR: u16;

    /// Selects the programming mode. Only called from [`Eeprom::begin`].
    fn set_mode(&mut self, mode: ProgrammingMode);

    /// Returns whether a write cycle is in progress.
    fn is_busy(&self) -> bool;

    /// Starts committing `value` to `addr` and enables the completion
    /// interrupt.
    fn start_write(&mut self, addr: u16, value: u8);

    /// Disables the completion interrupt. Must be idempotent.
    fn disable_interrupt(&mut self);

    /// Starts fetching the byte at `addr` into the data latch.
    fn start_read(&mut self, addr: u16);

    /// Returns whether the data latch holds the byte requested by the last
    /// [`start_read`](Hal::start_read).
    fn is_read_ready(&self) -> bool;

    /// Returns the contents of the data latch.
    fn read_latch(&self) -> u8;
}
