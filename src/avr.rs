//! [`Hal`] implementation for the EEPROM of AVR microcontrollers.
//!
//! The register block consists of four consecutive bytes in data space:
//! `EECR`, `EEDR`, `EEARL` and `EEARH`.

use crate::{Hal, ProgrammingMode};
use bitflags::bitflags;
use core::ptr;

bitflags! {
    /// EEPROM control register (`EECR`) bits.
    pub struct Control: u8 {
        /// **R**ead **E**nable strobe.
        const EERE = 1 << 0;
        /// **P**rogramming **E**nable: write in progress.
        const EEPE = 1 << 1;
        /// **M**aster **P**rogramming **E**nable. Must be set right before
        /// `EEPE`.
        const EEMPE = 1 << 2;
        /// EEPROM **R**eady **I**nterrupt **E**nable.
        const EERIE = 1 << 3;
        /// The 2 programming mode bits.
        const EEPM = 0b0011_0000;
    }
}

impl Control {
    const EEPM_SHIFT: u8 = 4;

    fn mode(mode: ProgrammingMode) -> Self {
        Control::from_bits_truncate((mode as u8) << Self::EEPM_SHIFT)
    }
}

/// Memory-mapped EEPROM registers.
#[derive(Debug)]
pub struct Registers {
    base: *mut u8,
}

// The registers are only ever touched through `&mut self` or inside the
// driver's critical sections.
unsafe impl Send for Registers {}

impl Registers {
    const EECR: usize = 0;
    const EEDR: usize = 1;
    const EEARL: usize = 2;
    const EEARH: usize = 3;

    /// Data space address of `EECR` on ATmega48/88/168/328 parts.
    pub const ATMEGA328P_BASE: usize = 0x3F;

    /// Creates a register block starting at `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to four bytes that are valid for volatile reads and
    /// writes for as long as the returned value lives, and nothing else may
    /// access them in the meantime.
    pub unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    /// Takes the EEPROM registers of an ATmega328P.
    ///
    /// # Safety
    ///
    /// Must only be called once, and only on a part whose EEPROM registers
    /// live at [`ATMEGA328P_BASE`](Registers::ATMEGA328P_BASE).
    pub unsafe fn atmega328p() -> Self {
        Self::new(Self::ATMEGA328P_BASE as *mut u8)
    }

    /// Reads the control register.
    pub fn control(&self) -> Control {
        Control::from_bits_truncate(self.load(Self::EECR))
    }

    fn set_control(&mut self, control: Control) {
        self.store(Self::EECR, control.bits());
    }

    fn set_address(&mut self, addr: u16) {
        self.store(Self::EEARH, (addr >> 8) as u8);
        self.store(Self::EEARL, addr as u8);
    }

    fn load(&self, offset: usize) -> u8 {
        unsafe { ptr::read_volatile(self.base.add(offset)) }
    }

    fn store(&mut self, offset: usize, value: u8) {
        unsafe { ptr::write_volatile(self.base.add(offset), value) }
    }
}

impl Hal for Registers {
    const MAX_ADDR: u16 = 1023;

    fn set_mode(&mut self, mode: ProgrammingMode) {
        self.set_control(Control::mode(mode));
    }

    fn is_busy(&self) -> bool {
        self.control().contains(Control::EEPE)
    }

    fn start_write(&mut self, addr: u16, value: u8) {
        self.set_address(addr);
        self.store(Self::EEDR, value);
        // EEPE has to follow EEMPE within four cycles.
        self.set_control(self.control() | Control::EEMPE);
        self.set_control(self.control() | Control::EEPE | Control::EERIE);
    }

    fn disable_interrupt(&mut self) {
        self.set_control(self.control() - Control::EERIE);
    }

    fn start_read(&mut self, addr: u16) {
        self.set_address(addr);
        self.set_control(self.control() | Control::EERE);
    }

    fn is_read_ready(&self) -> bool {
        !self.is_busy()
    }

    fn read_latch(&self) -> u8 {
        self.load(Self::EEDR)
    }
}
