//! In-memory EEPROM model.
//!
//! [`SimEeprom`] behaves like the peripheral as seen through [`Hal`]: a write
//! keeps it busy until [`SimEeprom::complete`] is called, which commits the
//! byte and tells the caller whether to deliver the completion interrupt.

use crate::{utils::HexBytes, Error, Hal, ProgrammingMode};
use core::fmt;

/// An `N`-byte EEPROM held in RAM. Starts out erased (all `0xFF`).
pub struct SimEeprom<const N: usize> {
    memory: [u8; N],
    mode: Option<ProgrammingMode>,
    pending: Option<(u16, u8)>,
    forced_busy: bool,
    interrupt_enabled: bool,
    latch: u8,
    writes_started: usize,
    interrupts_disabled: usize,
}

impl<const N: usize> SimEeprom<N> {
    /// Addresses are `u16`, so the model holds between 1 and 64 KiB.
    const SIZE_OK: () = assert!(N >= 1 && N <= 1 << 16, "SimEeprom size must be in 1..=65536");

    pub const fn new() -> Self {
        let () = Self::SIZE_OK;
        Self {
            memory: [0xFF; N],
            mode: None,
            pending: None,
            forced_busy: false,
            interrupt_enabled: false,
            latch: 0,
            writes_started: 0,
            interrupts_disabled: 0,
        }
    }

    /// Finishes the byte currently being written.
    ///
    /// Returns `true` if the completion interrupt should now be delivered,
    /// i.e. a write was pending and the interrupt is enabled.
    pub fn complete(&mut self) -> bool {
        let (addr, value) = match self.pending.take() {
            Some(pending) => pending,
            None => return false,
        };
        let cell = &mut self.memory[usize::from(addr)];
        *cell = match self.mode.unwrap_or(ProgrammingMode::EraseWrite) {
            ProgrammingMode::EraseWrite => value,
            ProgrammingMode::EraseOnly => 0xFF,
            ProgrammingMode::WriteOnly => *cell & value,
        };
        self.interrupt_enabled
    }

    /// Overwrites memory contents directly, bypassing the write cycle.
    ///
    /// Returns [`Error::AddressOverflow`] and leaves memory untouched if
    /// `data` does not fit at `addr`.
    pub fn load(&mut self, addr: usize, data: &[u8]) -> Result<(), Error> {
        let end = addr.checked_add(data.len()).ok_or(Error::AddressOverflow)?;
        let cells = self
            .memory
            .get_mut(addr..end)
            .ok_or(Error::AddressOverflow)?;
        cells.copy_from_slice(data);
        Ok(())
    }

    /// The whole memory contents.
    pub fn image(&self) -> &[u8; N] {
        &self.memory
    }

    /// Holds the busy flag high (or releases it), as if another agent were
    /// writing.
    pub fn set_busy(&mut self, busy: bool) {
        self.forced_busy = busy;
    }

    pub fn mode(&self) -> Option<ProgrammingMode> {
        self.mode
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt_enabled
    }

    /// Number of byte writes started so far.
    pub fn writes_started(&self) -> usize {
        self.writes_started
    }

    /// Number of times the completion interrupt went from enabled to disabled.
    pub fn interrupts_disabled(&self) -> usize {
        self.interrupts_disabled
    }
}

impl<const N: usize> Default for SimEeprom<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for SimEeprom<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEeprom")
            .field("memory", &HexBytes(&self.memory))
            .field("mode", &self.mode)
            .field("pending", &self.pending)
            .field("interrupt_enabled", &self.interrupt_enabled)
            .finish()
    }
}

impl<const N: usize> Hal for SimEeprom<N> {
    const MAX_ADDR: u16 = {
        let () = Self::SIZE_OK;
        (N - 1) as u16
    };

    fn set_mode(&mut self, mode: ProgrammingMode) {
        self.mode = Some(mode);
    }

    fn is_busy(&self) -> bool {
        self.forced_busy || self.pending.is_some()
    }

    fn start_write(&mut self, addr: u16, value: u8) {
        assert!(!self.is_busy(), "write started while EEPROM is busy");
        self.pending = Some((addr, value));
        self.interrupt_enabled = true;
        self.writes_started += 1;
    }

    fn disable_interrupt(&mut self) {
        if self.interrupt_enabled {
            self.interrupts_disabled += 1;
        }
        self.interrupt_enabled = false;
    }

    fn start_read(&mut self, addr: u16) {
        self.latch = self.memory[usize::from(addr)];
    }

    fn is_read_ready(&self) -> bool {
        !self.is_busy()
    }

    fn read_latch(&self) -> u8 {
        self.latch
    }
}
