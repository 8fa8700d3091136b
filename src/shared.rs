//! A driver handle that can be stored in a `static`.

use crate::{Eeprom, Error, Hal};
use core::cell::RefCell;
use critical_section::Mutex;

/// An [`Eeprom`] shared between the main program and the EEPROM ready
/// interrupt.
///
/// Every method runs inside a critical section. [`on_interrupt`] releases the
/// driver before calling the completion callback, so the callback may start
/// the next write through the same handle.
///
/// [`on_interrupt`]: SharedEeprom::on_interrupt
pub struct SharedEeprom<'a, H: Hal, C: Copy = ()> {
    inner: Mutex<RefCell<Option<Eeprom<'a, H, C>>>>,
}

impl<'a, H: Hal, C: Copy> SharedEeprom<'a, H, C> {
    /// Creates an empty handle. Install a driver with [`init`](Self::init).
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Installs `eeprom`, returning the previously installed driver.
    pub fn init(&self, eeprom: Eeprom<'a, H, C>) -> Option<Eeprom<'a, H, C>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(eeprom))
    }

    /// Removes and returns the installed driver.
    pub fn free(&self) -> Option<Eeprom<'a, H, C>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take())
    }

    /// Runs `f` with exclusive access to the driver.
    pub fn lock<R>(&self, f: impl FnOnce(&mut Eeprom<'a, H, C>) -> R) -> Result<R, Error> {
        critical_section::with(|cs| match self.inner.borrow_ref_mut(cs).as_mut() {
            Some(eeprom) => Ok(f(eeprom)),
            None => Err(Error::Uninitialized),
        })
    }

    /// See [`Eeprom::begin`].
    pub fn begin(&self) -> Result<(), Error> {
        self.lock(|eeprom| eeprom.begin())
    }

    /// See [`Eeprom::set_callback`].
    pub fn set_callback(&self, callback: Option<fn(C)>, context: C) -> Result<(), Error> {
        self.lock(|eeprom| eeprom.set_callback(callback, context))?
    }

    /// See [`Eeprom::write`].
    pub fn write(&self, addr: u16, data: &'a [u8]) -> Result<(), Error> {
        self.lock(|eeprom| eeprom.write(addr, data))?
    }

    /// See [`Eeprom::write_byte`].
    pub fn write_byte(&self, addr: u16, data: u8) -> Result<(), Error> {
        self.lock(|eeprom| eeprom.write_byte(addr, data))?
    }

    /// See [`Eeprom::read`].
    pub fn read(&self, addr: u16, buf: &mut [u8]) -> Result<(), Error> {
        self.lock(|eeprom| eeprom.read(addr, buf))?
    }

    /// See [`Eeprom::read_byte`].
    pub fn read_byte(&self, addr: u16) -> Result<u8, Error> {
        self.lock(|eeprom| eeprom.read_byte(addr))?
    }

    /// Returns whether the driver would reject a request as busy.
    pub fn is_busy(&self) -> Result<bool, Error> {
        self.lock(|eeprom| eeprom.is_busy())
    }

    /// See [`Eeprom::on_interrupt`]. Does nothing if no driver is installed.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let done = self.inner.borrow_ref_mut(cs).as_mut().and_then(Eeprom::advance);
            if let Some(callback) = done {
                callback.notify();
            }
        })
    }
}

impl<H: Hal, C: Copy> core::fmt::Debug for SharedEeprom<'_, H, C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedEeprom").finish_non_exhaustive()
    }
}

impl<H: Hal, C: Copy> Default for SharedEeprom<'_, H, C> {
    fn default() -> Self {
        Self::new()
    }
}
