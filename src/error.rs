use core::fmt::{self, Display};

/// The error type used by this library.
///
/// Every public operation reports its outcome synchronously; `Ok(())` means
/// the request was accepted. Nothing is retried internally, so polling until
/// the EEPROM is no longer busy is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A write is still in progress.
    ///
    /// Either the peripheral reports a write cycle, or the last byte of a
    /// transfer finished but its completion interrupt has not run yet.
    Busy,

    /// The start address, or start address plus length, lies beyond the
    /// highest address of the EEPROM.
    AddressOverflow,

    /// The requested range is empty.
    AddressRange,

    /// A [`SharedEeprom`] was used before a driver was installed with
    /// [`SharedEeprom::init`].
    ///
    /// [`SharedEeprom`]: crate::SharedEeprom
    /// [`SharedEeprom::init`]: crate::SharedEeprom::init
    Uninitialized,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Busy => f.write_str("EEPROM is busy with a write"),
            Error::AddressOverflow => f.write_str("address range exceeds EEPROM size"),
            Error::AddressRange => f.write_str("empty address range"),
            Error::Uninitialized => f.write_str("shared EEPROM driver not initialized"),
        }
    }
}

#[cfg(feature = "util")]
extern crate std;

#[cfg(feature = "util")]
impl std::error::Error for Error {}
