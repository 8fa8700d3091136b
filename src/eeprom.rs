//! The transfer state machine.

use crate::{utils::HexBytes, Error, Hal, ProgrammingMode};
use core::fmt;

#[derive(Clone, Copy)]
enum Source<'a> {
    /// Single byte, stored inline so the caller need not keep it alive.
    Byte(u8),
    Slice(&'a [u8]),
}

impl Source<'_> {
    fn len(&self) -> usize {
        match self {
            Source::Byte(_) => 1,
            Source::Slice(data) => data.len(),
        }
    }

    fn get(&self, index: u16) -> u8 {
        match self {
            Source::Byte(byte) => *byte,
            Source::Slice(data) => data[usize::from(index)],
        }
    }
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Byte(byte) => write!(f, "Byte({:02x})", byte),
            Source::Slice(data) => f.debug_tuple("Slice").field(&HexBytes(data)).finish(),
        }
    }
}

/// State of the current (or last) write transfer.
///
/// There is exactly one per driver. It is reinitialized whenever a write is
/// accepted and advanced by [`Eeprom::on_interrupt`].
#[derive(Debug, Clone, Copy)]
pub struct Transfer<'a> {
    source: Source<'a>,
    address: u16,
    count: u16,
    length: u16,
    active: bool,
}

impl<'a> Transfer<'a> {
    const IDLE: Self = Transfer {
        source: Source::Slice(&[]),
        address: 0,
        count: 0,
        length: 0,
        active: false,
    };

    /// The EEPROM address of the byte currently being written.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Number of bytes committed so far.
    pub fn count(&self) -> u16 {
        self.count
    }

    /// Total number of bytes in this transfer.
    pub fn length(&self) -> u16 {
        self.length
    }

    /// Returns `true` from the moment a write is accepted until its completion
    /// interrupt has run.
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn current(&self) -> u8 {
        self.source.get(self.count)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Callback<C> {
    func: fn(C),
    context: C,
}

impl<C> Callback<C> {
    pub(crate) fn notify(self) {
        (self.func)(self.context)
    }
}

/// Non-blocking EEPROM driver.
///
/// # Type Parameters
///
/// * **`'a`**: Lifetime of the buffers handed to [`write`](Eeprom::write).
///   Data is never copied, so a buffer stays borrowed for as long as the
///   driver may still read from it.
/// * **`H`**: The [`Hal`] implementation for the EEPROM peripheral.
/// * **`C`**: Context value passed back to the completion callback.
#[derive(Debug)]
pub struct Eeprom<'a, H: Hal, C: Copy = ()> {
    hal: H,
    transfer: Transfer<'a>,
    callback: Option<Callback<C>>,
}

impl<'a, H: Hal, C: Copy> Eeprom<'a, H, C> {
    /// Creates a new driver.
    ///
    /// [`begin`](Eeprom::begin) must be called before the first read or write.
    pub fn new(hal: H) -> Self {
        Self {
            hal,
            transfer: Transfer::IDLE,
            callback: None,
        }
    }

    /// Configures the peripheral for atomic erase-and-write operation.
    pub fn begin(&mut self) {
        self.begin_with_mode(ProgrammingMode::EraseWrite);
    }

    /// Configures the peripheral with an explicit programming mode.
    pub fn begin_with_mode(&mut self, mode: ProgrammingMode) {
        info!("Eeprom::begin: mode = {:?}", mode);
        self.hal.set_mode(mode);
    }

    /// Registers the function called when a write transfer has finished.
    ///
    /// Passing `None` leaves the current registration untouched. The callback
    /// runs in interrupt context and must return quickly without blocking.
    ///
    /// A callback can only be replaced while no transfer is active, otherwise
    /// [`Error::Busy`] is returned and the previous registration stays in
    /// effect.
    pub fn set_callback(&mut self, callback: Option<fn(C)>, context: C) -> Result<(), Error> {
        let func = match callback {
            Some(func) => func,
            None => return Ok(()),
        };
        critical_section::with(|_| {
            if self.transfer.active {
                return Err(Error::Busy);
            }
            self.callback = Some(Callback { func, context });
            Ok(())
        })
    }

    /// Removes the completion callback.
    pub fn clear_callback(&mut self) -> Result<(), Error> {
        critical_section::with(|_| {
            if self.transfer.active {
                return Err(Error::Busy);
            }
            self.callback = None;
            Ok(())
        })
    }

    /// Starts writing `data` to the EEPROM, beginning at `addr`.
    ///
    /// Returns as soon as the first byte has been handed to the peripheral.
    /// The remaining bytes are written from [`on_interrupt`](Eeprom::on_interrupt)
    /// and the completion callback fires after the last one.
    pub fn write(&mut self, addr: u16, data: &'a [u8]) -> Result<(), Error> {
        self.dispatch(addr, Source::Slice(data))
    }

    /// Starts writing a single byte to `addr`.
    pub fn write_byte(&mut self, addr: u16, data: u8) -> Result<(), Error> {
        self.dispatch(addr, Source::Byte(data))
    }

    /// Reads `buf.len()` bytes starting at `addr`.
    ///
    /// This blocks until every byte has been latched. There is no timeout, so
    /// an unresponsive peripheral stalls the caller.
    pub fn read(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), Error> {
        critical_section::with(|_| {
            self.check(addr, buf.len())?;
            trace!("Eeprom::read: {} bytes at 0x{:03x}", buf.len(), addr);
            // The buffer drives the loop so the address never steps past the last byte.
            for (byte, addr) in buf.iter_mut().zip(addr..) {
                self.hal.start_read(addr);
                while !self.hal.is_read_ready() {}
                *byte = self.hal.read_latch();
            }
            Ok(())
        })
    }

    /// Reads the byte at `addr`.
    pub fn read_byte(&mut self, addr: u16) -> Result<u8, Error> {
        let mut buf = [0];
        self.read(addr, &mut buf)?;
        Ok(buf[0])
    }

    /// Advances the current transfer. Call this from the EEPROM ready
    /// interrupt handler.
    pub fn on_interrupt(&mut self) {
        if let Some(callback) = self.advance() {
            callback.notify();
        }
    }

    /// Returns whether a new read or write would be rejected as busy.
    pub fn is_busy(&self) -> bool {
        self.transfer.active || self.hal.is_busy()
    }

    /// The current (or last) transfer.
    pub fn transfer(&self) -> &Transfer<'a> {
        &self.transfer
    }

    /// Shared access to the peripheral.
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Exclusive access to the peripheral. Starting a write behind the
    /// driver's back desynchronizes the transfer state.
    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    /// Destroys the driver and returns the peripheral.
    pub fn free(self) -> H {
        self.hal
    }

    fn check(&self, addr: u16, len: usize) -> Result<(), Error> {
        let end = usize::from(addr) + len;
        if addr > H::MAX_ADDR || end > usize::from(H::MAX_ADDR) {
            return Err(Error::AddressOverflow);
        }
        if len == 0 {
            return Err(Error::AddressRange);
        }
        // A finished byte clears the hardware flag before its interrupt runs,
        // so the transfer flag has to be checked as well.
        if self.is_busy() {
            return Err(Error::Busy);
        }
        Ok(())
    }

    fn dispatch(&mut self, addr: u16, source: Source<'a>) -> Result<(), Error> {
        critical_section::with(|_| {
            self.check(addr, source.len())?;
            // `check` bounds the length by `MAX_ADDR`.
            self.transfer = Transfer {
                source,
                address: addr,
                count: 0,
                length: source.len() as u16,
                active: true,
            };
            debug!(
                "Eeprom::write: {} bytes at 0x{:03x}",
                self.transfer.length, addr
            );
            self.hal.start_write(addr, self.transfer.current());
            Ok(())
        })
    }

    /// Runs one step of the continuation and returns the callback to invoke
    /// if the transfer just finished.
    pub(crate) fn advance(&mut self) -> Option<Callback<C>> {
        let transfer = &mut self.transfer;
        if !transfer.active {
            warn!("Eeprom::on_interrupt: no transfer in progress");
            self.hal.disable_interrupt();
            return None;
        }

        transfer.count += 1;
        if transfer.count == transfer.length {
            self.hal.disable_interrupt();
            transfer.active = false;
            debug!("Eeprom::on_interrupt: {} bytes committed", transfer.count);
            self.callback
        } else {
            transfer.address += 1;
            trace!("Eeprom::on_interrupt: next byte at 0x{:03x}", transfer.address);
            self.hal.start_write(transfer.address, transfer.current());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avr::{Control, Registers};
    use crate::sim::SimEeprom;
    use core::sync::atomic::{AtomicUsize, Ordering};

    type Sim = SimEeprom<1024>;

    fn count(counter: &'static AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn bump(counter: &'static AtomicUsize) {
        counter.fetch_add(100, Ordering::SeqCst);
    }

    fn eeprom<'a>() -> Eeprom<'a, Sim, &'static AtomicUsize> {
        let mut eeprom = Eeprom::new(Sim::new());
        eeprom.begin();
        eeprom
    }

    /// Delivers completion interrupts until the peripheral stops raising them.
    /// Returns the number of interrupts delivered.
    fn run_to_completion<C: Copy>(eeprom: &mut Eeprom<'_, Sim, C>) -> usize {
        let mut interrupts = 0;
        while eeprom.hal_mut().complete() {
            eeprom.on_interrupt();
            interrupts += 1;
        }
        interrupts
    }

    #[test]
    fn begin_selects_erase_write() {
        let eeprom = eeprom();
        assert_eq!(eeprom.hal().mode(), Some(ProgrammingMode::EraseWrite));
    }

    #[test]
    fn write_then_read_back() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let data = [0xAA, 0xBB, 0xCC];
        let mut eeprom = eeprom();
        eeprom.set_callback(Some(count), &DONE).unwrap();

        assert_eq!(eeprom.write(0, &data), Ok(()));
        assert_eq!(eeprom.hal().writes_started(), 1);
        assert_eq!(DONE.load(Ordering::SeqCst), 0);

        assert_eq!(run_to_completion(&mut eeprom), 3);
        assert_eq!(DONE.load(Ordering::SeqCst), 1);
        assert_eq!(eeprom.hal().writes_started(), 3);
        assert!(!eeprom.is_busy());

        let mut buf = [0; 3];
        assert_eq!(eeprom.read(0, &mut buf), Ok(()));
        assert_eq!(buf, [0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn callback_fires_after_last_interrupt_only() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let data = [1, 2, 3, 4, 5];
        let mut eeprom = eeprom();
        eeprom.set_callback(Some(count), &DONE).unwrap();
        eeprom.write(100, &data).unwrap();

        for committed in 1..5 {
            assert!(eeprom.hal_mut().complete());
            eeprom.on_interrupt();
            assert_eq!(eeprom.transfer().count(), committed);
            assert_eq!(eeprom.transfer().address(), 100 + committed);
            assert_eq!(DONE.load(Ordering::SeqCst), 0);
        }
        assert!(eeprom.hal_mut().complete());
        eeprom.on_interrupt();
        assert_eq!(DONE.load(Ordering::SeqCst), 1);
        assert_eq!(eeprom.transfer().count(), 5);
        assert!(!eeprom.transfer().is_active());
        assert!(!eeprom.hal().interrupt_enabled());
        assert_eq!(eeprom.hal().interrupts_disabled(), 1);
    }

    #[test]
    fn overflow_is_rejected_without_touching_hardware() {
        let data = [1, 2, 3];
        let mut eeprom = eeprom();
        assert_eq!(eeprom.write(1022, &data), Err(Error::AddressOverflow));
        assert_eq!(eeprom.write(1024, &data[..1]), Err(Error::AddressOverflow));
        assert_eq!(eeprom.write_byte(u16::MAX, 0), Err(Error::AddressOverflow));
        assert_eq!(eeprom.hal().writes_started(), 0);
        assert!(!eeprom.transfer().is_active());

        let mut buf = [0; 3];
        assert_eq!(eeprom.read(1022, &mut buf), Err(Error::AddressOverflow));
    }

    #[test]
    fn overflow_keeps_transfer_in_flight() {
        let first = [1, 2, 3, 4];
        let data = [1, 2, 3];
        let mut eeprom = eeprom();
        eeprom.write(20, &first).unwrap();
        assert!(eeprom.hal_mut().complete());
        eeprom.on_interrupt();

        assert_eq!(eeprom.write(1022, &data), Err(Error::AddressOverflow));
        assert_eq!(eeprom.write_byte(1024, 0), Err(Error::AddressOverflow));
        let mut buf = [0; 3];
        assert_eq!(eeprom.read(1022, &mut buf), Err(Error::AddressOverflow));

        let transfer = eeprom.transfer();
        assert!(transfer.is_active());
        assert_eq!(transfer.address(), 21);
        assert_eq!(transfer.count(), 1);
        assert_eq!(transfer.length(), 4);
        assert_eq!(eeprom.hal().writes_started(), 2);

        assert_eq!(run_to_completion(&mut eeprom), 3);
        let mut buf = [0; 4];
        eeprom.read(20, &mut buf).unwrap();
        assert_eq!(buf, first);
    }

    #[test]
    fn read_ending_at_top_of_address_space() {
        let mut eeprom: Eeprom<'_, SimEeprom<65536>> = Eeprom::new(SimEeprom::new());
        eeprom.begin();
        eeprom.hal_mut().load(65533, &[0x11, 0x22]).unwrap();

        let mut buf = [0; 2];
        assert_eq!(eeprom.read(65533, &mut buf), Ok(()));
        assert_eq!(buf, [0x11, 0x22]);
        assert_eq!(eeprom.read_byte(65534), Ok(0x22));
        assert_eq!(eeprom.read_byte(65535), Err(Error::AddressOverflow));
    }

    #[test]
    fn bounds_are_exclusive_of_max_addr() {
        let mut eeprom = eeprom();
        let mut buf = [0; 2];
        assert_eq!(eeprom.read(1021, &mut buf), Ok(()));
        assert_eq!(eeprom.read(1022, &mut buf), Err(Error::AddressOverflow));
        assert_eq!(eeprom.write_byte(1022, 7), Ok(()));
    }

    #[test]
    fn empty_range_is_rejected() {
        let mut eeprom = eeprom();
        assert_eq!(eeprom.write(0, &[]), Err(Error::AddressRange));
        assert_eq!(eeprom.read(0, &mut []), Err(Error::AddressRange));
        assert_eq!(eeprom.hal().writes_started(), 0);
    }

    #[test]
    fn busy_dispatch_keeps_transfer_state() {
        let first = [1, 2, 3, 4];
        let second = [9, 9];
        let mut eeprom = eeprom();
        eeprom.write(10, &first).unwrap();
        assert!(eeprom.hal_mut().complete());
        eeprom.on_interrupt();

        assert_eq!(eeprom.write(500, &second), Err(Error::Busy));
        assert_eq!(eeprom.write_byte(500, 9), Err(Error::Busy));
        let mut buf = [0; 2];
        assert_eq!(eeprom.read(500, &mut buf), Err(Error::Busy));

        let transfer = eeprom.transfer();
        assert_eq!(transfer.address(), 11);
        assert_eq!(transfer.count(), 1);
        assert_eq!(transfer.length(), 4);
        assert_eq!(eeprom.hal().writes_started(), 2);
    }

    #[test]
    fn busy_while_completion_interrupt_is_pending() {
        let mut eeprom = eeprom();
        eeprom.write_byte(5, 0x42).unwrap();
        // The byte is done, but the interrupt has not been serviced yet.
        assert!(eeprom.hal_mut().complete());
        assert!(!eeprom.hal().is_busy());
        assert_eq!(eeprom.write_byte(6, 0x43), Err(Error::Busy));

        eeprom.on_interrupt();
        assert_eq!(eeprom.write_byte(6, 0x43), Ok(()));
    }

    #[test]
    fn hardware_busy_rejects_dispatch() {
        let mut eeprom = eeprom();
        eeprom.hal_mut().set_busy(true);
        assert_eq!(eeprom.write_byte(0, 1), Err(Error::Busy));
        assert_eq!(eeprom.read_byte(0), Err(Error::Busy));
        assert_eq!(eeprom.hal().writes_started(), 0);
    }

    #[test]
    fn round_trip_accepts_next_write() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let first = [1, 2];
        let second = [3, 4, 5];
        let mut eeprom = eeprom();
        eeprom.set_callback(Some(count), &DONE).unwrap();

        eeprom.write(0, &first).unwrap();
        assert_eq!(run_to_completion(&mut eeprom), 2);
        eeprom.write(2, &second).unwrap();
        assert_eq!(run_to_completion(&mut eeprom), 3);

        assert_eq!(DONE.load(Ordering::SeqCst), 2);
        let mut buf = [0; 5];
        eeprom.read(0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn single_byte_write_matches_slice_write() {
        static BYTE: AtomicUsize = AtomicUsize::new(0);
        static SLICE: AtomicUsize = AtomicUsize::new(0);

        let mut by_byte = eeprom();
        by_byte.set_callback(Some(count), &BYTE).unwrap();
        assert_eq!(by_byte.write_byte(7, 0x5A), Ok(()));
        let byte_interrupts = run_to_completion(&mut by_byte);

        let data = [0x5A];
        let mut by_slice = eeprom();
        by_slice.set_callback(Some(count), &SLICE).unwrap();
        assert_eq!(by_slice.write(7, &data), Ok(()));
        let slice_interrupts = run_to_completion(&mut by_slice);

        assert_eq!(byte_interrupts, 1);
        assert_eq!(byte_interrupts, slice_interrupts);
        assert_eq!(BYTE.load(Ordering::SeqCst), 1);
        assert_eq!(SLICE.load(Ordering::SeqCst), 1);
        assert_eq!(by_byte.read_byte(7), Ok(0x5A));
        assert_eq!(by_slice.read_byte(7), Ok(0x5A));
    }

    #[test]
    fn reads_see_prior_single_writes() {
        let mut eeprom: Eeprom<'_, Sim> = Eeprom::new(Sim::new());
        eeprom.begin();
        for (i, value) in [0x10u8, 0x20, 0x30, 0x40].iter().enumerate() {
            eeprom.write_byte(200 + i as u16, *value).unwrap();
            run_to_completion(&mut eeprom);
        }
        let mut buf = [0; 4];
        eeprom.read(200, &mut buf).unwrap();
        assert_eq!(buf, [0x10, 0x20, 0x30, 0x40]);
    }

    #[test]
    fn none_callback_keeps_registration() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        static OTHER: AtomicUsize = AtomicUsize::new(0);
        let mut eeprom = eeprom();
        eeprom.set_callback(Some(count), &DONE).unwrap();
        assert_eq!(eeprom.set_callback(None, &OTHER), Ok(()));

        eeprom.write_byte(0, 1).unwrap();
        run_to_completion(&mut eeprom);
        assert_eq!(DONE.load(Ordering::SeqCst), 1);
        assert_eq!(OTHER.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn callback_cannot_change_mid_transfer() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let data = [1, 2];
        let mut eeprom = eeprom();
        eeprom.set_callback(Some(count), &DONE).unwrap();
        eeprom.write(0, &data).unwrap();

        assert_eq!(eeprom.set_callback(Some(bump), &DONE), Err(Error::Busy));
        assert_eq!(eeprom.clear_callback(), Err(Error::Busy));
        run_to_completion(&mut eeprom);
        assert_eq!(DONE.load(Ordering::SeqCst), 1);

        eeprom.set_callback(Some(bump), &DONE).unwrap();
        eeprom.write_byte(0, 3).unwrap();
        run_to_completion(&mut eeprom);
        assert_eq!(DONE.load(Ordering::SeqCst), 101);
    }

    #[test]
    fn cleared_callback_is_not_called() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let mut eeprom = eeprom();
        eeprom.set_callback(Some(count), &DONE).unwrap();
        eeprom.clear_callback().unwrap();
        eeprom.write_byte(0, 1).unwrap();
        assert_eq!(run_to_completion(&mut eeprom), 1);
        assert_eq!(DONE.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn spurious_interrupt_is_ignored() {
        static DONE: AtomicUsize = AtomicUsize::new(0);
        let mut eeprom = eeprom();
        eeprom.set_callback(Some(count), &DONE).unwrap();
        eeprom.on_interrupt();
        assert_eq!(DONE.load(Ordering::SeqCst), 0);
        assert_eq!(eeprom.transfer().count(), 0);
        assert_eq!(eeprom.hal().writes_started(), 0);

        eeprom.write_byte(0, 1).unwrap();
        run_to_completion(&mut eeprom);
        eeprom.on_interrupt();
        assert_eq!(DONE.load(Ordering::SeqCst), 1);
        assert_eq!(eeprom.transfer().count(), 1);
    }

    #[test]
    fn write_only_mode_clears_bits() {
        let mut eeprom: Eeprom<'_, Sim> = Eeprom::new(Sim::new());
        eeprom.begin_with_mode(ProgrammingMode::WriteOnly);
        eeprom.write_byte(0, 0xF0).unwrap();
        run_to_completion(&mut eeprom);
        eeprom.write_byte(0, 0x3C).unwrap();
        run_to_completion(&mut eeprom);
        assert_eq!(eeprom.read_byte(0), Ok(0x30));
    }

    #[test]
    fn drives_avr_registers() {
        let mut regs = [0u8; 4];
        {
            let hal = unsafe { Registers::new(regs.as_mut_ptr()) };
            let mut eeprom: Eeprom<'_, Registers> = Eeprom::new(hal);
            eeprom.begin();
            assert_eq!(eeprom.write_byte(0x1A5, 0x77), Ok(()));
            let control = eeprom.hal().control();
            assert!(control.contains(Control::EEMPE | Control::EEPE | Control::EERIE));
            // Nothing clears EEPE in RAM.
            assert!(eeprom.hal().is_busy());
            assert_eq!(eeprom.write_byte(0, 0), Err(Error::Busy));
        }
        assert_eq!(regs[1], 0x77);
        assert_eq!(regs[2], 0xA5);
        assert_eq!(regs[3], 0x01);
    }
}
