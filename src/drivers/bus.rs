// TiltRemote — Two-wire Bus Protocol Engine
//
// Drives the start / address / data / stop phases of a two-wire master on top
// of a flag-level peripheral.  Every wait is a bounded busy-poll: the budget
// is re-armed at the start of each wait, decremented once per status poll,
// and running out is the only way a wait fails.

use core::ops::BitOr;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{BusError, BusFault, BusResult, WaitSite};

// ---------------------------------------------------------------------------
// Peripheral status word
// ---------------------------------------------------------------------------

/// Snapshot of the peripheral status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status(u16);

impl Status {
    pub const EMPTY: Status = Status(0);
    /// Start condition generated.
    pub const START_SENT: Status = Status(1 << 0);
    /// Address sent and acknowledged.
    pub const ADDR_SENT: Status = Status(1 << 1);
    /// Byte transfer finished.
    pub const BYTE_FINISHED: Status = Status(1 << 2);
    /// Receive register not empty.
    pub const RX_NOT_EMPTY: Status = Status(1 << 6);
    /// Transmit register empty.
    pub const TX_EMPTY: Status = Status(1 << 7);
    /// Peripheral is bus master.
    pub const MASTER: Status = Status(1 << 8);
    /// Bus busy (between start and stop).
    pub const BUSY: Status = Status(1 << 9);
    /// Peripheral is transmitting (write direction).
    pub const TRANSMITTER: Status = Status(1 << 10);

    /// Master-receiver mode selected after a read-direction address.
    pub const RECEIVER_SELECTED: Status =
        Status(Self::BUSY.0 | Self::MASTER.0 | Self::ADDR_SENT.0);
    /// A byte has been clocked in while master.
    pub const BYTE_RECEIVED: Status = Status(Self::BUSY.0 | Self::MASTER.0 | Self::RX_NOT_EMPTY.0);
    /// Ready for the stop condition.
    pub const TRANSFER_DRAINED: Status = Status(Self::TX_EMPTY.0 | Self::BYTE_FINISHED.0);

    pub const fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Status) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn insert(self, other: Status) -> Status {
        Status(self.0 | other.0)
    }

    #[must_use]
    pub const fn remove(self, other: Status) -> Status {
        Status(self.0 & !other.0)
    }
}

impl BitOr for Status {
    type Output = Status;

    fn bitor(self, rhs: Status) -> Status {
        self.insert(rhs)
    }
}

/// Flag-level two-wire master peripheral.
///
/// Implementations own the physical lines (or registers).  The engine never
/// touches the hardware except through this trait, so the protocol sequencing
/// can run against a simulated device.
pub trait TwiPeripheral {
    /// Poll the status flags.  Called exactly once per wait iteration.
    fn status(&mut self) -> Status;
    /// Secondary status read that clears a pending address match.
    fn clear_address_flag(&mut self);
    fn generate_start(&mut self);
    fn generate_stop(&mut self);
    /// Acknowledge bit for subsequently received bytes.
    fn set_acknowledge(&mut self, enable: bool);
    fn write_data(&mut self, byte: u8);
    fn read_data(&mut self) -> u8;
    /// Return the peripheral to its power-on idle state.
    fn reinitialize(&mut self);
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Transmit,
    Receive,
}

/// One start-to-stop exchange with a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusTransaction {
    /// 7-bit target address.
    pub address: u8,
    pub direction: Direction,
    pub acknowledge: bool,
}

impl BusTransaction {
    pub fn new(address: u8, direction: Direction, acknowledge: bool) -> Self {
        Self {
            address,
            direction,
            acknowledge,
        }
    }

    /// Address byte on the wire: 7-bit address, direction in bit 0.
    pub fn address_byte(&self) -> u8 {
        let rw = match self.direction {
            Direction::Transmit => 0,
            Direction::Receive => 1,
        };
        (self.address << 1) | rw
    }
}

/// Countdown for one bounded wait.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    remaining: u32,
}

impl PollBudget {
    pub fn arm(limit: u32) -> Self {
        Self { remaining: limit }
    }

    /// Spend one poll.  Returns `true` once the budget is exhausted.
    pub fn spend(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining == 0
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct BusEngine<P> {
    periph: P,
    poll_limit: u32,
}

impl<P: TwiPeripheral> BusEngine<P> {
    pub fn new(periph: P, poll_limit: u32) -> Self {
        Self {
            periph,
            poll_limit: poll_limit.max(1),
        }
    }

    pub fn peripheral(&self) -> &P {
        &self.periph
    }

    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.periph
    }

    /// Poll until `ready` holds or the budget runs out.
    fn wait_until(&mut self, site: WaitSite, ready: impl Fn(Status) -> bool) -> BusResult<()> {
        let mut budget = PollBudget::arm(self.poll_limit);
        loop {
            if ready(self.periph.status()) {
                return Ok(());
            }
            if budget.spend() {
                log::warn!("Bus wait timed out at {} after {} polls", site, self.poll_limit);
                return Err(BusError::Timeout(site));
            }
        }
    }

    /// Start condition + address phase.
    pub fn start(&mut self, tx: BusTransaction) -> BusResult<()> {
        self.periph.generate_start();
        self.wait_until(WaitSite::Start, |s| s.contains(Status::START_SENT))?;

        if tx.acknowledge {
            self.periph.set_acknowledge(true);
        }

        self.periph.write_data(tx.address_byte());
        match tx.direction {
            Direction::Transmit => {
                self.wait_until(WaitSite::AddressWrite, |s| s.contains(Status::ADDR_SENT))?
            }
            Direction::Receive => self.wait_until(WaitSite::AddressRead, |s| {
                s.contains(Status::RECEIVER_SELECTED) && !s.intersects(Status::TRANSMITTER)
            })?,
        }

        self.periph.clear_address_flag();
        Ok(())
    }

    /// Wait for the last byte to drain, then assert stop.
    pub fn stop(&mut self) -> BusResult<()> {
        self.wait_until(WaitSite::Stop, |s| s.contains(Status::TRANSFER_DRAINED))?;
        self.periph.generate_stop();
        Ok(())
    }

    /// Assert stop without waiting.  Used to leave the bus idle after an
    /// aborted transaction.
    pub fn release(&mut self) {
        self.periph.set_acknowledge(false);
        self.periph.generate_stop();
    }

    pub fn write_byte(&mut self, data: u8) -> BusResult<()> {
        self.wait_until(WaitSite::WriteByte, |s| s.contains(Status::TX_EMPTY))?;
        self.periph.write_data(data);
        Ok(())
    }

    /// Receive one byte and acknowledge it; more bytes may follow.
    pub fn read_byte_acknowledged(&mut self) -> BusResult<u8> {
        self.periph.set_acknowledge(true);
        self.wait_until(WaitSite::ReadAck, |s| s.contains(Status::BYTE_RECEIVED))?;
        Ok(self.periph.read_data())
    }

    /// Receive the last byte of a read.  The acknowledge bit is cleared and
    /// stop is scheduled before the byte is clocked in.
    pub fn read_byte_final(&mut self) -> BusResult<u8> {
        self.periph.set_acknowledge(false);
        self.periph.generate_stop();
        self.wait_until(WaitSite::ReadFinal, |s| s.contains(Status::BYTE_RECEIVED))?;
        Ok(self.periph.read_data())
    }

    /// Run `body`, releasing the bus if it fails part-way.
    fn transaction<T>(&mut self, body: impl FnOnce(&mut Self) -> BusResult<T>) -> BusResult<T> {
        let result = body(self);
        if result.is_err() {
            self.release();
        }
        result
    }

    /// Write register pointer, stop, then burst-read `buf.len()` bytes.
    pub fn read_multiple(&mut self, address: u8, register: u8, buf: &mut [u8]) -> BusResult<()> {
        if buf.is_empty() {
            return Ok(());
        }

        self.transaction(|bus| {
            bus.start(BusTransaction::new(address, Direction::Transmit, true))?;
            bus.write_byte(register)?;
            bus.stop()?;
            bus.start(BusTransaction::new(address, Direction::Receive, true))?;

            let last = buf.len() - 1;
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = if i == last {
                    bus.read_byte_final()?
                } else {
                    bus.read_byte_acknowledged()?
                };
            }
            Ok(())
        })
    }

    /// Single register read.
    pub fn read_register(&mut self, address: u8, register: u8) -> BusResult<u8> {
        self.transaction(|bus| {
            bus.start(BusTransaction::new(address, Direction::Transmit, false))?;
            bus.write_byte(register)?;
            bus.stop()?;
            bus.start(BusTransaction::new(address, Direction::Receive, false))?;
            bus.read_byte_final()
        })
    }

    /// Single register write: pointer byte, value byte, stop.
    pub fn write_register(&mut self, address: u8, register: u8, value: u8) -> BusResult<()> {
        self.transaction(|bus| {
            bus.start(BusTransaction::new(address, Direction::Transmit, false))?;
            bus.write_byte(register)?;
            bus.write_byte(value)?;
            bus.stop()
        })
    }

    /// Presence probe: address phase with acknowledge, then stop.  The bus is
    /// left idle whether or not the target answered.
    pub fn probe(&mut self, address: u8) -> bool {
        match self.start(BusTransaction::new(address, Direction::Transmit, true)) {
            Ok(()) => {
                if self.stop().is_err() {
                    self.release();
                }
                true
            }
            Err(_) => {
                self.release();
                false
            }
        }
    }

    /// Drain latched faults and apply `policy`.
    pub fn service_faults(&mut self, monitor: &FaultMonitor, policy: FaultPolicy) -> FaultSet {
        let faults = monitor.take();
        if !faults.is_empty() && policy == FaultPolicy::ReinitializeBus {
            log::warn!("Reinitialising bus after {:?}", faults);
            self.periph.reinitialize();
        }
        faults
    }
}

// ---------------------------------------------------------------------------
// Fault reporting
// ---------------------------------------------------------------------------

/// What the worker does with faults reported since the previous period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Log only; the bus keeps running as-is.
    #[default]
    ReportOnly,
    /// Return the peripheral to idle before the next transfer.
    ReinitializeBus,
}

/// Set of latched faults.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultSet(u8);

impl FaultSet {
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, fault: BusFault) -> bool {
        self.0 & fault.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = BusFault> {
        BusFault::PRIORITY
            .into_iter()
            .filter(move |f| self.contains(*f))
    }
}

impl core::fmt::Debug for FaultSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Lock-free latch written from the bus error handler and drained by the
/// worker.  Reporting only logs and sets a bit, so it is safe to call from
/// interrupt context.
#[derive(Debug, Default)]
pub struct FaultMonitor {
    pending: AtomicU8,
}

impl FaultMonitor {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU8::new(0),
        }
    }

    pub fn report(&self, fault: BusFault) {
        log::error!("{}", fault);
        self.pending.fetch_or(fault.bit(), Ordering::AcqRel);
    }

    /// Error-interrupt entry point.  `raised` holds every pending condition;
    /// only the highest-priority one is reported, the rest stay raised for
    /// the next interrupt.
    pub fn on_error_interrupt(&self, raised: FaultSet) -> Option<BusFault> {
        let fault = raised.iter().next()?;
        self.report(fault);
        Some(fault)
    }

    pub fn take(&self) -> FaultSet {
        FaultSet(self.pending.swap(0, Ordering::AcqRel))
    }

    pub fn peek(&self) -> FaultSet {
        FaultSet(self.pending.load(Ordering::Acquire))
    }
}

impl From<BusFault> for FaultSet {
    fn from(fault: BusFault) -> Self {
        FaultSet(fault.bit())
    }
}

impl FromIterator<BusFault> for FaultSet {
    fn from_iter<I: IntoIterator<Item = BusFault>>(iter: I) -> Self {
        FaultSet(iter.into_iter().fold(0, |acc, f| acc | f.bit()))
    }
}
