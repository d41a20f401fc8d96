// TiltRemote — Simulated Bus Peripheral
//
// Flag-level model of a two-wire master with one MPU6050 register file behind
// it.  Used by the host simulation build and by the tests: it counts status
// polls, records register writes, can hold any status flag low forever and
// can play a device that is absent for the first N probes.  A shared
// SimMotion feeds new poses into a peripheral that has already been moved into
// a running task.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use embedded_hal::digital::{ErrorType, OutputPin};

use crate::config::*;
use crate::drivers::bus::{FaultMonitor, FaultSet, Status, TwiPeripheral};
use crate::error::BusFault;

/// Raw accelerometer and gyroscope counts, copied into the register file at
/// every start condition.
#[derive(Debug, Default)]
pub struct SimMotion {
    raw: Mutex<([i16; 3], [i16; 3])>,
}

impl SimMotion {
    pub fn set_accel(&self, accel: [i16; 3]) {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner).0 = accel;
    }

    pub fn set_gyro(&self, gyro: [i16; 3]) {
        self.raw.lock().unwrap_or_else(PoisonError::into_inner).1 = gyro;
    }

    fn snapshot(&self) -> ([i16; 3], [i16; 3]) {
        *self.raw.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Output pin that only remembers its level.  Clones share the level.
#[derive(Debug, Clone, Default)]
pub struct SimPin(Arc<AtomicBool>);

impl SimPin {
    pub fn is_set_high(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    Transmit { pointer_written: bool },
    Receive,
}

pub struct SimPeripheral {
    address: u8,
    registers: [u8; 128],
    pointer: Option<u8>,

    phase: Phase,
    flags: Status,
    stalled: Status,
    acknowledge: bool,
    stop_pending: bool,
    last_byte_final: bool,
    rx: u8,

    present: bool,
    absent_probes: u32,
    faults: Option<Arc<FaultMonitor>>,
    motion: Option<Arc<SimMotion>>,

    // Counters for assertions
    polls: u32,
    address_phases: u32,
    acknowledged_reads: u32,
    final_reads: u32,
    reinitializations: u32,
    writes: Vec<(u8, u8)>,
}

impl SimPeripheral {
    /// A present, identity-correct MPU6050 at `address`.
    pub fn new(address: u8) -> Self {
        let mut registers = [0u8; 128];
        registers[REG_WHO_AM_I as usize] = WHO_AM_I_EXPECTED;
        registers[REG_PWR_MGMT_1 as usize] = 0x40; // SLEEP after reset

        Self {
            address,
            registers,
            pointer: None,
            phase: Phase::Idle,
            flags: Status::EMPTY,
            stalled: Status::EMPTY,
            acknowledge: false,
            stop_pending: false,
            last_byte_final: false,
            rx: 0,
            present: true,
            absent_probes: 0,
            faults: None,
            motion: None,
            polls: 0,
            address_phases: 0,
            acknowledged_reads: 0,
            final_reads: 0,
            reinitializations: 0,
            writes: Vec::new(),
        }
    }

    /// Route acknowledge failures to an error-interrupt monitor.
    pub fn with_fault_monitor(mut self, monitor: Arc<FaultMonitor>) -> Self {
        self.faults = Some(monitor);
        self
    }

    /// Take accelerometer and gyroscope values from `motion` from now on.
    pub fn with_motion(mut self, motion: Arc<SimMotion>) -> Self {
        self.motion = Some(motion);
        self
    }

    // ---- scenario controls ------------------------------------------------

    /// Never report `flag`, so any wait on it runs out of polls.
    pub fn stall(&mut self, flag: Status) {
        self.stalled = self.stalled.insert(flag);
    }

    pub fn unstall(&mut self) {
        self.stalled = Status::EMPTY;
    }

    pub fn set_present(&mut self, present: bool) {
        self.present = present;
        self.absent_probes = 0;
    }

    /// Stay silent for the next `probes` address phases, then answer.
    pub fn absent_for(&mut self, probes: u32) {
        self.present = true;
        self.absent_probes = probes;
    }

    pub fn load_registers(&mut self, start: u8, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.registers[(start as usize + i) & 0x7F] = *b;
        }
    }

    pub fn set_accel(&mut self, raw: [i16; 3]) {
        self.load_axes(REG_ACCEL_XOUT_H, raw);
    }

    pub fn set_gyro(&mut self, raw: [i16; 3]) {
        self.load_axes(REG_GYRO_XOUT_H, raw);
    }

    fn load_axes(&mut self, base: u8, raw: [i16; 3]) {
        let mut bytes = [0u8; BURST_AXIS_LEN];
        for (chunk, v) in bytes.chunks_exact_mut(2).zip(raw) {
            chunk.copy_from_slice(&v.to_be_bytes());
        }
        self.load_registers(base, &bytes);
    }

    // ---- observations -----------------------------------------------------

    pub fn register(&self, reg: u8) -> u8 {
        self.registers[(reg & 0x7F) as usize]
    }

    pub fn register_writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    pub fn pointer(&self) -> Option<u8> {
        self.pointer
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn reset_polls(&mut self) {
        self.polls = 0;
    }

    pub fn address_phases(&self) -> u32 {
        self.address_phases
    }

    pub fn acknowledged_reads(&self) -> u32 {
        self.acknowledged_reads
    }

    pub fn final_reads(&self) -> u32 {
        self.final_reads
    }

    pub fn reinitializations(&self) -> u32 {
        self.reinitializations
    }

    /// No transfer in progress, or stop already asserted.
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle || self.stop_pending
    }

    // ---- internals --------------------------------------------------------

    fn answers(&mut self, address: u8) -> bool {
        if address != self.address || !self.present {
            return false;
        }
        if self.absent_probes > 0 {
            self.absent_probes -= 1;
            return false;
        }
        true
    }

    fn go_idle(&mut self) {
        self.phase = Phase::Idle;
        self.flags = Status::EMPTY;
        self.stop_pending = false;
    }

    fn next_register(&mut self) -> u8 {
        let ptr = self.pointer.unwrap_or(0);
        self.pointer = Some(ptr.wrapping_add(1) & 0x7F);
        self.registers[ptr as usize]
    }

    /// Clock in the next byte once the address flag has been cleared.
    fn clock_in(&mut self) {
        if self.phase != Phase::Receive
            || self.flags.intersects(Status::ADDR_SENT | Status::RX_NOT_EMPTY)
            || self.stalled.contains(Status::RX_NOT_EMPTY)
        {
            return;
        }
        self.rx = self.next_register();
        self.last_byte_final = !self.acknowledge;
        if self.last_byte_final {
            self.final_reads += 1;
        } else {
            self.acknowledged_reads += 1;
        }
        self.flags = self.flags.insert(Status::RX_NOT_EMPTY | Status::BYTE_FINISHED);
    }
}

impl TwiPeripheral for SimPeripheral {
    fn status(&mut self) -> Status {
        self.polls += 1;
        self.clock_in();
        self.flags.remove(self.stalled)
    }

    fn clear_address_flag(&mut self) {
        self.flags = self.flags.remove(Status::ADDR_SENT);
    }

    fn generate_start(&mut self) {
        if let Some((accel, gyro)) = self.motion.as_ref().map(|m| m.snapshot()) {
            self.set_accel(accel);
            self.set_gyro(gyro);
        }
        self.stop_pending = false;
        self.phase = Phase::Address;
        self.flags = Status::START_SENT | Status::MASTER | Status::BUSY;
    }

    fn generate_stop(&mut self) {
        match self.phase {
            // Takes effect after the byte currently being received.
            Phase::Receive if !self.last_byte_final || self.flags.contains(Status::RX_NOT_EMPTY) => {
                self.stop_pending = true;
            }
            _ => self.go_idle(),
        }
    }

    fn set_acknowledge(&mut self, enable: bool) {
        self.acknowledge = enable;
    }

    fn write_data(&mut self, byte: u8) {
        match self.phase {
            Phase::Address => {
                self.address_phases += 1;
                self.flags = self.flags.remove(Status::START_SENT);
                if !self.answers(byte >> 1) {
                    if let Some(monitor) = &self.faults {
                        monitor.on_error_interrupt(FaultSet::from(BusFault::AcknowledgeFailure));
                    }
                    return;
                }
                if byte & 1 == 1 {
                    self.phase = Phase::Receive;
                    self.last_byte_final = false;
                    self.flags = self.flags.insert(Status::ADDR_SENT);
                } else {
                    self.phase = Phase::Transmit {
                        pointer_written: false,
                    };
                    self.flags = self.flags.insert(
                        Status::ADDR_SENT
                            | Status::TRANSMITTER
                            | Status::TX_EMPTY
                            | Status::BYTE_FINISHED,
                    );
                }
            }
            Phase::Transmit { pointer_written } => {
                if pointer_written {
                    let reg = self.pointer.unwrap_or(0);
                    self.registers[reg as usize] = byte;
                    self.writes.push((reg, byte));
                    self.pointer = Some(reg.wrapping_add(1) & 0x7F);
                } else {
                    self.pointer = Some(byte & 0x7F);
                    self.phase = Phase::Transmit {
                        pointer_written: true,
                    };
                }
                self.flags = self.flags.insert(Status::TX_EMPTY | Status::BYTE_FINISHED);
            }
            Phase::Idle | Phase::Receive => {}
        }
    }

    fn read_data(&mut self) -> u8 {
        self.flags = self.flags.remove(Status::RX_NOT_EMPTY | Status::BYTE_FINISHED);
        if self.last_byte_final && self.stop_pending {
            self.go_idle();
        }
        self.rx
    }

    fn reinitialize(&mut self) {
        self.reinitializations += 1;
        self.acknowledge = false;
        self.go_idle();
    }
}
