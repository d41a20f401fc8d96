// TiltRemote — GPIO Two-wire Master
//
// Clocks the two-wire protocol on two open-drain GPIO lines and presents the
// result as peripheral status flags, so the bus engine drives it exactly like
// a hardware master.  Line faults are reported to the fault monitor the same
// way a hardware error interrupt would.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::drivers::bus::{FaultMonitor, Status, TwiPeripheral};
use crate::error::BusFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Address,
    Transmit,
    Receive,
}

pub struct BitBangTwi<SDA, SCL, D> {
    sda: SDA,
    scl: SCL,
    delay: D,
    half_period_us: u32,
    stretch_limit: u32,
    monitor: Arc<FaultMonitor>,

    phase: Phase,
    flags: Status,
    acknowledge: bool,
    stop_pending: bool,
    rx: u8,
    rx_final: bool,
}

impl<SDA, SCL, D> BitBangTwi<SDA, SCL, D>
where
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
    D: DelayNs,
{
    pub fn new(
        sda: SDA,
        scl: SCL,
        delay: D,
        half_period_us: u32,
        stretch_limit: u32,
        monitor: Arc<FaultMonitor>,
    ) -> Self {
        let mut twi = Self {
            sda,
            scl,
            delay,
            half_period_us,
            stretch_limit: stretch_limit.max(1),
            monitor,
            phase: Phase::Idle,
            flags: Status::EMPTY,
            acknowledge: false,
            stop_pending: false,
            rx: 0,
            rx_final: false,
        };
        twi.float_lines();
        twi
    }

    // ---- line level -------------------------------------------------------

    fn half(&mut self) {
        self.delay.delay_us(self.half_period_us);
    }

    fn float_lines(&mut self) {
        let _ = self.sda.set_high();
        let _ = self.scl.set_high();
    }

    fn sda_high(&mut self) -> bool {
        self.sda.is_high().unwrap_or(false)
    }

    /// Release SCL and wait for it to rise; the target may stretch the clock.
    fn scl_rise(&mut self) -> bool {
        let _ = self.scl.set_high();
        for _ in 0..self.stretch_limit {
            if self.scl.is_high().unwrap_or(false) {
                return true;
            }
            self.delay.delay_us(1);
        }
        self.monitor.report(BusFault::ProtocolTimeout);
        false
    }

    fn write_bit(&mut self, bit: bool) -> bool {
        let _ = if bit { self.sda.set_high() } else { self.sda.set_low() };
        self.half();
        if !self.scl_rise() {
            return false;
        }
        if bit && !self.sda_high() {
            self.monitor.report(BusFault::ArbitrationLoss);
            let _ = self.scl.set_low();
            return false;
        }
        self.half();
        let _ = self.scl.set_low();
        true
    }

    fn read_bit(&mut self) -> Option<bool> {
        let _ = self.sda.set_high();
        self.half();
        if !self.scl_rise() {
            return None;
        }
        let bit = self.sda_high();
        self.half();
        let _ = self.scl.set_low();
        Some(bit)
    }

    /// Shift out MSB first.  `Some(true)` when the target acknowledged.
    fn shift_out(&mut self, byte: u8) -> Option<bool> {
        for i in (0..8).rev() {
            if !self.write_bit(byte & (1 << i) != 0) {
                return None;
            }
        }
        self.read_bit().map(|nack| !nack)
    }

    fn shift_in(&mut self, ack: bool) -> Option<u8> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = (byte << 1) | u8::from(self.read_bit()?);
        }
        self.write_bit(!ack).then_some(byte)
    }

    fn start_condition(&mut self) -> bool {
        if self.phase != Phase::Idle {
            // Repeated start: bring both lines back up first.
            let _ = self.sda.set_high();
            self.half();
            if !self.scl_rise() {
                return false;
            }
        }
        if !self.sda_high() || !self.scl.is_high().unwrap_or(false) {
            self.monitor.report(BusFault::BusError);
            return false;
        }
        self.half();
        let _ = self.sda.set_low();
        self.half();
        let _ = self.scl.set_low();
        true
    }

    fn stop_condition(&mut self) {
        let _ = self.sda.set_low();
        self.half();
        let _ = self.scl_rise();
        self.half();
        let _ = self.sda.set_high();
        self.half();
    }

    fn finish(&mut self) {
        self.phase = Phase::Idle;
        self.flags = Status::EMPTY;
        self.stop_pending = false;
    }
}

impl<SDA, SCL, D> TwiPeripheral for BitBangTwi<SDA, SCL, D>
where
    SDA: InputPin + OutputPin,
    SCL: InputPin + OutputPin,
    D: DelayNs,
{
    fn status(&mut self) -> Status {
        let waiting_for_byte = self.phase == Phase::Receive
            && !self.flags.intersects(Status::ADDR_SENT | Status::RX_NOT_EMPTY);
        if waiting_for_byte {
            let ack = self.acknowledge;
            if let Some(byte) = self.shift_in(ack) {
                self.rx = byte;
                self.rx_final = !ack;
                self.flags = self.flags.insert(Status::RX_NOT_EMPTY | Status::BYTE_FINISHED);
                if self.rx_final && self.stop_pending {
                    self.stop_condition();
                }
            }
        }
        self.flags
    }

    fn clear_address_flag(&mut self) {
        self.flags = self.flags.remove(Status::ADDR_SENT);
    }

    fn generate_start(&mut self) {
        self.stop_pending = false;
        if self.start_condition() {
            self.phase = Phase::Address;
            self.flags = Status::START_SENT | Status::MASTER | Status::BUSY;
        } else {
            self.flags = Status::EMPTY;
        }
    }

    fn generate_stop(&mut self) {
        match self.phase {
            Phase::Receive if !self.flags.contains(Status::RX_NOT_EMPTY) => {
                self.stop_pending = true;
            }
            Phase::Idle => {}
            _ => {
                self.stop_condition();
                self.finish();
            }
        }
    }

    fn set_acknowledge(&mut self, enable: bool) {
        self.acknowledge = enable;
    }

    fn write_data(&mut self, byte: u8) {
        match self.phase {
            Phase::Address => {
                self.flags = self.flags.remove(Status::START_SENT);
                match self.shift_out(byte) {
                    Some(true) if byte & 1 == 1 => {
                        self.phase = Phase::Receive;
                        self.flags = self.flags.insert(Status::ADDR_SENT);
                    }
                    Some(true) => {
                        self.phase = Phase::Transmit;
                        self.flags = self.flags.insert(
                            Status::ADDR_SENT
                                | Status::TRANSMITTER
                                | Status::TX_EMPTY
                                | Status::BYTE_FINISHED,
                        );
                    }
                    Some(false) => {
                        self.monitor.report(BusFault::AcknowledgeFailure);
                    }
                    None => {}
                }
            }
            Phase::Transmit => {
                self.flags = self.flags.remove(Status::TX_EMPTY | Status::BYTE_FINISHED);
                match self.shift_out(byte) {
                    Some(true) => {
                        self.flags = self.flags.insert(Status::TX_EMPTY | Status::BYTE_FINISHED);
                    }
                    Some(false) => self.monitor.report(BusFault::AcknowledgeFailure),
                    None => {}
                }
            }
            Phase::Idle | Phase::Receive => {}
        }
    }

    fn read_data(&mut self) -> u8 {
        self.flags = self.flags.remove(Status::RX_NOT_EMPTY | Status::BYTE_FINISHED);
        if self.rx_final && self.stop_pending {
            self.finish();
        }
        self.rx
    }

    fn reinitialize(&mut self) {
        // Clock out a target that is still holding SDA low mid-byte.
        let _ = self.sda.set_high();
        for _ in 0..9 {
            if self.sda_high() {
                break;
            }
            let _ = self.scl.set_low();
            self.half();
            let _ = self.scl_rise();
            self.half();
        }
        self.stop_condition();
        self.float_lines();
        self.acknowledge = false;
        self.rx_final = false;
        self.finish();
    }
}
