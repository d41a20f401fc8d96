// TiltRemote — Error Types
//
// Failures of the two-wire bus and the MPU6050 driver.

use core::fmt;

use thiserror::Error;

/// Bounded wait that ran out of polls. Used to tag timeout diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSite {
    /// Start condition never reported as sent.
    Start,
    /// Address (write direction) never acknowledged.
    AddressWrite,
    /// Receiver mode never selected after the address (read direction).
    AddressRead,
    /// Transmit register / byte transfer never finished before stop.
    Stop,
    /// Transmit register never emptied before loading a data byte.
    WriteByte,
    /// No byte received while acknowledging.
    ReadAck,
    /// No byte received for the final (non-acknowledged) read.
    ReadFinal,
}

impl fmt::Display for WaitSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::AddressWrite => "address/write",
            Self::AddressRead => "address/read",
            Self::Stop => "stop",
            Self::WriteByte => "write-byte",
            Self::ReadAck => "read-ack",
            Self::ReadFinal => "read-final",
        };
        f.write_str(name)
    }
}

/// Conditions raised by the bus error interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    AcknowledgeFailure,
    BusError,
    ArbitrationLoss,
    Overrun,
    PacketErrorCheck,
    ProtocolTimeout,
    Alert,
}

impl BusFault {
    /// Report priority: when several conditions are pending, the first one
    /// in this order is the one reported.
    pub const PRIORITY: [BusFault; 7] = [
        Self::AcknowledgeFailure,
        Self::BusError,
        Self::ArbitrationLoss,
        Self::Overrun,
        Self::PacketErrorCheck,
        Self::ProtocolTimeout,
        Self::Alert,
    ];

    /// Single-bit mask used by the fault latch.
    pub const fn bit(self) -> u8 {
        match self {
            Self::AcknowledgeFailure => 1 << 0,
            Self::BusError => 1 << 1,
            Self::ArbitrationLoss => 1 << 2,
            Self::Overrun => 1 << 3,
            Self::PacketErrorCheck => 1 << 4,
            Self::ProtocolTimeout => 1 << 5,
            Self::Alert => 1 << 6,
        }
    }

    /// Category name written to the diagnostic log.
    pub fn name(self) -> &'static str {
        match self {
            Self::AcknowledgeFailure => "BUS_ACK_FAILURE",
            Self::BusError => "BUS_ERROR",
            Self::ArbitrationLoss => "BUS_ARBITRATION_LOST",
            Self::Overrun => "BUS_OVERRUN",
            Self::PacketErrorCheck => "BUS_PEC_ERROR",
            Self::ProtocolTimeout => "BUS_TIMEOUT",
            Self::Alert => "BUS_ALERT",
        }
    }
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from the bus protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    /// A bounded wait exhausted its poll budget.
    #[error("bus timeout at {0}")]
    Timeout(WaitSite),

    /// A fault latched by the error handler.
    #[error("bus fault: {0}")]
    Fault(BusFault),
}

/// Errors from the MPU6050 register driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Presence probe was not acknowledged.
    #[error("device not connected")]
    NotConnected,

    /// Identity register returned an unexpected value.
    #[error("device invalid: WHO_AM_I = 0x{found:02X}")]
    Invalid { found: u8 },

    /// A register transfer failed on the bus.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result type for bus operations.
pub type BusResult<T> = core::result::Result<T, BusError>;
