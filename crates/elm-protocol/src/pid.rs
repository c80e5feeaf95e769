//! OBD-II PID Requests
//!
//! A host sends a PID request as four hex digits, mode then PID. The
//! emulator turns it into a single-frame ISO-TP request on the bus.

use ring_buffer::CanFrame;
use serde::{Deserialize, Serialize};

/// Physical request identifier of the engine ECU
pub const DIAG_REQUEST_ID: u32 = 0x7E0;

/// Functional (broadcast) request identifier
pub const DIAG_BROADCAST_ID: u32 = 0x7DF;

/// Identifiers ECUs answer diagnostic requests from
pub const DIAG_RESPONSE_IDS: std::ops::RangeInclusive<u32> = 0x7E8..=0x7EF;

/// Filler for unused single-frame payload bytes
pub const ISO_TP_PADDING: u8 = 0xAA;

/// Standard OBD-II PIDs for Mode 01 (current data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Pid {
    /// Supported PIDs 01-20 (0x00)
    Supported = 0x00,
    /// Calculated engine load (0x04)
    EngineLoad = 0x04,
    /// Engine coolant temperature (0x05)
    CoolantTemp = 0x05,
    /// Short-term fuel trim bank 1 (0x06)
    ShortFuelTrim = 0x06,
    /// Long-term fuel trim bank 1 (0x07)
    LongFuelTrim = 0x07,
    /// Intake manifold absolute pressure (0x0B)
    IntakeManifoldPressure = 0x0B,
    /// Engine RPM (0x0C)
    Rpm = 0x0C,
    /// Vehicle speed (0x0D)
    Speed = 0x0D,
    /// Mass air flow rate (0x10)
    Maf = 0x10,
    /// Throttle position (0x11)
    ThrottlePosition = 0x11,
    /// Oxygen sensor voltage bank 1, sensor 1 (0x14)
    O2Voltage = 0x14,
}

impl Pid {
    /// Every PID this module knows about
    pub const ALL: [Pid; 11] = [
        Pid::Supported,
        Pid::EngineLoad,
        Pid::CoolantTemp,
        Pid::ShortFuelTrim,
        Pid::LongFuelTrim,
        Pid::IntakeManifoldPressure,
        Pid::Rpm,
        Pid::Speed,
        Pid::Maf,
        Pid::ThrottlePosition,
        Pid::O2Voltage,
    ];

    /// Get the PID hex value
    pub fn as_hex(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for Pid {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Pid::ALL
            .into_iter()
            .find(|pid| pid.as_hex() == value)
            .ok_or(value)
    }
}

/// A mode + PID request typed by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidRequest {
    pub mode: u8,
    pub pid: u8,
}

impl PidRequest {
    /// Parse a four hex digit request line. Anything else is not a request.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let mut bytes = [0u8; 2];
        hex::decode_to_slice(line, &mut bytes).ok()?;
        Some(Self {
            mode: bytes[0],
            pid: bytes[1],
        })
    }

    /// Build the single-frame request sent to the engine ECU
    pub fn to_frame(&self) -> CanFrame {
        CanFrame::with_data(
            DIAG_REQUEST_ID,
            [
                2,
                self.mode,
                self.pid,
                ISO_TP_PADDING,
                ISO_TP_PADDING,
                ISO_TP_PADDING,
                ISO_TP_PADDING,
                ISO_TP_PADDING,
            ],
        )
    }
}
