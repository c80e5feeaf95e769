//! ELM327 Adapter Protocol Engine
//!
//! This crate implements the text side of an ELM327/STN compatible OBD-II
//! adapter running on a live CAN bus: it assembles command lines from a raw
//! byte stream, interprets AT/ST configuration commands and PID requests,
//! and renders captured CAN frames as the hex text a real adapter chip emits.
//!
//! Transports and the CAN driver are supplied by the caller through
//! [`CanBus`] and the [`ring_buffer`] producer half.

mod bus;
mod command;
mod emulator;
mod error;
mod filter;
pub mod hex;
mod line;
mod pid;
mod protocol;

pub use bus::CanBus;
pub use command::{AtCommand, Command, StCommand};
pub use emulator::{Emulator, EmulatorConfig, Session, SessionDefaults};
pub use error::ElmError;
pub use filter::{FilterEntry, FilterTable, DEFAULT_FILTER_SLOTS};
pub use line::{CommandLine, LineAssembler, MAX_LINE_LEN};
pub use pid::{
    Pid, PidRequest, DIAG_BROADCAST_ID, DIAG_REQUEST_ID, DIAG_RESPONSE_IDS,
    ISO_TP_PADDING,
};
pub use protocol::ObdProtocol;

pub use ring_buffer::{CanFrame, FrameConsumer, FrameProducer};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Offset added to the mode byte in a positive response
    pub const RESPONSE_OFFSET: u8 = 0x40;
    /// Negative response service identifier
    pub const NEGATIVE_RESPONSE: u8 = 0x7F;
}
