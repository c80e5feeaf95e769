//! ASCII Hex Encoding of CAN Frames
//!
//! Two textual frame layouts are produced:
//!
//! * monitor lines (`STM`): `III` identifier followed by `DD` for each valid
//!   payload byte, terminated by `\r`
//! * OBD replies: optional `III` + `DD` header (identifier and ISO-TP length
//!   byte), then payload bytes 1 to 7, without terminator
//!
//! Digits are always uppercase.

use crate::error::ElmError;
use ring_buffer::{CanFrame, MAX_DATA_LEN};
use std::fmt::Write;

/// Digits used for a standard identifier
const ID_DIGITS: usize = 3;

/// Append one monitor line for `frame`, including its `\r`
pub fn write_monitor_frame(out: &mut String, frame: &CanFrame) {
    let _ = write!(out, "{:03X}", frame.id);
    for byte in frame.payload() {
        let _ = write!(out, "{:02X}", byte);
    }
    out.push('\r');
}

/// Render a diagnostic response frame the way `ATH` selects
pub fn encode_obd_reply(frame: &CanFrame, headers: bool) -> String {
    let mut out = String::with_capacity(ID_DIGITS + 2 * MAX_DATA_LEN);
    if headers {
        let _ = write!(out, "{:03X}{:02X}", frame.id, frame.data[0]);
    }
    // Always seven bytes, the declared length is not consulted
    for byte in &frame.data[1..] {
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// Parse a headered OBD reply back into a frame
pub fn decode_obd_reply(text: &str) -> Result<CanFrame, ElmError> {
    let bytes = text.as_bytes();
    if bytes.len() != ID_DIGITS + 2 * MAX_DATA_LEN {
        return Err(ElmError::InvalidHex(text.to_string()));
    }

    let id = parse_hex_u32(&bytes[..ID_DIGITS])?;
    let mut data = [0u8; MAX_DATA_LEN];
    ::hex::decode_to_slice(&bytes[ID_DIGITS..], &mut data)
        .map_err(|e| ElmError::InvalidHex(format!("{}: {}", text, e)))?;
    Ok(CanFrame::with_data(id, data))
}

/// Parse 1 to 8 hex digits into a `u32`
pub fn parse_hex_u32(text: &[u8]) -> Result<u32, ElmError> {
    let invalid = || ElmError::InvalidHex(String::from_utf8_lossy(text).into_owned());

    // from_str_radix alone would also accept a leading sign
    if text.is_empty() || text.len() > 8 || !text.iter().all(u8::is_ascii_hexdigit) {
        return Err(invalid());
    }
    let digits = std::str::from_utf8(text).map_err(|_| invalid())?;
    u32::from_str_radix(digits, 16).map_err(|_| invalid())
}
