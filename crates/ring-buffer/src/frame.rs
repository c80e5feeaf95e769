//! CAN Frame Definition

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum payload length of a classic CAN frame
pub const MAX_DATA_LEN: usize = 8;

/// Errors building a CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Payload longer than a classic CAN frame allows
    #[error("CAN payload of {0} bytes exceeds {MAX_DATA_LEN}")]
    DataLength(usize),
}

/// A classic CAN frame as seen on the bus.
///
/// The payload is always stored as eight bytes; bytes past `len` are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct CanFrame {
    /// 11-bit or 29-bit identifier
    pub id: u32,
    /// Number of valid payload bytes (0-8)
    pub len: u8,
    /// Payload, zero-padded
    pub data: [u8; MAX_DATA_LEN],
    /// 29-bit identifier
    pub extended: bool,
    /// Remote transmission request
    pub rtr: bool,
}

impl CanFrame {
    /// Create a standard data frame from a payload slice
    pub fn new(id: u32, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_DATA_LEN {
            return Err(FrameError::DataLength(payload.len()));
        }
        let mut data = [0u8; MAX_DATA_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            len: payload.len() as u8,
            data,
            extended: false,
            rtr: false,
        })
    }

    /// Create a full eight byte standard frame
    pub fn with_data(id: u32, data: [u8; MAX_DATA_LEN]) -> Self {
        Self {
            id,
            len: MAX_DATA_LEN as u8,
            data,
            extended: false,
            rtr: false,
        }
    }

    /// The valid part of the payload
    pub fn payload(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(MAX_DATA_LEN)]
    }
}

/// Wire shape accepted when deserializing a frame from configuration
#[derive(Deserialize)]
struct RawFrame {
    id: u32,
    #[serde(default)]
    data: Vec<u8>,
    #[serde(default)]
    extended: bool,
}

impl TryFrom<RawFrame> for CanFrame {
    type Error = FrameError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        let mut frame = CanFrame::new(raw.id, &raw.data)?;
        frame.extended = raw.extended;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_zero_padded() {
        let frame = CanFrame::new(0x200, &[0x02, 0x03]).unwrap();
        assert_eq!(frame.len, 2);
        assert_eq!(frame.payload(), &[0x02, 0x03]);
        assert_eq!(frame.data, [0x02, 0x03, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let err = CanFrame::new(0x100, &[0; 9]).unwrap_err();
        assert_eq!(err, FrameError::DataLength(9));
    }
}
