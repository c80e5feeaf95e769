//! OBD-II Protocol Definitions

use serde::{Deserialize, Serialize};

/// OBD-II protocols an ELM327 can be asked to select with `ATSP`.
///
/// The emulator always talks 11-bit CAN at 500 kbaud; the others are only
/// recognised so a selection request can be logged meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObdProtocol {
    /// Automatic protocol detection
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    #[default]
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Look up a protocol by the digit used in `ATSP`/`ATDPN`
    pub fn from_elm_digit(digit: u8) -> Option<Self> {
        let protocol = match digit.to_ascii_lowercase() {
            b'0' => ObdProtocol::Auto,
            b'1' => ObdProtocol::J1850Pwm,
            b'2' => ObdProtocol::J1850Vpw,
            b'3' => ObdProtocol::Iso9141_2,
            b'4' => ObdProtocol::Iso14230_4Kwp,
            b'5' => ObdProtocol::Iso14230_4KwpFast,
            b'6' => ObdProtocol::Iso15765_4Can11bit500,
            b'7' => ObdProtocol::Iso15765_4Can29bit500,
            b'8' => ObdProtocol::Iso15765_4Can11bit250,
            b'9' => ObdProtocol::Iso15765_4Can29bit250,
            _ => return None,
        };
        Some(protocol)
    }

    /// Parse the argument of an `ATSP` command (`6`, `a6`, ...)
    pub fn from_elm_argument(arg: &[u8]) -> Option<Self> {
        match arg {
            [digit] | [b'a', digit] => Self::from_elm_digit(*digit),
            _ => None,
        }
    }

    /// Protocol number as reported by `ATDPN`
    pub fn elm_number(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "0",
            ObdProtocol::J1850Pwm => "1",
            ObdProtocol::J1850Vpw => "2",
            ObdProtocol::Iso9141_2 => "3",
            ObdProtocol::Iso14230_4Kwp => "4",
            ObdProtocol::Iso14230_4KwpFast => "5",
            ObdProtocol::Iso15765_4Can11bit500 => "6",
            ObdProtocol::Iso15765_4Can29bit500 => "7",
            ObdProtocol::Iso15765_4Can11bit250 => "8",
            ObdProtocol::Iso15765_4Can29bit250 => "9",
        }
    }

    /// Short description as reported by `ATDP`
    pub fn description(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "auto",
            ObdProtocol::J1850Pwm => "j1850pwm",
            ObdProtocol::J1850Vpw => "j1850vpw",
            ObdProtocol::Iso9141_2 => "iso9141-2",
            ObdProtocol::Iso14230_4Kwp => "kwp",
            ObdProtocol::Iso14230_4KwpFast => "kwp-fast",
            ObdProtocol::Iso15765_4Can11bit500 => "can11/500",
            ObdProtocol::Iso15765_4Can29bit500 => "can29/500",
            ObdProtocol::Iso15765_4Can11bit250 => "can11/250",
            ObdProtocol::Iso15765_4Can29bit250 => "can29/250",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_can11_500() {
        let protocol = ObdProtocol::default();
        assert_eq!(protocol.description(), "can11/500");
        assert_eq!(protocol.elm_number(), "6");
    }

    #[test]
    fn test_atsp_argument() {
        assert_eq!(ObdProtocol::from_elm_argument(b"0"), Some(ObdProtocol::Auto));
        assert_eq!(
            ObdProtocol::from_elm_argument(b"a7"),
            Some(ObdProtocol::Iso15765_4Can29bit500)
        );
        assert_eq!(ObdProtocol::from_elm_argument(b""), None);
        assert_eq!(ObdProtocol::from_elm_argument(b"x"), None);
    }
}
