//! ELM Protocol Error Types

use thiserror::Error;

/// Errors raised inside the protocol engine.
///
/// None of these reach the host: the command surface always answers with an
/// affirmative or empty reply, these only feed logging.
#[derive(Debug, Error)]
pub enum ElmError {
    /// Text that should have been hexadecimal wasn't
    #[error("Invalid hex text: {0:?}")]
    InvalidHex(String),

    /// Filter argument list could not be parsed
    #[error("Malformed filter arguments: {0:?}")]
    FilterArguments(String),

    /// The bus refused or failed to transmit a frame
    #[error("CAN bus error: {0}")]
    CanBusError(String),
}
