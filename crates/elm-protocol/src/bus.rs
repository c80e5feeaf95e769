//! CAN Bus Send Primitive

use crate::error::ElmError;
use ring_buffer::CanFrame;

/// Transmit side of the CAN bus the emulator sits on.
///
/// Sending must not block; the dispatcher calls it from inside command
/// handling.
pub trait CanBus {
    /// Queue a frame for transmission
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ElmError>;
}

impl<B: CanBus + ?Sized> CanBus for &mut B {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ElmError> {
        (**self).send_frame(frame)
    }
}

impl CanBus for Vec<CanFrame> {
    fn send_frame(&mut self, frame: &CanFrame) -> Result<(), ElmError> {
        self.push(*frame);
        Ok(())
    }
}
