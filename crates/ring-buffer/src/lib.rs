//! Lock-Free Ring Buffer
//!
//! Provides a fixed-capacity SPSC ring buffer for CAN frames captured off the
//! bus. The producer half lives with the bus-receive path, the consumer half
//! with whatever drains frames into monitor output.

mod buffer;
mod frame;

pub use buffer::{channel, Drain, FrameConsumer, FrameProducer, DEFAULT_CAPACITY};
pub use frame::{CanFrame, FrameError, MAX_DATA_LEN};
