//! Lock-Free Ring Buffer Implementation

use crate::CanFrame;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default buffer capacity (one slot is always kept free, so 31 frames)
pub const DEFAULT_CAPACITY: usize = 32;

/// Storage and indices shared by the two halves
struct Shared {
    /// Pre-allocated slots
    storage: Box<[UnsafeCell<CanFrame>]>,
    /// Number of slots
    capacity: usize,
    /// Write index, only advanced by the producer
    head: AtomicUsize,
    /// Read index, only advanced by the consumer
    tail: AtomicUsize,
    /// Total frames accepted (for statistics)
    total_written: AtomicUsize,
    /// Total frames refused because the buffer was full
    dropped: AtomicUsize,
}

// SAFETY: the producer only writes the slot at `head` before publishing it
// with a release store, and the consumer only reads slots in [tail, head)
// after an acquire load. `FrameProducer` and `FrameConsumer` are not Clone,
// so there is exactly one writer and one reader of each slot at a time.
unsafe impl Sync for Shared {}

impl Shared {
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        if head >= tail {
            head - tail
        } else {
            self.capacity - tail + head
        }
    }
}

/// Create a ring buffer with `capacity` slots, split into its two halves.
///
/// At most `capacity - 1` frames are held at once: an enqueue that would make
/// the write index catch up with the read index is refused, never
/// overwriting an unread frame.
///
/// # Panics
/// Panics if `capacity` is less than 2.
pub fn channel(capacity: usize) -> (FrameProducer, FrameConsumer) {
    assert!(capacity >= 2, "Ring buffer needs at least two slots");

    let storage: Vec<UnsafeCell<CanFrame>> = (0..capacity)
        .map(|_| UnsafeCell::new(CanFrame::default()))
        .collect();
    let shared = Arc::new(Shared {
        storage: storage.into_boxed_slice(),
        capacity,
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        total_written: AtomicUsize::new(0),
        dropped: AtomicUsize::new(0),
    });

    (
        FrameProducer {
            shared: Arc::clone(&shared),
        },
        FrameConsumer { shared },
    )
}

/// Writing half, owned by the bus-receive path
pub struct FrameProducer {
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Enqueue a frame. When the buffer is full the frame is handed back and
    /// the indices are left untouched.
    pub fn push(&mut self, frame: CanFrame) -> Result<(), CanFrame> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let next_head = (head + 1) % shared.capacity;

        if next_head == shared.tail.load(Ordering::Acquire) {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(frame);
        }

        // SAFETY: slot `head` is outside [tail, head) so the consumer never
        // touches it until the store below publishes it.
        unsafe {
            *shared.storage[head].get() = frame;
        }

        shared.head.store(next_head, Ordering::Release);
        shared.total_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Check if the next push would be refused
    pub fn is_full(&self) -> bool {
        self.shared.len() == self.shared.capacity - 1
    }

    /// Get the number of frames currently queued
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FrameProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameProducer")
            .field("len", &self.shared.len())
            .field("capacity", &self.shared.capacity)
            .finish()
    }
}

/// Reading half, owned by the command dispatcher
pub struct FrameConsumer {
    shared: Arc<Shared>,
}

impl FrameConsumer {
    /// Take the oldest unread frame
    pub fn pop(&mut self) -> Option<CanFrame> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        if tail == shared.head.load(Ordering::Acquire) {
            return None;
        }
        Some(self.take(tail))
    }

    /// Drain every frame queued at the time of the call.
    ///
    /// Frames the producer adds while the iterator is alive are left for the
    /// next drain, which keeps a drain bounded under constant bus traffic.
    pub fn drain(&mut self) -> Drain<'_> {
        let end = self.shared.head.load(Ordering::Acquire);
        Drain {
            consumer: self,
            end,
        }
    }

    fn take(&mut self, tail: usize) -> CanFrame {
        let shared = &*self.shared;
        // SAFETY: tail != head was observed with acquire ordering, so the
        // producer has finished writing this slot and won't reuse it until
        // the release store below.
        let frame = unsafe { *shared.storage[tail].get() };
        shared
            .tail
            .store((tail + 1) % shared.capacity, Ordering::Release);
        frame
    }

    /// Get the number of frames currently queued
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of slots
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Get total frames accepted (for statistics)
    pub fn total_written(&self) -> usize {
        self.shared.total_written.load(Ordering::Relaxed)
    }

    /// Get total frames refused because the buffer was full
    pub fn dropped(&self) -> usize {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Discard everything currently queued
    pub fn clear(&mut self) {
        let head = self.shared.head.load(Ordering::Acquire);
        self.shared.tail.store(head, Ordering::Release);
    }
}

impl fmt::Debug for FrameConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameConsumer")
            .field("len", &self.shared.len())
            .field("capacity", &self.shared.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Iterator returned by [`FrameConsumer::drain`]
pub struct Drain<'a> {
    consumer: &'a mut FrameConsumer,
    end: usize,
}

impl Iterator for Drain<'_> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<CanFrame> {
        let tail = self.consumer.shared.tail.load(Ordering::Relaxed);
        if tail == self.end {
            return None;
        }
        Some(self.consumer.take(tail))
    }
}
