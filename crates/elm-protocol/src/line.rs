//! Command Line Assembly
//!
//! Turns the raw byte stream from the host into command lines: carriage
//! return terminates a line, spaces and linefeeds are dropped, everything
//! else is folded to lowercase.

use std::fmt;
use std::ops::Deref;

/// Longest command line kept; the next byte forces completion
pub const MAX_LINE_LEN: usize = 127;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// A normalized command line (lowercase, no spaces or linefeeds)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CommandLine {
    buf: [u8; MAX_LINE_LEN],
    len: usize,
}

impl CommandLine {
    /// Build a line from text, applying the same normalization as the
    /// assembler. Text past the capacity is truncated.
    pub fn new(text: impl AsRef<[u8]>) -> Self {
        let mut line = Self::default();
        for &byte in text.as_ref() {
            if line.is_full() {
                break;
            }
            if byte != CR {
                line.push(byte);
            }
        }
        line
    }

    /// Raw bytes of the line
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Check if the line reached its capacity
    pub fn is_full(&self) -> bool {
        self.len >= MAX_LINE_LEN
    }

    fn push(&mut self, byte: u8) {
        if byte == LF || byte == b' ' || self.is_full() {
            return;
        }
        self.buf[self.len] = byte.to_ascii_lowercase();
        self.len += 1;
    }
}

impl Default for CommandLine {
    fn default() -> Self {
        Self {
            buf: [0; MAX_LINE_LEN],
            len: 0,
        }
    }
}

impl Deref for CommandLine {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandLine({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Accumulates bytes until a command line is complete
#[derive(Debug, Default)]
pub struct LineAssembler {
    current: CommandLine,
}

impl LineAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns the finished line on carriage return, or when
    /// a byte arrives while the line is already at capacity; the completing
    /// byte itself is not stored.
    pub fn feed(&mut self, byte: u8) -> Option<CommandLine> {
        if byte == CR || self.current.is_full() {
            return Some(std::mem::take(&mut self.current));
        }
        self.current.push(byte);
        None
    }

    /// Bytes accumulated so far
    pub fn pending(&self) -> &[u8] {
        self.current.as_bytes()
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.current = CommandLine::default();
    }
}
