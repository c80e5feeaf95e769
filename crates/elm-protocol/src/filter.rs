//! Pass Filter Table for Bus Monitoring

use tracing::debug;

/// Default number of pass filter slots
pub const DEFAULT_FILTER_SLOTS: usize = 32;

/// One (identifier, mask) pass filter. An identifier of 0 marks the slot
/// unused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterEntry {
    pub id: u32,
    pub mask: u32,
}

impl FilterEntry {
    /// Check if the slot holds a filter
    pub fn is_active(&self) -> bool {
        self.id != 0
    }

    /// Check if a frame identifier passes this filter
    pub fn matches(&self, frame_id: u32) -> bool {
        frame_id & self.mask == self.id
    }
}

/// Fixed-size table of pass filters set with `STFAP` and cleared with
/// `STFCP`
#[derive(Debug, Clone)]
pub struct FilterTable {
    entries: Box<[FilterEntry]>,
}

impl FilterTable {
    /// Create a table with `slots` unused entries
    pub fn new(slots: usize) -> Self {
        Self {
            entries: vec![FilterEntry::default(); slots].into_boxed_slice(),
        }
    }

    /// Store a filter in the first unused slot. Returns false when the table
    /// is full, in which case nothing changes.
    pub fn insert(&mut self, id: u32, mask: u32) -> bool {
        match self.entries.iter_mut().find(|entry| !entry.is_active()) {
            Some(slot) => {
                *slot = FilterEntry { id, mask };
                debug!("ID: {:x} Mask: {:x}", id, mask);
                true
            }
            None => {
                debug!("Pass filter table full, dropping ID: {:x} Mask: {:x}", id, mask);
                false
            }
        }
    }

    /// Reset every slot
    pub fn clear(&mut self) {
        self.entries.fill(FilterEntry::default());
    }

    /// All slots, used or not
    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    /// Iterate over the slots holding a filter
    pub fn active(&self) -> impl Iterator<Item = &FilterEntry> {
        self.entries.iter().filter(|entry| entry.is_active())
    }

    /// Check if no filter is set
    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    /// Check if a frame identifier is admitted. An empty table admits
    /// everything.
    pub fn admits(&self, frame_id: u32) -> bool {
        self.is_empty() || self.active().any(|entry| entry.matches(frame_id))
    }
}

impl Default for FilterTable {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_SLOTS)
    }
}
