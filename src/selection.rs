//! Selection Tracker - Per-slot chosen file
//!
//! Records which listed entry is currently chosen in each slot. Only the
//! drive-A selection is transfer-eligible; drive B's is informational.

use crate::engine::DriveSlot;

/// Current file choice for both drive slots.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    selections: [Option<String>; 2],
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `file` as the current selection for `slot`, replacing any
    /// prior choice. The other slot is untouched.
    pub fn select(&mut self, slot: DriveSlot, file: impl Into<String>) {
        self.selections[slot.index()] = Some(file.into());
    }

    /// Drop the selection for `slot`. Called on disconnect so a cleared
    /// session never leaves a dangling transfer-eligible choice.
    pub fn clear(&mut self, slot: DriveSlot) {
        self.selections[slot.index()] = None;
    }

    pub fn selection(&self, slot: DriveSlot) -> Option<&str> {
        self.selections[slot.index()].as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_until_selected() {
        let tracker = SelectionTracker::new();
        assert_eq!(tracker.selection(DriveSlot::A), None);
        assert_eq!(tracker.selection(DriveSlot::B), None);
    }

    #[test]
    fn test_select_replaces_prior() {
        let mut tracker = SelectionTracker::new();
        tracker.select(DriveSlot::A, "a.txt");
        tracker.select(DriveSlot::A, "b.txt");
        assert_eq!(tracker.selection(DriveSlot::A), Some("b.txt"));
    }

    #[test]
    fn test_slots_are_independent() {
        let mut tracker = SelectionTracker::new();
        tracker.select(DriveSlot::A, "a.txt");
        tracker.select(DriveSlot::B, "notes.md");
        assert_eq!(tracker.selection(DriveSlot::A), Some("a.txt"));

        tracker.clear(DriveSlot::B);
        assert_eq!(tracker.selection(DriveSlot::A), Some("a.txt"));
        assert_eq!(tracker.selection(DriveSlot::B), None);
    }
}
