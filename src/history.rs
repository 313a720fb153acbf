// src/history.rs

//! Per-track bounded undo/redo over buffer snapshots.
//!
//! Linear undo: pushing while the cursor is not at the tail discards the redo branch,
//! and the oldest entry is evicted once the cap is reached.

use crate::buffer::SharedBuffer;
use std::collections::VecDeque;
use std::sync::Arc;

pub const MAX_HISTORY: usize = 10;

/// A track's buffer at one point in time. `None` is the empty track.
pub type Snapshot = Option<SharedBuffer>;

fn same_snapshot(a: &Snapshot, b: &Snapshot) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<Snapshot>,
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from persisted entries. The cursor is clamped into range.
    pub fn from_entries(entries: Vec<Snapshot>, cursor: Option<usize>) -> Self {
        let mut entries: VecDeque<Snapshot> = entries.into();
        while entries.len() > MAX_HISTORY {
            entries.pop_front();
        }
        let last = entries.len().saturating_sub(1);
        let cursor = cursor.unwrap_or(last).min(last);
        Self { entries, cursor }
    }

    /// Records `snapshot` as the newest state.
    ///
    /// A snapshot identical to the entry under the cursor is not stored twice, so a
    /// "before" snapshot taken right after a previous "after" snapshot costs nothing.
    pub fn push(&mut self, snapshot: Snapshot) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        let duplicate = self
            .entries
            .back()
            .map(|last| same_snapshot(last, &snapshot))
            .unwrap_or(false);
        if !duplicate {
            self.entries.push_back(snapshot);
        }
        while self.entries.len() > MAX_HISTORY {
            self.entries.pop_front();
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Steps back one entry and returns the snapshot to restore.
    pub fn undo(&mut self) -> Option<Snapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.entries[self.cursor].clone())
    }

    /// Steps forward one entry and returns the snapshot to restore.
    pub fn redo(&mut self) -> Option<Snapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries[self.cursor].clone())
    }

    pub fn can_undo(&self) -> bool {
        !self.entries.is_empty() && self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.cursor + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the current entry, `None` while the history is empty.
    pub fn cursor(&self) -> Option<usize> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.cursor)
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &Snapshot> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;

    fn snap(len: usize) -> Snapshot {
        Some(Arc::new(AudioBuffer::silent(len, 1000)))
    }

    fn len_of(s: &Snapshot) -> Option<usize> {
        s.as_ref().map(|b| b.len())
    }

    #[test]
    fn cap_evicts_the_oldest_entry() {
        let mut history = History::new();
        for i in 0..11 {
            history.push(snap(i + 1));
        }
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.entries().next().and_then(len_of), Some(2));
        assert_eq!(history.cursor(), Some(9));
    }

    #[test]
    fn new_push_prunes_the_redo_branch() {
        let mut history = History::new();
        history.push(snap(1));
        history.push(snap(2));
        history.push(snap(3));
        history.undo();
        history.undo();
        history.push(snap(4));
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), Some(1));
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_and_redo_stop_at_the_ends() {
        let mut history = History::new();
        assert!(history.undo().is_none());
        history.push(None);
        assert!(history.undo().is_none());
        history.push(snap(5));
        assert_eq!(history.undo().map(|s| len_of(&s)), Some(None));
        assert!(history.undo().is_none());
        assert_eq!(history.redo().map(|s| len_of(&s)), Some(Some(5)));
        assert!(history.redo().is_none());
    }

    #[test]
    fn identical_snapshot_is_not_stored_twice() {
        let mut history = History::new();
        let a = snap(3);
        history.push(None);
        history.push(None);
        history.push(a.clone());
        history.push(a);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn restored_history_clamps_its_cursor() {
        let history = History::from_entries(vec![None, snap(1)], Some(7));
        assert_eq!(history.cursor(), Some(1));
        let empty = History::from_entries(Vec::new(), None);
        assert_eq!(empty.cursor(), None);
    }
}
