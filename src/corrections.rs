// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use log::{debug, info};

use crate::algorithm::{Blob, BlobOrigin};
use crate::error::Result;
use crate::store::DetectionStore;

// Tolerances used by undo to find the blob an edit added.
const UNDO_X_TOLERANCE: i32 = 5;
const UNDO_HEIGHT_TOLERANCE: i32 = 3;

/// A fly position placed by hand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ManualEdit {
    pub tube_index: usize,
    pub x: i32,
    pub y: i32,
    pub height: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The edit stack was empty.
    NothingToUndo,
    /// The edit was popped and its blob removed from the current result.
    Removed(ManualEdit),
    /// The edit was popped but no matching blob remained (for example a
    /// later detection replaced the result); the result is unchanged.
    Discarded(ManualEdit),
}

/// LIFO stack of manual edits applied to a [DetectionStore].
#[derive(Clone, Debug, Default)]
pub struct ManualCorrectionLog {
    edits: Vec<ManualEdit>,
}

impl ManualCorrectionLog {
    pub fn new() -> ManualCorrectionLog {
        ManualCorrectionLog::default()
    }

    /// Appends a manual blob to region `tube_index`'s current result and
    /// remembers the edit for [undo()](Self::undo). Fails with InvalidIndex
    /// and changes nothing if the region does not exist.
    pub fn add(&mut self, store: &mut DetectionStore, tube_index: usize,
               x: i32, y: i32, height: i32) -> Result<ManualEdit> {
        store.current_mut(tube_index)?
            .push(Blob{x, y, height, area: 0.0, origin: BlobOrigin::Manual});
        let edit = ManualEdit{tube_index, x, y, height};
        self.edits.push(edit);
        debug!("Manual edit {:?}", edit);
        Ok(edit)
    }

    /// Reverts the most recent edit.
    ///
    /// The first blob in the edited region within the position and height
    /// tolerances is removed. This need not be the exact blob the edit
    /// added.
    pub fn undo(&mut self, store: &mut DetectionStore) -> UndoOutcome {
        let Some(edit) = self.edits.pop() else {
            return UndoOutcome::NothingToUndo;
        };
        let Ok(blobs) = store.current_mut(edit.tube_index) else {
            info!("Discarding edit {:?}; its region no longer exists", edit);
            return UndoOutcome::Discarded(edit);
        };
        let found = blobs.iter().position(|b| {
            (b.x - edit.x).abs() < UNDO_X_TOLERANCE &&
                (b.height - edit.height).abs() < UNDO_HEIGHT_TOLERANCE
        });
        match found {
            Some(pos) => {
                blobs.remove(pos);
                UndoOutcome::Removed(edit)
            },
            None => {
                info!("Discarding edit {:?}; no matching blob", edit);
                UndoOutcome::Discarded(edit)
            },
        }
    }

    pub fn clear(&mut self) {
        self.edits.clear();
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;

    fn auto_blob(x: i32, height: i32) -> Blob {
        Blob{x, y: 200 - height, height, area: 80.0, origin: BlobOrigin::Auto}
    }

    #[test]
    fn test_add_then_undo_restores() {
        let mut store = DetectionStore::new(3);
        store.record_pass(1, vec![auto_blob(40, 90)]).unwrap();
        let before = store.current(1).unwrap().to_vec();
        let mut log = ManualCorrectionLog::new();

        let edit = log.add(&mut store, 1, 60, 130, 70).unwrap();
        assert_eq!(store.current(1).unwrap().len(), 2);
        assert_eq!(store.current(1).unwrap()[1].origin, BlobOrigin::Manual);
        assert_eq!(log.len(), 1);

        assert_eq!(log.undo(&mut store), UndoOutcome::Removed(edit));
        assert_eq!(store.current(1).unwrap(), before.as_slice());
        assert!(log.is_empty());
    }

    #[test]
    fn test_undo_on_empty() {
        let mut store = DetectionStore::new(1);
        let mut log = ManualCorrectionLog::new();
        assert_eq!(log.undo(&mut store), UndoOutcome::NothingToUndo);
    }

    #[test]
    fn test_edits_do_not_touch_statistics() {
        let mut store = DetectionStore::new(1);
        store.record_pass(0, vec![auto_blob(10, 20)]).unwrap();
        let mut log = ManualCorrectionLog::new();
        log.add(&mut store, 0, 12, 100, 100).unwrap();
        assert_eq!(store.stats(0).unwrap().max_height, 20);
        assert_eq!(store.history(0).unwrap(), &[20]);
    }

    #[test]
    fn test_add_invalid_index() {
        let mut store = DetectionStore::new(2);
        let mut log = ManualCorrectionLog::new();
        assert!(matches!(log.add(&mut store, 2, 0, 0, 0),
                         Err(DetectError::InvalidIndex{index: 2, tube_count: 2})));
        assert!(log.is_empty());
    }

    #[test]
    fn test_undo_removes_first_match_within_tolerance() {
        let mut store = DetectionStore::new(1);
        // Within 4 px and 2 px height of the edit below; found first.
        store.record_pass(0, vec![auto_blob(104, 52), auto_blob(300, 50)]).unwrap();
        let mut log = ManualCorrectionLog::new();
        log.add(&mut store, 0, 100, 150, 50).unwrap();

        assert!(matches!(log.undo(&mut store), UndoOutcome::Removed(_)));
        let remaining = store.current(0).unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].x, 300);
        assert_eq!(remaining[1].origin, BlobOrigin::Manual);
    }

    #[test]
    fn test_undo_discards_when_result_replaced() {
        let mut store = DetectionStore::new(1);
        let mut log = ManualCorrectionLog::new();
        let edit = log.add(&mut store, 0, 100, 150, 50).unwrap();
        store.apply_consensus(vec![vec![auto_blob(105, 50)]]).unwrap();

        // x differs by exactly 5: outside the tolerance.
        assert_eq!(log.undo(&mut store), UndoOutcome::Discarded(edit));
        assert_eq!(store.current(0).unwrap().len(), 1);
    }

    #[test]
    fn test_undo_is_lifo() {
        let mut store = DetectionStore::new(2);
        let mut log = ManualCorrectionLog::new();
        let first = log.add(&mut store, 0, 10, 10, 10).unwrap();
        let second = log.add(&mut store, 1, 50, 50, 50).unwrap();
        assert_eq!(log.undo(&mut store), UndoOutcome::Removed(second));
        assert_eq!(log.undo(&mut store), UndoOutcome::Removed(first));
        assert!(store.current(0).unwrap().is_empty());
        assert!(store.current(1).unwrap().is_empty());

        log.add(&mut store, 0, 10, 10, 10).unwrap();
        log.clear();
        assert_eq!(log.undo(&mut store), UndoOutcome::NothingToUndo);
    }
}
