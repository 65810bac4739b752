//! Backlog tracking: how far indexing is behind the chain tip

use serde::Serialize;

use crate::error::{Result, VoucherError};

/// Blocks between the chain tip and the last block already processed.
///
/// An inverted pair is a bookkeeping bug upstream and is surfaced, never
/// clamped to zero.
pub fn compute_gap(current_tip: u64, last_processed: u64) -> Result<u64> {
    if last_processed > current_tip {
        return Err(VoucherError::InvalidRange {
            current_tip,
            last_processed,
        });
    }
    Ok(current_tip - last_processed)
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BacklogStatus {
    pub current_tip: u64,
    pub last_processed: u64,
    pub gap: u64,
}

impl BacklogStatus {
    pub fn compute(current_tip: u64, last_processed: u64) -> Result<Self> {
        Ok(Self {
            current_tip,
            last_processed,
            gap: compute_gap(current_tip, last_processed)?,
        })
    }
}

/// In-memory indexing cursor. Persistence of the cursor across restarts is
/// the embedding service's concern.
#[derive(Debug, Clone)]
pub struct BacklogTracker {
    last_processed: u64,
}

impl BacklogTracker {
    pub fn new(start_block: u64) -> Self {
        Self {
            last_processed: start_block,
        }
    }

    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    pub fn mark_processed(&mut self, block: u64) {
        self.last_processed = block;
    }

    pub fn status(&self, current_tip: u64) -> Result<BacklogStatus> {
        BacklogStatus::compute(current_tip, self.last_processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_is_tip_minus_processed() {
        assert_eq!(compute_gap(359_777_800, 359_777_755).unwrap(), 45);
    }

    #[test]
    fn caught_up_means_zero_gap() {
        assert_eq!(compute_gap(100, 100).unwrap(), 0);
    }

    #[test]
    fn inverted_cursor_is_an_error() {
        let err = compute_gap(100, 101).unwrap_err();
        assert!(matches!(
            err,
            VoucherError::InvalidRange { current_tip: 100, last_processed: 101 }
        ));
    }

    #[test]
    fn tracker_advances_and_reports() {
        let mut tracker = BacklogTracker::new(50);
        assert_eq!(tracker.status(60).unwrap().gap, 10);

        tracker.mark_processed(58);
        let status = tracker.status(60).unwrap();
        assert_eq!(status.last_processed, 58);
        assert_eq!(status.gap, 2);
    }
}
