// SPDX-License-Identifier: GPL-3.0-only

//! Still capture pipeline
//!
//! ```text
//! queue_snapshot ─▶ capture queue ─▶ camera shutter ─▶ picture data
//!                      (≤ 2)            │                  │
//!                                       ▼                  ▼
//!                              image namer reserves   enhancement (optional)
//!                              the destination              │
//!                                                           ▼
//!                                                   bounded save queue
//! ```
//!
//! The next capture starts as soon as the previous picture arrives, before
//! that picture is handed to the save queue, so shots overlap with saving.

pub mod capture;
pub mod enhance;

pub use enhance::{EnhanceOutcome, Enhancer, enhance_or_original};

use crate::backends::camera::Thumbnail;
use crate::pipelines::events::SnapshotInfo;
use crate::storage::MediaId;
use std::collections::VecDeque;

/// One requested capture
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    /// Submission order, unique per manager
    pub seq: u64,
    /// Persist the picture at all
    pub save: bool,
    pub exposure_compensation: i32,
    /// Preview frame shown until the real picture is saved
    pub thumbnail: Option<Thumbnail>,
    /// Skip the enhancer for this shot
    pub bypass_processing: bool,
    /// Reserved catalog entry, filled in when the picture arrives
    pub destination: Option<MediaId>,
    /// Capture start time in milliseconds since the epoch
    pub timestamp_ms: Option<i64>,
}

impl SnapshotRequest {
    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            seq: self.seq,
            save: self.save,
            exposure_compensation: self.exposure_compensation,
            thumbnail: self.thumbnail.clone(),
        }
    }
}

/// Capture queue guarded by the manager's capture lock
pub(crate) struct CaptureState {
    pub(crate) queue: VecDeque<SnapshotRequest>,
    pub(crate) next_seq: u64,
    /// An exposure change is in flight; the next capture waits for it to settle
    pub(crate) waiting_for_exposure: bool,
    /// Last exposure value the camera accepted
    pub(crate) last_good_exposure: i32,
    /// Pictures taken off the queue but not yet in the save queue
    pub(crate) handoffs: usize,
}

impl CaptureState {
    pub(crate) fn new(exposure: i32) -> Self {
        Self {
            queue: VecDeque::new(),
            next_seq: 0,
            waiting_for_exposure: false,
            last_good_exposure: exposure,
            handoffs: 0,
        }
    }

    pub(crate) fn position(&self, seq: u64) -> Option<usize> {
        self.queue.iter().position(|r| r.seq == seq)
    }
}
