// SPDX-License-Identifier: GPL-3.0-only

//! Capture queue
//!
//! Snapshot requests are captured strictly one at a time in submission order.
//! Each capture runs on its own short-lived thread; the camera's picture
//! callback starts the next queued capture before handing its own data to
//! the save queue.

use super::SnapshotRequest;
use super::enhance::{EnhanceOutcome, enhance_or_original};
use crate::constants::{is_quarter_turn, normalize_orientation, tags as tag_keys};
use crate::errors::CameraError;
use crate::pipelines::events::{Notice, PipelineEvent};
use crate::pipelines::manager::{Inner, SnapshotManager};
use crate::pipelines::namer::title_for;
use crate::pipelines::photo::CaptureState;
use crate::pipelines::save_queue::SaveRequest;
use crate::storage::{MediaId, MediaKind};
use chrono::{Local, TimeZone};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// Parameters of a snapshot request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub save: bool,
    pub exposure_compensation: i32,
    pub bypass_processing: bool,
}

impl SnapshotManager {
    /// Queue a capture
    ///
    /// Returns false without side effects when the capture queue is full or
    /// the pipeline is paused.
    pub fn queue_snapshot(&self, save: bool, exposure_compensation: i32) -> bool {
        self.queue_snapshot_with(SnapshotOptions {
            save,
            exposure_compensation,
            bypass_processing: false,
        })
    }

    pub fn queue_snapshot_with(&self, options: SnapshotOptions) -> bool {
        self.inner.submit(options)
    }
}

/// Decrements the hand-off count when a picture leaves the capture path
struct HandoffGuard<'a>(&'a Inner);

impl Drop for HandoffGuard<'_> {
    fn drop(&mut self) {
        let mut capture = self.0.lock_capture();
        capture.handoffs = capture.handoffs.saturating_sub(1);
        self.0.capture_changed.notify_all();
    }
}

impl Inner {
    fn submit(self: &Arc<Self>, options: SnapshotOptions) -> bool {
        // Checked under the capture lock so pausing cannot miss this request
        let mut capture = self.lock_capture();
        if self.paused.load(Ordering::Acquire) {
            debug!("Pipeline paused, snapshot rejected");
            return false;
        }
        if capture.queue.len() >= self.config.capture_queue_limit {
            debug!(queued = capture.queue.len(), "Capture queue full, snapshot rejected");
            return false;
        }

        if self.camera.exposure_compensation() != options.exposure_compensation {
            capture.waiting_for_exposure = true;
            self.apply_exposure_async(options.exposure_compensation);
        }

        let seq = capture.next_seq;
        capture.next_seq += 1;
        capture.queue.push_back(SnapshotRequest {
            seq,
            save: options.save,
            exposure_compensation: options.exposure_compensation,
            thumbnail: self.camera.preview_thumbnail(),
            bypass_processing: options.bypass_processing,
            destination: None,
            timestamp_ms: None,
        });
        info!(
            seq,
            save = options.save,
            ev = options.exposure_compensation,
            "Snapshot queued"
        );

        // Otherwise the picture callback of the previous shot starts this one
        if capture.queue.len() == 1 {
            return self.start_capture(&mut capture, seq);
        }
        true
    }

    /// Spawn the capture thread for `seq`, dropping the request if that fails
    fn start_capture(self: &Arc<Self>, capture: &mut CaptureState, seq: u64) -> bool {
        let inner = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("snapshot-capture-{}", seq))
            .spawn(move || inner.run_capture(seq));

        match spawned {
            Ok(_) => true,
            Err(err) => {
                error!(seq, %err, "Failed to spawn capture thread, dropping snapshot");
                if let Some(pos) = capture.position(seq) {
                    capture.queue.remove(pos);
                }
                self.events.post(PipelineEvent::Notice(Notice::CaptureFailed {
                    snapshot_seq: seq,
                    reason: err.to_string(),
                }));
                self.capture_changed.notify_all();
                false
            }
        }
    }

    fn run_capture(self: &Arc<Self>, seq: u64) {
        let settle = std::mem::take(&mut self.lock_capture().waiting_for_exposure);
        if settle {
            debug!(seq, "Waiting for exposure to settle");
            std::thread::sleep(self.config.exposure_settle_delay());
        }

        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let save = {
            let mut capture = self.lock_capture();
            let Some(pos) = capture.position(seq) else {
                warn!(seq, "Snapshot left the queue before capture started");
                return;
            };
            capture.queue[pos].timestamp_ms = Some(timestamp_ms);
            capture.queue[pos].save
        };

        if save {
            let (width, height) = self.camera.picture_size();
            self.image_namer
                .prepare_uri(timestamp_ms, width, height, self.camera.orientation() as i32);
        }

        let mut result = self.take_picture(seq);
        if matches!(&result, Err(err) if err.is_transient()) {
            warn!(seq, "Camera rejected capture, restoring last good settings and retrying");
            self.restore_last_good_exposure();
            result = self.take_picture(seq);
        }
        if let Err(err) = result {
            self.fail_capture(seq, err);
        }
    }

    fn take_picture(self: &Arc<Self>, seq: u64) -> Result<(), CameraError> {
        let shutter_inner = Arc::clone(self);
        let picture_inner = Arc::clone(self);
        self.camera.take_picture(
            Box::new(move || shutter_inner.on_shutter(seq)),
            Box::new(move |data| picture_inner.on_picture_taken(seq, data)),
        )
    }

    fn on_shutter(self: &Arc<Self>, seq: u64) {
        let (info, reset_to) = {
            let capture = self.lock_capture();
            let info = capture.position(seq).map(|pos| capture.queue[pos].info());
            (info, capture.last_good_exposure)
        };

        match info {
            Some(info) => self.events.post(PipelineEvent::SnapshotShutter(info)),
            None => warn!(seq, "Shutter fired for an unknown snapshot"),
        }

        if self.camera.bracket_mode_active() {
            debug!(seq, ev = reset_to, "Bracket mode active, resetting exposure");
            self.apply_exposure_async(reset_to);
        }
    }

    fn on_picture_taken(self: &Arc<Self>, seq: u64, data: Vec<u8>) {
        let (width, height) = self.camera.picture_size();
        let orientation = normalize_orientation(self.camera.orientation() as i32);

        let head_saves = {
            let capture = self.lock_capture();
            let Some(head) = capture.queue.front() else {
                warn!(seq, "Picture arrived with an empty capture queue, ignoring");
                return;
            };
            if head.seq != seq {
                warn!(
                    expected = head.seq,
                    got = seq,
                    "Picture callback out of order, completing oldest snapshot"
                );
            }
            head.save
        };

        // Collected before the next capture is started, which prepares the
        // next reservation. May wait on storage, so the capture lock is not held.
        let destination = if head_saves {
            self.image_namer.get_uri()
        } else {
            None
        };

        let request = {
            let mut capture = self.lock_capture();
            while let Some(next_seq) = capture.queue.get(1).map(|r| r.seq) {
                if self.start_capture(&mut capture, next_seq) {
                    break;
                }
            }

            let Some(mut request) = capture.queue.pop_front() else {
                // A concurrent callback completed the snapshot first
                warn!(seq, "Capture queue drained while collecting the destination");
                drop(capture);
                if let Some(id) = destination {
                    self.discard_placeholder(id);
                }
                return;
            };
            if request.save {
                request.destination = destination;
                capture.handoffs += 1;
            }
            self.capture_changed.notify_all();
            request
        };

        if !request.save {
            debug!(seq = request.seq, "Snapshot not saved");
            if let Some(id) = destination {
                self.discard_placeholder(id);
            }
            return;
        }

        let _handoff = HandoffGuard(self.as_ref());
        if data.is_empty() {
            error!(seq = request.seq, "Camera delivered no picture data");
            if let Some(id) = request.destination {
                self.discard_placeholder(id);
            }
            self.events.post(PipelineEvent::Notice(Notice::CaptureFailed {
                snapshot_seq: request.seq,
                reason: "no picture data".to_string(),
            }));
            return;
        }

        self.hand_off(request, data, width, height, orientation);
    }

    /// Enhance (if enabled) and queue the picture for saving
    fn hand_off(
        &self,
        request: SnapshotRequest,
        data: Vec<u8>,
        width: u32,
        height: u32,
        orientation: u32,
    ) {
        let seq = request.seq;
        let timestamp_ms = request
            .timestamp_ms
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let title = title_for(&self.config.title_prefix_image, timestamp_ms);
        let (width, height) = if is_quarter_turn(orientation) {
            (height, width)
        } else {
            (width, height)
        };

        let destination = match request.destination {
            Some(id) => id,
            None => {
                warn!(seq, "No reserved identifier, allocating inline");
                match self.store.allocate_placeholder(
                    MediaKind::Image,
                    &title,
                    timestamp_ms,
                    width,
                    height,
                ) {
                    Ok(id) => id,
                    Err(err) => {
                        error!(seq, %err, "Cannot allocate a destination, capture lost");
                        self.events.post(PipelineEvent::Notice(Notice::CaptureFailed {
                            snapshot_seq: seq,
                            reason: err.to_string(),
                        }));
                        return;
                    }
                }
            }
        };

        self.events
            .post(PipelineEvent::SnapshotProcessing(request.info()));

        let data = match &self.enhancer {
            Some(enhancer) if self.config.auto_enhance && !request.bypass_processing => {
                match enhance_or_original(enhancer.as_ref(), data) {
                    EnhanceOutcome::Enhanced(data) => data,
                    EnhanceOutcome::Original(data, err) => {
                        self.events.post(PipelineEvent::Notice(Notice::EnhanceFailed {
                            snapshot_seq: seq,
                            reason: err.to_string(),
                        }));
                        data
                    }
                }
            }
            _ => data,
        };

        let tags = vec![
            (tag_keys::DATE_TIME.to_string(), exif_datetime(timestamp_ms)),
            (
                tag_keys::EXPOSURE_COMPENSATION.to_string(),
                request.exposure_compensation.to_string(),
            ),
            (tag_keys::ORIENTATION.to_string(), orientation.to_string()),
            (
                tag_keys::SOFTWARE.to_string(),
                format!("snapshot-pipeline {}", env!("PIPELINE_BUILD_VERSION")),
            ),
        ];

        debug!(seq, id = %destination, bytes = data.len(), "Handing picture to save queue");
        self.save_queue.add_save_request(SaveRequest {
            data,
            destination,
            kind: MediaKind::Image,
            title,
            location: self.location(),
            width,
            height,
            orientation,
            tags,
            snapshot_seq: Some(seq),
        });
    }

    fn fail_capture(self: &Arc<Self>, seq: u64, err: CameraError) {
        error!(seq, %err, "Capture failed, dropping snapshot");
        if let Some(id) = self.image_namer.get_uri() {
            self.discard_placeholder(id);
        }

        let mut capture = self.lock_capture();
        if let Some(pos) = capture.position(seq) {
            capture.queue.remove(pos);
        }
        self.events.post(PipelineEvent::Notice(Notice::CaptureFailed {
            snapshot_seq: seq,
            reason: err.to_string(),
        }));

        // Keep the chain going for anything queued behind the failed shot
        while let Some(next_seq) = capture.queue.front().map(|r| r.seq) {
            if self.start_capture(&mut capture, next_seq) {
                break;
            }
        }
        self.capture_changed.notify_all();
    }

    fn apply_exposure_async(self: &Arc<Self>, value: i32) {
        let inner = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name("exposure-control".to_string())
            .spawn(move || inner.apply_exposure(value));
        if let Err(err) = spawned {
            warn!(value, %err, "Failed to spawn exposure thread, exposure unchanged");
        }
    }

    fn apply_exposure(&self, value: i32) {
        match self.camera.set_exposure_compensation(value) {
            Ok(()) => {
                self.lock_capture().last_good_exposure = value;
                debug!(value, "Exposure compensation applied");
            }
            Err(err) => {
                warn!(value, %err, "Exposure change rejected, restoring last known-good value");
                self.restore_last_good_exposure();
            }
        }
    }

    fn restore_last_good_exposure(&self) {
        let value = self.lock_capture().last_good_exposure;
        if self.camera.exposure_compensation() != value
            && let Err(err) = self.camera.set_exposure_compensation(value)
        {
            warn!(value, %err, "Failed to restore exposure compensation");
        }
    }

    pub(crate) fn discard_placeholder(&self, id: MediaId) {
        if let Err(err) = self.store.delete_placeholder(id) {
            warn!(%id, %err, "Failed to delete unused placeholder");
        }
    }
}

/// EXIF style capture time
fn exif_datetime(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|time| time.format("%Y:%m:%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
