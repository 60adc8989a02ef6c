// SPDX-License-Identifier: GPL-3.0-only

//! Video recording sessions
//!
//! Recording itself is done by the camera stack. The pipeline reserves the
//! destination through the video namer when recording starts and persists
//! the finished clip through the same bounded save queue as stills.

use crate::constants::{is_quarter_turn, normalize_orientation, tags};
use crate::pipelines::events::PipelineEvent;
use crate::pipelines::manager::{SnapshotManager, lock};
use crate::pipelines::namer::title_for;
use crate::pipelines::save_queue::SaveRequest;
use crate::storage::{MediaId, MediaKind};
use std::time::Duration;
use tracing::{info, warn};

/// An in-progress recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSession {
    pub id: MediaId,
    pub started_at_ms: i64,
    pub width: u32,
    pub height: u32,
    pub orientation: u32,
}

/// Encoded clip handed back when recording stops
#[derive(Debug, Clone, Default)]
pub struct RecordedVideo {
    pub data: Vec<u8>,
    pub duration: Duration,
}

impl SnapshotManager {
    /// Reserve a destination and announce the start of a recording
    ///
    /// Returns `None` if a recording is already running or no identifier
    /// could be reserved.
    pub fn start_video_recording(&self) -> Option<MediaId> {
        let inner = &self.inner;
        if self.is_paused() {
            warn!("Pipeline paused, recording not started");
            return None;
        }

        let mut video = lock(&inner.video);
        if video.is_some() {
            warn!("Recording already in progress");
            return None;
        }

        let started_at_ms = chrono::Utc::now().timestamp_millis();
        let (width, height) = inner.camera.video_size();
        let orientation = normalize_orientation(inner.camera.orientation() as i32);
        inner
            .video_namer
            .prepare_uri(started_at_ms, width, height, orientation as i32);
        let Some(id) = inner.video_namer.get_uri() else {
            warn!("No video identifier reserved, recording not started");
            return None;
        };

        *video = Some(VideoSession {
            id,
            started_at_ms,
            width,
            height,
            orientation,
        });
        drop(video);

        info!(%id, "Video recording started");
        inner.events.post(PipelineEvent::VideoRecordingStart(id));
        Some(id)
    }

    /// Announce the end of a recording and queue the clip for saving
    ///
    /// An empty clip discards the reserved entry. Returns whether a save was
    /// queued.
    pub fn stop_video_recording(&self, recording: RecordedVideo) -> bool {
        let inner = &self.inner;
        let Some(session) = lock(&inner.video).take() else {
            warn!("Stop requested without an active recording");
            return false;
        };

        info!(
            id = %session.id,
            duration_ms = recording.duration.as_millis() as u64,
            bytes = recording.data.len(),
            "Video recording stopped"
        );
        inner
            .events
            .post(PipelineEvent::VideoRecordingStop(session.id));

        if recording.data.is_empty() {
            warn!(id = %session.id, "Recording produced no data, discarding entry");
            inner.discard_placeholder(session.id);
            return false;
        }

        let (width, height) = if is_quarter_turn(session.orientation) {
            (session.height, session.width)
        } else {
            (session.width, session.height)
        };
        inner.save_queue.add_save_request(SaveRequest {
            data: recording.data,
            destination: session.id,
            kind: MediaKind::Video,
            title: title_for(&inner.config.title_prefix_video, session.started_at_ms),
            location: inner.location(),
            width,
            height,
            orientation: session.orientation,
            tags: vec![(
                tags::DURATION_MS.to_string(),
                recording.duration.as_millis().to_string(),
            )],
            snapshot_seq: None,
        });
        true
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.inner.video).is_some()
    }

    /// Drop an active session without saving, releasing its reservation
    pub(crate) fn abandon_video_session(&self) {
        if let Some(session) = lock(&self.inner.video).take() {
            self.inner
                .events
                .post(PipelineEvent::VideoRecordingStop(session.id));
            self.inner.discard_placeholder(session.id);
        }
    }
}
