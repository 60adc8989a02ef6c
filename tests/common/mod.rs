// SPDX-License-Identifier: GPL-3.0-only

//! Shared test doubles for the integration tests

#![allow(dead_code)]

use snapshot_pipeline::backends::camera::{
    CameraDevice, CameraResult, PictureCallback, ShutterCallback, Thumbnail,
};
use snapshot_pipeline::errors::{CameraError, StorageError};
use snapshot_pipeline::storage::{MediaWrite, StorageResult};
use snapshot_pipeline::{
    MediaId, MediaKind, MediaStore, Notice, SavedMedia, SnapshotInfo, SnapshotListener,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds or `TIMEOUT` passes
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub kind: MediaKind,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub pending: bool,
    pub data: Vec<u8>,
    pub tags: Vec<(String, String)>,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<MediaId, StoredMedia>,
    allocated: Vec<MediaId>,
    deleted: Vec<MediaId>,
    /// Titles in the order their writes completed
    writes: Vec<(String, Instant)>,
    failures_left: usize,
}

/// In-memory store with a write gate, artificial latency and failure injection
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    gate_open: Mutex<bool>,
    gate: Condvar,
    write_delay: Duration,
    allocate_delay: Duration,
    writes_in_progress: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_write_delay(Duration::ZERO)
    }

    pub fn with_write_delay(write_delay: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            gate_open: Mutex::new(true),
            gate: Condvar::new(),
            write_delay,
            allocate_delay: Duration::ZERO,
            writes_in_progress: AtomicUsize::new(0),
        }
    }

    /// Slow down every placeholder allocation
    pub fn with_allocate_delay(mut self, allocate_delay: Duration) -> Self {
        self.allocate_delay = allocate_delay;
        self
    }

    /// Block every write until `open_gate`
    pub fn close_gate(&self) {
        *self.gate_open.lock().unwrap() = false;
    }

    pub fn open_gate(&self) {
        *self.gate_open.lock().unwrap() = true;
        self.gate.notify_all();
    }

    /// Make the next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().unwrap().failures_left = count;
    }

    pub fn written_titles(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|(title, _)| title.clone())
            .collect()
    }

    pub fn write_times(&self) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .writes
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn allocated(&self) -> Vec<MediaId> {
        self.state.lock().unwrap().allocated.clone()
    }

    pub fn deleted(&self) -> Vec<MediaId> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn entry(&self, id: MediaId) -> Option<StoredMedia> {
        self.state.lock().unwrap().entries.get(&id).cloned()
    }

    pub fn entries(&self) -> Vec<StoredMedia> {
        self.state.lock().unwrap().entries.values().cloned().collect()
    }

    pub fn is_writing(&self) -> bool {
        self.writes_in_progress.load(Ordering::SeqCst) > 0
    }
}

impl MediaStore for MemoryStore {
    fn allocate_placeholder(
        &self,
        kind: MediaKind,
        title: &str,
        _timestamp_ms: i64,
        width: u32,
        height: u32,
    ) -> StorageResult<MediaId> {
        std::thread::sleep(self.allocate_delay);
        let id = MediaId::new();
        let mut state = self.state.lock().unwrap();
        state.entries.insert(
            id,
            StoredMedia {
                kind,
                title: title.to_string(),
                width,
                height,
                pending: true,
                data: Vec::new(),
                tags: Vec::new(),
            },
        );
        state.allocated.push(id);
        Ok(id)
    }

    fn delete_placeholder(&self, id: MediaId) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.entries.get(&id) {
            Some(entry) if entry.pending => {
                state.entries.remove(&id);
                state.deleted.push(id);
                Ok(())
            }
            Some(_) => Err(StorageError::NotPending(id.to_string())),
            None => Err(StorageError::UnknownId(id.to_string())),
        }
    }

    fn write_and_catalog(&self, write: &MediaWrite<'_>) -> StorageResult<()> {
        self.writes_in_progress.fetch_add(1, Ordering::SeqCst);
        {
            let mut open = self.gate_open.lock().unwrap();
            while !*open {
                open = self.gate.wait(open).unwrap();
            }
        }
        std::thread::sleep(self.write_delay);

        let mut state = self.state.lock().unwrap();
        self.writes_in_progress.fetch_sub(1, Ordering::SeqCst);
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(StorageError::Other("simulated write failure".to_string()));
        }

        let entry = state
            .entries
            .entry(write.id)
            .or_insert_with(|| StoredMedia {
                kind: MediaKind::Image,
                title: String::new(),
                width: 0,
                height: 0,
                pending: true,
                data: Vec::new(),
                tags: Vec::new(),
            });
        entry.title = write.title.to_string();
        entry.width = write.width;
        entry.height = write.height;
        entry.data = write.data.to_vec();
        entry.pending = false;
        state.writes.push((write.title.to_string(), Instant::now()));
        Ok(())
    }

    fn rewrite_metadata(&self, id: MediaId, tags: &[(String, String)]) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or_else(|| StorageError::UnknownId(id.to_string()))?;
        entry.tags = tags.to_vec();
        Ok(())
    }
}

/// Camera that delivers fixed bytes and can fail on demand
pub struct ScriptedCamera {
    pub width: u32,
    pub height: u32,
    pub orientation: u32,
    pub shutter_latency: Duration,
    pub readout_latency: Duration,
    pub picture: Vec<u8>,
    pub bracket_mode: bool,
    exposure: AtomicI32,
    exposure_calls: Mutex<Vec<i32>>,
    /// Errors returned by the next `take_picture` calls, in order
    failures: Mutex<Vec<CameraError>>,
    take_calls: AtomicUsize,
    busy: Arc<AtomicBool>,
    stray_pictures: AtomicBool,
}

/// How long after a rejected capture its stray picture arrives
pub const STRAY_PICTURE_DELAY: Duration = Duration::from_millis(20);

impl ScriptedCamera {
    pub fn new() -> Self {
        Self {
            width: 64,
            height: 48,
            orientation: 0,
            shutter_latency: Duration::from_millis(5),
            readout_latency: Duration::from_millis(10),
            picture: vec![0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9],
            bracket_mode: false,
            exposure: AtomicI32::new(0),
            exposure_calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            take_calls: AtomicUsize::new(0),
            busy: Arc::new(AtomicBool::new(false)),
            stray_pictures: AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self, errors: Vec<CameraError>) {
        *self.failures.lock().unwrap() = errors;
    }

    /// Still deliver a picture for captures rejected through `fail_next`,
    /// like a driver whose error path races a late frame
    pub fn deliver_after_rejection(&self) {
        self.stray_pictures.store(true, Ordering::SeqCst);
    }

    pub fn take_calls(&self) -> usize {
        self.take_calls.load(Ordering::SeqCst)
    }

    pub fn exposure_calls(&self) -> Vec<i32> {
        self.exposure_calls.lock().unwrap().clone()
    }
}

impl CameraDevice for ScriptedCamera {
    fn exposure_compensation(&self) -> i32 {
        self.exposure.load(Ordering::SeqCst)
    }

    fn set_exposure_compensation(&self, value: i32) -> CameraResult<()> {
        self.exposure_calls.lock().unwrap().push(value);
        self.exposure.store(value, Ordering::SeqCst);
        Ok(())
    }

    fn picture_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn orientation(&self) -> u32 {
        self.orientation
    }

    fn preview_thumbnail(&self) -> Option<Thumbnail> {
        None
    }

    fn bracket_mode_active(&self) -> bool {
        self.bracket_mode
    }

    fn take_picture(
        &self,
        on_shutter: ShutterCallback,
        on_picture: PictureCallback,
    ) -> CameraResult<()> {
        self.take_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap();
            if !failures.is_empty() {
                if self.stray_pictures.load(Ordering::SeqCst) {
                    let picture = self.picture.clone();
                    std::thread::spawn(move || {
                        std::thread::sleep(STRAY_PICTURE_DELAY);
                        on_picture(picture);
                    });
                }
                return Err(failures.remove(0));
            }
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(CameraError::Busy);
        }

        let shutter_latency = self.shutter_latency;
        let readout_latency = self.readout_latency;
        let picture = self.picture.clone();
        let busy = Arc::clone(&self.busy);
        std::thread::spawn(move || {
            std::thread::sleep(shutter_latency);
            on_shutter();
            std::thread::sleep(readout_latency);
            busy.store(false, Ordering::SeqCst);
            on_picture(picture);
        });
        Ok(())
    }
}

/// Listener that records every callback with its arrival time
#[derive(Default)]
pub struct RecordingListener {
    pub shutters: Mutex<Vec<(u64, Instant)>>,
    pub processing: Mutex<Vec<u64>>,
    pub saved: Mutex<Vec<(SavedMedia, Instant)>>,
    pub saving_start: Mutex<Vec<MediaId>>,
    pub saving_done: Mutex<Vec<MediaId>>,
    pub video_start: Mutex<Vec<MediaId>>,
    pub video_stop: Mutex<Vec<MediaId>>,
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingListener {
    pub fn saved(&self) -> Vec<SavedMedia> {
        self.saved
            .lock()
            .unwrap()
            .iter()
            .map(|(saved, _)| saved.clone())
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl SnapshotListener for RecordingListener {
    fn on_snapshot_shutter(&self, snapshot: &SnapshotInfo) {
        self.shutters
            .lock()
            .unwrap()
            .push((snapshot.seq, Instant::now()));
    }

    fn on_snapshot_processing(&self, snapshot: &SnapshotInfo) {
        self.processing.lock().unwrap().push(snapshot.seq);
    }

    fn on_snapshot_saved(&self, saved: &SavedMedia) {
        self.saved
            .lock()
            .unwrap()
            .push((saved.clone(), Instant::now()));
    }

    fn on_media_saving_start(&self, id: MediaId) {
        self.saving_start.lock().unwrap().push(id);
    }

    fn on_media_saving_done(&self, id: MediaId) {
        self.saving_done.lock().unwrap().push(id);
    }

    fn on_video_recording_start(&self, id: MediaId) {
        self.video_start.lock().unwrap().push(id);
    }

    fn on_video_recording_stop(&self, id: MediaId) {
        self.video_stop.lock().unwrap().push(id);
    }

    fn on_notice(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}
