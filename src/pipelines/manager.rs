// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot manager
//!
//! Owns the capture queue, the save queue, both reservation workers and the
//! event bus. Capture threads share the manager state through an `Arc`, so
//! every callback from the camera can reach the queues without globals.

use crate::backends::camera::CameraDevice;
use crate::config::PipelineConfig;
use crate::errors::PipelineResult;
use crate::pipelines::events::{EventBus, SnapshotListener};
use crate::pipelines::namer::IdentifierReserver;
use crate::pipelines::photo::CaptureState;
use crate::pipelines::photo::enhance::Enhancer;
use crate::pipelines::save_queue::{SaveQueue, SaveQueueStats};
use crate::pipelines::video::VideoSession;
use crate::storage::{GeoLocation, MediaKind, MediaStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{error, info, warn};

/// State shared between the manager handle and its capture threads
pub(crate) struct Inner {
    pub(crate) config: PipelineConfig,
    pub(crate) camera: Arc<dyn CameraDevice>,
    pub(crate) store: Arc<dyn MediaStore>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) save_queue: SaveQueue,
    pub(crate) image_namer: IdentifierReserver,
    pub(crate) video_namer: IdentifierReserver,
    pub(crate) enhancer: Option<Arc<dyn Enhancer>>,
    pub(crate) capture: Mutex<CaptureState>,
    /// Signalled whenever the capture queue or the hand-off count shrinks
    pub(crate) capture_changed: Condvar,
    pub(crate) location: Mutex<Option<GeoLocation>>,
    pub(crate) video: Mutex<Option<VideoSession>>,
    pub(crate) paused: AtomicBool,
}

impl Inner {
    pub(crate) fn lock_capture(&self) -> MutexGuard<'_, CaptureState> {
        lock(&self.capture)
    }

    pub(crate) fn location(&self) -> Option<GeoLocation> {
        *lock(&self.location)
    }

    fn start_workers(&self) -> PipelineResult<()> {
        self.save_queue.start()?;
        self.image_namer.start()?;
        self.video_namer.start()?;
        self.paused.store(false, Ordering::Release);
        Ok(())
    }

    /// Wait for queued captures and their hand-off to the save queue
    fn wait_capture_idle(&self) -> bool {
        let deadline = Instant::now() + self.config.pause_timeout();
        let mut capture = self.lock_capture();
        while !capture.queue.is_empty() || capture.handoffs > 0 {
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    queued = capture.queue.len(),
                    handoffs = capture.handoffs,
                    "Timed out waiting for captures to finish"
                );
                return false;
            }
            capture = self
                .capture_changed
                .wait_timeout(capture, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        true
    }
}

/// Entry point of the media persistence pipeline
pub struct SnapshotManager {
    pub(crate) inner: Arc<Inner>,
}

impl SnapshotManager {
    /// Build the pipeline and start its worker threads
    pub fn new(
        config: PipelineConfig,
        camera: Arc<dyn CameraDevice>,
        store: Arc<dyn MediaStore>,
        enhancer: Option<Arc<dyn Enhancer>>,
    ) -> PipelineResult<Self> {
        let events = Arc::new(EventBus::start()?);
        let save_queue = SaveQueue::new(
            Arc::clone(&store),
            Arc::clone(&events),
            config.save_queue_limit,
        );
        let image_namer = IdentifierReserver::new(
            MediaKind::Image,
            config.title_prefix_image.clone(),
            Arc::clone(&store),
        );
        let video_namer = IdentifierReserver::new(
            MediaKind::Video,
            config.title_prefix_video.clone(),
            Arc::clone(&store),
        );
        let initial_exposure = camera.exposure_compensation();

        let inner = Arc::new(Inner {
            config,
            camera,
            store,
            events,
            save_queue,
            image_namer,
            video_namer,
            enhancer,
            capture: Mutex::new(CaptureState::new(initial_exposure)),
            capture_changed: Condvar::new(),
            location: Mutex::new(None),
            video: Mutex::new(None),
            paused: AtomicBool::new(false),
        });
        inner.start_workers()?;

        info!(
            save_queue_limit = inner.save_queue.limit(),
            capture_queue_limit = inner.config.capture_queue_limit,
            "Snapshot manager started"
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn add_listener(&self, listener: Arc<dyn SnapshotListener>) {
        self.inner.events.register(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn SnapshotListener>) -> bool {
        self.inner.events.unregister(listener)
    }

    /// Location stamped on subsequent saves
    pub fn set_location(&self, location: Option<GeoLocation>) {
        *lock(&self.inner.location) = location;
    }

    /// Snapshot requests waiting for their capture to complete
    pub fn pending_snapshots(&self) -> usize {
        self.inner.lock_capture().queue.len()
    }

    pub fn save_stats(&self) -> SaveQueueStats {
        self.inner.save_queue.stats()
    }

    /// Block until the save queue is empty and every event is delivered
    pub fn wait_saves_done(&self) {
        self.inner.save_queue.wait_done();
        self.inner.events.flush();
    }

    /// Drain outstanding work and tear down the worker threads
    ///
    /// New snapshots are rejected from the moment this is called. Captures
    /// already queued get up to the configured pause timeout to complete;
    /// everything that reached the save queue is written before returning.
    pub fn on_pause(&self) {
        if self.inner.paused.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Pausing snapshot pipeline");

        self.inner.wait_capture_idle();
        if self.is_recording() {
            warn!("Pausing while recording, video session abandoned");
            self.abandon_video_session();
        }
        self.inner.save_queue.finish();
        self.inner.image_namer.finish();
        self.inner.video_namer.finish();
        self.inner.events.flush();
    }

    /// Recreate the worker threads torn down by [`on_pause`](Self::on_pause)
    pub fn on_resume(&self) -> PipelineResult<()> {
        info!("Resuming snapshot pipeline");
        self.inner.start_workers()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Drain everything and stop the event dispatcher
    pub fn shutdown(self) {
        // Drop does the work
    }
}

impl Drop for SnapshotManager {
    fn drop(&mut self) {
        self.on_pause();
        // A capture that outlived the pause timeout may have parked its
        // picture in the stopped save queue since then
        self.inner.wait_capture_idle();
        if let Err(err) = self.inner.save_queue.drain_parked() {
            error!(%err, "Failed to write snapshots queued after pause");
        }
        self.inner.events.shutdown();
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
