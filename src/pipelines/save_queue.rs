// SPDX-License-Identifier: GPL-3.0-only

//! Bounded save queue and its worker thread
//!
//! ```text
//! capture threads ──add_save_request──▶ [ r1 | r2 | r3 ] ──▶ save worker ──▶ MediaStore
//!                   (blocks when full)     QUEUE_LIMIT         (FIFO)
//! ```
//!
//! The head request stays in the queue while it is being written, so the
//! limit bounds everything the pipeline holds in memory. Storage I/O happens
//! outside the queue lock; producers are only blocked by a full queue, never
//! by a slow write.

use crate::errors::{PipelineError, PipelineResult, StorageError};
use crate::pipelines::events::{EventBus, Notice, PipelineEvent, SavedMedia};
use crate::storage::{GeoLocation, MediaId, MediaKind, MediaStore, MediaWrite};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// One unit of work for the save worker
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub data: Vec<u8>,
    /// Reserved catalog entry that receives the data
    pub destination: MediaId,
    pub kind: MediaKind,
    pub title: String,
    pub location: Option<GeoLocation>,
    pub width: u32,
    pub height: u32,
    /// Degrees, one of 0/90/180/270
    pub orientation: u32,
    pub tags: Vec<(String, String)>,
    /// Sequence number of the snapshot that produced the data
    pub snapshot_seq: Option<u64>,
}

#[derive(Default)]
struct SaveState {
    queue: VecDeque<Arc<SaveRequest>>,
    stop: bool,
    running: bool,
    completed: u64,
    failed: u64,
    high_water_mark: usize,
}

struct Shared {
    state: Mutex<SaveState>,
    /// Signalled on every push, pop and worker exit
    changed: Condvar,
    limit: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SaveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, SaveState>) -> MutexGuard<'a, SaveState> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counters exposed for diagnostics and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveQueueStats {
    pub pending: usize,
    pub completed: u64,
    pub failed: u64,
    pub high_water_mark: usize,
}

pub struct SaveQueue {
    shared: Arc<Shared>,
    store: Arc<dyn MediaStore>,
    events: Arc<EventBus>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SaveQueue {
    /// Create a stopped queue holding at most `limit` requests
    pub fn new(store: Arc<dyn MediaStore>, events: Arc<EventBus>, limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SaveState::default()),
                changed: Condvar::new(),
                limit: limit.max(1),
            }),
            store,
            events,
            worker: Mutex::new(None),
        }
    }

    /// Start the save worker, no-op if it is already running
    pub fn start(&self) -> PipelineResult<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }

        {
            let mut state = self.shared.lock();
            state.stop = false;
            state.running = true;
        }

        let shared = Arc::clone(&self.shared);
        let store = Arc::clone(&self.store);
        let events = Arc::clone(&self.events);
        let handle = std::thread::Builder::new()
            .name("media-saver".to_string())
            .spawn(move || save_loop(shared, store, events))
            .map_err(|source| {
                self.shared.lock().running = false;
                PipelineError::ThreadSpawn {
                    name: "media-saver",
                    source,
                }
            })?;

        *worker = Some(handle);
        debug!(limit = self.shared.limit, "Save worker started");
        Ok(())
    }

    /// Append a request, blocking while the queue is full
    pub fn add_save_request(&self, request: SaveRequest) {
        let mut state = self.shared.lock();
        if !state.running {
            warn!(
                id = %request.destination,
                "Save worker not running, request will wait for restart"
            );
        }
        while state.queue.len() >= self.shared.limit {
            debug!(queued = state.queue.len(), "Save queue full, producer waiting");
            state = self.shared.wait(state);
        }

        debug!(id = %request.destination, queued = state.queue.len() + 1, "Save request queued");
        state.queue.push_back(Arc::new(request));
        state.high_water_mark = state.high_water_mark.max(state.queue.len());
        self.shared.changed.notify_all();
    }

    /// Block until every queued request has been processed
    ///
    /// Returns early with a warning if the worker is not running, since
    /// nothing would drain the queue.
    pub fn wait_done(&self) {
        let mut state = self.shared.lock();
        while !state.queue.is_empty() {
            if !state.running {
                warn!(
                    pending = state.queue.len(),
                    "Save worker not running, cannot drain"
                );
                return;
            }
            state = self.shared.wait(state);
        }
    }

    /// Drain the queue, stop the worker and join it
    ///
    /// Every request queued before this call is written before it returns.
    pub fn finish(&self) {
        self.wait_done();
        {
            let mut state = self.shared.lock();
            state.stop = true;
            self.shared.changed.notify_all();
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            error!("Save worker thread panicked");
        }
        self.events.flush();

        let state = self.shared.lock();
        info!(
            completed = state.completed,
            failed = state.failed,
            "Save worker finished"
        );
    }

    /// Write requests that were queued after the worker stopped
    ///
    /// A capture that outlives the pause timeout hands its picture to a
    /// stopped queue. This runs a worker just long enough to write it.
    pub fn drain_parked(&self) -> PipelineResult<()> {
        if self.is_running() || self.is_empty() {
            return Ok(());
        }
        warn!(pending = self.len(), "Writing requests queued after stop");
        self.start()?;
        self.finish();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    pub fn stats(&self) -> SaveQueueStats {
        let state = self.shared.lock();
        SaveQueueStats {
            pending: state.queue.len(),
            completed: state.completed,
            failed: state.failed,
            high_water_mark: state.high_water_mark,
        }
    }
}

impl Drop for SaveQueue {
    fn drop(&mut self) {
        let running = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if running {
            self.finish();
        } else if let Err(err) = self.drain_parked() {
            error!(%err, pending = self.len(), "Parked save requests lost");
        }
    }
}

fn save_loop(shared: Arc<Shared>, store: Arc<dyn MediaStore>, events: Arc<EventBus>) {
    loop {
        // Peek, do not pop: the request counts against the limit until written
        let request = {
            let mut state = shared.lock();
            loop {
                if let Some(head) = state.queue.front() {
                    break Arc::clone(head);
                }
                shared.changed.notify_all();
                if state.stop {
                    state.running = false;
                    shared.changed.notify_all();
                    debug!("Save worker exiting");
                    return;
                }
                state = shared.wait(state);
            }
        };

        events.post(PipelineEvent::MediaSavingStart(request.destination));

        let result = catch_unwind(AssertUnwindSafe(|| persist(store.as_ref(), &request)))
            .unwrap_or_else(|_| Err(StorageError::Other("media store panicked".to_string())));

        let mut state = shared.lock();
        state.queue.pop_front();
        match result {
            Ok(()) => {
                state.completed += 1;
                events.post(PipelineEvent::SnapshotSaved(SavedMedia {
                    id: request.destination,
                    kind: request.kind,
                    title: request.title.clone(),
                    width: request.width,
                    height: request.height,
                    snapshot_seq: request.snapshot_seq,
                }));
            }
            Err(err) => {
                state.failed += 1;
                error!(id = %request.destination, %err, "Failed to save media, dropping request");
                discard_placeholder(store.as_ref(), request.destination);
                events.post(PipelineEvent::Notice(Notice::SaveFailed {
                    id: request.destination,
                    reason: err.to_string(),
                }));
            }
        }
        events.post(PipelineEvent::MediaSavingDone(request.destination));
        shared.changed.notify_all();
    }
}

/// Write one request; metadata failures are logged since the data is already safe
fn persist(store: &dyn MediaStore, request: &SaveRequest) -> Result<(), StorageError> {
    store.write_and_catalog(&MediaWrite {
        id: request.destination,
        data: &request.data,
        title: &request.title,
        location: request.location,
        orientation: request.orientation,
        width: request.width,
        height: request.height,
    })?;

    if !request.tags.is_empty()
        && let Err(err) = store.rewrite_metadata(request.destination, &request.tags)
    {
        warn!(id = %request.destination, %err, "Metadata rewrite failed, image kept");
    }
    Ok(())
}

fn discard_placeholder(store: &dyn MediaStore, id: MediaId) {
    let discarded = catch_unwind(AssertUnwindSafe(|| store.delete_placeholder(id)));
    match discarded {
        Ok(Ok(())) => debug!(%id, "Removed placeholder of failed save"),
        Ok(Err(err)) => debug!(%id, %err, "Placeholder of failed save not removed"),
        Err(_) => warn!(%id, "Media store panicked while removing placeholder"),
    }
}
