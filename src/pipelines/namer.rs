// SPDX-License-Identifier: GPL-3.0-only

//! Identifier reservation worker
//!
//! Reserves a catalog placeholder for the next capture while the sensor is
//! still busy, so the capture path knows the destination as soon as the
//! shutter fires. Each worker holds at most one reservation: a new request
//! deletes the previous placeholder if nobody collected it.

use crate::constants::{is_quarter_turn, normalize_orientation, titles};
use crate::errors::{PipelineError, PipelineResult, StorageError};
use crate::storage::{MediaId, MediaKind, MediaStore};
use chrono::{Local, TimeZone};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, error, warn};

/// Catalog title for a capture taken at `timestamp_ms` (milliseconds since the epoch)
pub fn title_for(prefix: &str, timestamp_ms: i64) -> String {
    let time = Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_else(Local::now);
    format!("{}_{}", prefix, time.format(titles::TIMESTAMP_FORMAT))
}

#[derive(Default)]
struct Reservation {
    request_pending: bool,
    /// Bumped by every `prepare_uri`, lets the worker notice requests that
    /// arrived while it was allocating
    generation: u64,
    timestamp_ms: i64,
    width: u32,
    height: u32,
    allocated: Option<MediaId>,
    stop: bool,
    running: bool,
    superseded: u64,
}

struct Shared {
    state: Mutex<Reservation>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Reservation> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Reservation>) -> MutexGuard<'a, Reservation> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// One reservation worker for a single media kind
pub struct IdentifierReserver {
    kind: MediaKind,
    title_prefix: String,
    shared: Arc<Shared>,
    store: Arc<dyn MediaStore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl IdentifierReserver {
    pub fn new(kind: MediaKind, title_prefix: impl Into<String>, store: Arc<dyn MediaStore>) -> Self {
        Self {
            kind,
            title_prefix: title_prefix.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(Reservation::default()),
                changed: Condvar::new(),
            }),
            store,
            worker: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Start the worker thread, no-op if it is already running
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

        let name = match self.kind {
            MediaKind::Image => "image-namer",
            MediaKind::Video => "video-namer",
        };
        let shared = Arc::clone(&self.shared);
        let store = Arc::clone(&self.store);
        let kind = self.kind;
        let prefix = self.title_prefix.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || reserve_loop(shared, store, kind, prefix))
            .map_err(|source| {
                self.shared.lock().running = false;
                PipelineError::ThreadSpawn { name, source }
            })?;

        *worker = Some(handle);
        Ok(())
    }

    /// Ask the worker to reserve an identifier for a capture
    ///
    /// `rotation` is the pending rotation in degrees; quarter turns swap the
    /// reserved dimensions to match what ends up on disk.
    pub fn prepare_uri(&self, timestamp_ms: i64, width: u32, height: u32, rotation: i32) {
        let (width, height) = if is_quarter_turn(normalize_orientation(rotation)) {
            (height, width)
        } else {
            (width, height)
        };

        let mut state = self.shared.lock();
        state.timestamp_ms = timestamp_ms;
        state.width = width;
        state.height = height;
        state.request_pending = true;
        state.generation += 1;
        self.shared.changed.notify_all();
        debug!(kind = ?self.kind, width, height, "Identifier requested");
    }

    /// Collect the reserved identifier, waiting for an in-progress reservation
    ///
    /// Single use: a second call without another `prepare_uri` returns `None`.
    pub fn get_uri(&self) -> Option<MediaId> {
        let mut state = self.shared.lock();
        while state.request_pending {
            if !state.running {
                warn!(kind = ?self.kind, "Reservation worker not running");
                return None;
            }
            state = self.shared.wait(state);
        }
        state.allocated.take()
    }

    /// Number of reservations deleted because a newer request replaced them
    pub fn superseded_count(&self) -> u64 {
        self.shared.lock().superseded
    }

    /// Stop the worker, deleting any uncollected reservation
    pub fn finish(&self) {
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
            error!(kind = ?self.kind, "Reservation worker panicked");
        }
    }
}

impl Drop for IdentifierReserver {
    fn drop(&mut self) {
        self.finish();
    }
}

fn reserve_loop(shared: Arc<Shared>, store: Arc<dyn MediaStore>, kind: MediaKind, prefix: String) {
    loop {
        let (stale, timestamp_ms, width, height, generation) = {
            let mut state = shared.lock();
            while !state.request_pending && !state.stop {
                state = shared.wait(state);
            }

            if state.stop {
                let stale = state.allocated.take();
                state.request_pending = false;
                state.running = false;
                shared.changed.notify_all();
                drop(state);
                if let Some(id) = stale {
                    release(store.as_ref(), id);
                }
                debug!(?kind, "Reservation worker stopped");
                return;
            }

            if state.allocated.is_some() {
                state.superseded += 1;
            }
            (
                state.allocated.take(),
                state.timestamp_ms,
                state.width,
                state.height,
                state.generation,
            )
        };

        if let Some(id) = stale {
            debug!(%id, "Superseding uncollected reservation");
            release(store.as_ref(), id);
        }

        let title = title_for(&prefix, timestamp_ms);
        let allocated = catch_unwind(AssertUnwindSafe(|| {
            store.allocate_placeholder(kind, &title, timestamp_ms, width, height)
        }))
        .unwrap_or_else(|_| Err(StorageError::Other("media store panicked".to_string())));

        let mut state = shared.lock();
        match allocated {
            Ok(id) => {
                debug!(%id, %title, "Reserved identifier");
                // A newer request leaves this one for the next pass to delete
                state.allocated = Some(id);
            }
            Err(err) => error!(?kind, %err, "Failed to reserve identifier"),
        }
        if state.generation == generation {
            state.request_pending = false;
        }
        shared.changed.notify_all();
    }
}

fn release(store: &dyn MediaStore, id: MediaId) {
    match catch_unwind(AssertUnwindSafe(|| store.delete_placeholder(id))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(%id, %err, "Failed to delete stale reservation"),
        Err(_) => warn!(%id, "Media store panicked deleting stale reservation"),
    }
}
