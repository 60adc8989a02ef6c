// SPDX-License-Identifier: GPL-3.0-only

//! Lifecycle events and listener fan-out
//!
//! Workers post [`PipelineEvent`]s to an [`EventBus`]. A single dispatcher
//! thread delivers them to every registered [`SnapshotListener`] in
//! registration order, so listeners never run concurrently with each other
//! and never run while a queue lock is held.

use crate::backends::camera::Thumbnail;
use crate::errors::{PipelineError, PipelineResult};
use crate::storage::{MediaId, MediaKind};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use tracing::{debug, error, warn};

/// Value copy of a snapshot request, carried by notifications
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// Submission sequence number, unique per manager
    pub seq: u64,
    pub save: bool,
    pub exposure_compensation: i32,
    pub thumbnail: Option<Thumbnail>,
}

/// A completed save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMedia {
    pub id: MediaId,
    pub kind: MediaKind,
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Sequence number of the originating snapshot, if any
    pub snapshot_seq: Option<u64>,
}

/// Transient, user-visible notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Enhancement failed and the unmodified capture was saved instead
    EnhanceFailed { snapshot_seq: u64, reason: String },
    /// Storage rejected a save; the capture is lost
    SaveFailed { id: MediaId, reason: String },
    /// The camera could not take a queued snapshot
    CaptureFailed { snapshot_seq: u64, reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::EnhanceFailed { .. } => write!(f, "Auto-enhance failed, original saved"),
            Notice::SaveFailed { reason, .. } => write!(f, "Could not save photo: {}", reason),
            Notice::CaptureFailed { reason, .. } => write!(f, "Capture failed: {}", reason),
        }
    }
}

/// Observer of pipeline progress
///
/// All methods run on the dispatcher thread and should return quickly.
#[allow(unused_variables)]
pub trait SnapshotListener: Send + Sync {
    fn on_snapshot_shutter(&self, snapshot: &SnapshotInfo) {}
    fn on_snapshot_processing(&self, snapshot: &SnapshotInfo) {}
    fn on_snapshot_saved(&self, saved: &SavedMedia) {}
    fn on_media_saving_start(&self, id: MediaId) {}
    fn on_media_saving_done(&self, id: MediaId) {}
    fn on_video_recording_start(&self, id: MediaId) {}
    fn on_video_recording_stop(&self, id: MediaId) {}
    fn on_notice(&self, notice: &Notice) {}
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    SnapshotShutter(SnapshotInfo),
    SnapshotProcessing(SnapshotInfo),
    SnapshotSaved(SavedMedia),
    MediaSavingStart(MediaId),
    MediaSavingDone(MediaId),
    VideoRecordingStart(MediaId),
    VideoRecordingStop(MediaId),
    Notice(Notice),
}

impl PipelineEvent {
    fn deliver(&self, listener: &dyn SnapshotListener) {
        match self {
            PipelineEvent::SnapshotShutter(info) => listener.on_snapshot_shutter(info),
            PipelineEvent::SnapshotProcessing(info) => listener.on_snapshot_processing(info),
            PipelineEvent::SnapshotSaved(saved) => listener.on_snapshot_saved(saved),
            PipelineEvent::MediaSavingStart(id) => listener.on_media_saving_start(*id),
            PipelineEvent::MediaSavingDone(id) => listener.on_media_saving_done(*id),
            PipelineEvent::VideoRecordingStart(id) => listener.on_video_recording_start(*id),
            PipelineEvent::VideoRecordingStop(id) => listener.on_video_recording_stop(*id),
            PipelineEvent::Notice(notice) => listener.on_notice(notice),
        }
    }
}

enum Dispatch {
    Event(PipelineEvent),
    Flush(mpsc::SyncSender<()>),
}

type ListenerList = Arc<Mutex<Vec<Arc<dyn SnapshotListener>>>>;

/// Ordered listener registry with a single dispatcher thread
pub struct EventBus {
    listeners: ListenerList,
    sender: Mutex<Option<mpsc::Sender<Dispatch>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    dispatcher_id: ThreadId,
}

impl EventBus {
    /// Create the bus and start its dispatcher thread
    pub fn start() -> PipelineResult<Self> {
        let listeners: ListenerList = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel::<Dispatch>();

        let thread_listeners = Arc::clone(&listeners);
        let dispatcher = std::thread::Builder::new()
            .name("snapshot-events".to_string())
            .spawn(move || dispatch_loop(rx, thread_listeners))
            .map_err(|source| PipelineError::ThreadSpawn {
                name: "snapshot-events",
                source,
            })?;

        Ok(Self {
            listeners,
            sender: Mutex::new(Some(tx)),
            dispatcher_id: dispatcher.thread().id(),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn register(&self, listener: Arc<dyn SnapshotListener>) {
        lock(&self.listeners).push(listener);
    }

    /// Remove a previously registered listener, returns whether it was found
    pub fn unregister(&self, listener: &Arc<dyn SnapshotListener>) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Queue an event for delivery, never blocks on listeners
    pub fn post(&self, event: PipelineEvent) {
        let sender = lock(&self.sender);
        match sender.as_ref() {
            Some(tx) => {
                if tx.send(Dispatch::Event(event)).is_err() {
                    warn!("Event dispatcher is gone, dropping event");
                }
            }
            None => debug!(?event, "Event bus stopped, dropping event"),
        }
    }

    /// Whether the caller is a listener running on the dispatcher thread
    pub fn on_dispatcher_thread(&self) -> bool {
        std::thread::current().id() == self.dispatcher_id
    }

    /// Block until every event posted before this call has been delivered
    ///
    /// From inside a listener this returns at once: earlier events are
    /// already queued ahead of anything the listener could wait for.
    pub fn flush(&self) {
        if self.on_dispatcher_thread() {
            debug!("Flush requested from a listener, not waiting");
            return;
        }
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        {
            let sender = lock(&self.sender);
            let Some(tx) = sender.as_ref() else {
                return;
            };
            if tx.send(Dispatch::Flush(ack_tx)).is_err() {
                return;
            }
        }
        let _ = ack_rx.recv();
    }

    /// Deliver outstanding events and stop the dispatcher thread
    pub fn shutdown(&self) {
        // Dropping the sender ends the dispatcher's receive loop
        lock(&self.sender).take();
        if self.on_dispatcher_thread() {
            // The loop exits once the current listener returns
            return;
        }
        if let Some(handle) = lock(&self.dispatcher).take()
            && handle.join().is_err()
        {
            error!("Event dispatcher thread panicked");
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(rx: mpsc::Receiver<Dispatch>, listeners: ListenerList) {
    for message in rx {
        match message {
            Dispatch::Event(event) => {
                // Clone the list so listeners may register or unregister re-entrantly
                let current: Vec<Arc<dyn SnapshotListener>> = lock(&listeners).clone();
                for listener in current {
                    let delivered =
                        catch_unwind(AssertUnwindSafe(|| event.deliver(listener.as_ref())));
                    if delivered.is_err() {
                        error!(?event, "Listener panicked while handling event");
                    }
                }
            }
            Dispatch::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Event dispatcher stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
