// SPDX-License-Identifier: GPL-3.0-only

//! Media persistence pipelines
//!
//! Captures leave the camera path as quickly as possible and are persisted by
//! dedicated worker threads:
//!
//! ```text
//! ┌───────────────┐   ┌──────────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ Capture queue │ ─▶│ Image/video namer│ ─▶│  Save queue  │ ─▶│ MediaStore  │
//! │  (≤ 2 shots)  │   │ (reserve entry)  │   │ (≤ 3, FIFO)  │   │ + catalog   │
//! └───────────────┘   └──────────────────┘   └──────────────┘   └─────────────┘
//!          │                                        │
//!          └──────────── EventBus ◀─────────────────┘
//!                      (listeners)
//! ```
//!
//! # Modules
//!
//! - [`manager`]: [`SnapshotManager`], owner of every queue and worker
//! - [`photo`]: capture queue and enhancement hand-off
//! - [`video`]: recording sessions
//! - [`save_queue`]: bounded save queue and save worker
//! - [`namer`]: identifier reservation workers
//! - [`events`]: listener interface and dispatcher

pub mod events;
pub mod manager;
pub mod namer;
pub mod photo;
pub mod save_queue;
pub mod video;

pub use events::{EventBus, Notice, PipelineEvent, SavedMedia, SnapshotInfo, SnapshotListener};
pub use manager::SnapshotManager;
pub use photo::capture::SnapshotOptions;
pub use save_queue::{SaveQueue, SaveQueueStats, SaveRequest};
pub use video::RecordedVideo;
