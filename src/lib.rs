// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot pipeline - asynchronous media persistence for camera captures
//!
//! Accepts still and video captures from a camera and stores them durably
//! without blocking the capture path.
//!
//! # Architecture
//!
//! - [`pipelines`]: capture queue, save queue, reservation workers, events
//! - [`backends`]: camera abstraction and a virtual camera
//! - [`storage`]: media store trait and the file-backed catalog
//! - [`config`]: user configuration
//!
//! # Example
//!
//! ```no_run
//! use snapshot_pipeline::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};
//! use snapshot_pipeline::storage::FileStore;
//! use snapshot_pipeline::{PipelineConfig, SnapshotManager};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let store = Arc::new(FileStore::open(&config.media_dir)?);
//! let camera = Arc::new(VirtualCamera::new(VirtualCameraConfig::default()));
//! let manager = SnapshotManager::new(config, camera, store, None)?;
//! manager.queue_snapshot(true, 0);
//! manager.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use errors::{PipelineError, PipelineResult};
pub use pipelines::{Notice, SavedMedia, SnapshotInfo, SnapshotListener, SnapshotManager};
pub use storage::{FileStore, MediaId, MediaKind, MediaStore};
