// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline configuration
//!
//! Stored as JSON under the user's config directory. Unknown or missing keys
//! fall back to their defaults so older files keep loading.

use crate::constants::{self, titles};
use crate::errors::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const APP_DIR: &str = "snapshot-pipeline";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory that receives saved media and the catalog
    pub media_dir: PathBuf,
    /// Capacity of the bounded save queue
    pub save_queue_limit: usize,
    /// Maximum outstanding snapshot requests
    pub capture_queue_limit: usize,
    /// Delay honored after an exposure change, in milliseconds
    pub exposure_settle_ms: u64,
    /// Bound on how long pausing waits for in-flight captures, in milliseconds
    pub pause_timeout_ms: u64,
    /// Run the enhancer on captures that do not bypass processing
    pub auto_enhance: bool,
    /// Title prefix for still images
    pub title_prefix_image: String,
    /// Title prefix for videos
    pub title_prefix_video: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            save_queue_limit: constants::QUEUE_LIMIT,
            capture_queue_limit: constants::CAPTURE_QUEUE_LIMIT,
            exposure_settle_ms: constants::EXPOSURE_SETTLE_DELAY.as_millis() as u64,
            pause_timeout_ms: constants::DEFAULT_PAUSE_TIMEOUT.as_millis() as u64,
            auto_enhance: false,
            title_prefix_image: titles::IMAGE_PREFIX.to_string(),
            title_prefix_video: titles::VIDEO_PREFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Default config file location (`$XDG_CONFIG_HOME/snapshot-pipeline/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("No config directory available, using defaults");
                Self::default()
            }
        }
    }

    /// Load from a specific file, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded pipeline config");
                    config.sanitized()
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "Malformed config, using defaults");
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                warn!(path = %path.display(), %err, "Failed to read config, using defaults");
                Self::default()
            }
        }
    }

    /// Write as pretty JSON through a temporary file
    pub fn save_to(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("serialize: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::Config(format!("create {}: {}", parent.display(), e)))?;
        }
        let tmp = path.with_extension(constants::TEMP_FILE_SUFFIX);
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| PipelineError::Config(format!("write {}: {}", path.display(), e)))
    }

    pub fn exposure_settle_delay(&self) -> Duration {
        Duration::from_millis(self.exposure_settle_ms)
    }

    pub fn pause_timeout(&self) -> Duration {
        Duration::from_millis(self.pause_timeout_ms)
    }

    /// Clamp limits so a hand-edited file cannot disable the queues
    fn sanitized(mut self) -> Self {
        if self.save_queue_limit == 0 {
            warn!("save_queue_limit must be at least 1, using default");
            self.save_queue_limit = constants::QUEUE_LIMIT;
        }
        if self.capture_queue_limit == 0 {
            warn!("capture_queue_limit must be at least 1, using default");
            self.capture_queue_limit = constants::CAPTURE_QUEUE_LIMIT;
        }
        self
    }
}

fn default_media_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("camera")
}
