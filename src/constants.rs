// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline-wide constants

use std::time::Duration;

/// Maximum number of save requests held by the bounded save queue.
///
/// Producers block once this many requests are queued (including the one the
/// save worker is currently writing).
pub const QUEUE_LIMIT: usize = 3;

/// Maximum number of snapshot requests outstanding in the capture queue.
///
/// Requests beyond this depth are rejected rather than blocked.
pub const CAPTURE_QUEUE_LIMIT: usize = 2;

/// Time the capture routine waits after an exposure change before firing the shutter
pub const EXPOSURE_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Upper bound on how long `on_pause` waits for in-flight captures
pub const DEFAULT_PAUSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Title prefixes for reserved catalog entries
pub mod titles {
    pub const IMAGE_PREFIX: &str = "IMG";
    pub const VIDEO_PREFIX: &str = "VID";

    /// strftime pattern appended to the prefix, millisecond precision so
    /// burst shots do not collide
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
}

/// Catalog file kept at the root of the media directory
pub const CATALOG_FILE_NAME: &str = "catalog.json";

/// Suffix for files that are still being written
pub const TEMP_FILE_SUFFIX: &str = "tmp";

/// Metadata tag keys attached to saves
pub mod tags {
    pub const DATE_TIME: &str = "DateTime";
    pub const EXPOSURE_COMPENSATION: &str = "ExposureCompensation";
    pub const ORIENTATION: &str = "Orientation";
    pub const SOFTWARE: &str = "Software";
    /// Video clips only
    pub const DURATION_MS: &str = "DurationMs";
}

/// Normalize a rotation hint to one of 0, 90, 180, 270 degrees
pub fn normalize_orientation(degrees: i32) -> u32 {
    let normalized = degrees.rem_euclid(360);
    // Snap to the nearest quarter turn
    (((normalized + 45) / 90 * 90) % 360) as u32
}

/// Whether a rotation swaps the stored width and height
pub fn is_quarter_turn(orientation: u32) -> bool {
    matches!(orientation, 90 | 270)
}
