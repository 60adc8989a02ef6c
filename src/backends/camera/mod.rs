// SPDX-License-Identifier: GPL-3.0-only

//! Camera hardware abstraction
//!
//! The snapshot pipeline never touches sensor controls directly. It asks a
//! [`CameraDevice`] for a picture and receives two callbacks: the shutter
//! confirmation and, later, the encoded data. Each is invoked at most once per
//! requested capture, shutter first.

use crate::errors::CameraError;
use image::RgbaImage;
use std::sync::Arc;

/// Preview frame kept with a snapshot request as a placeholder image
pub type Thumbnail = Arc<RgbaImage>;

/// Fired once the sensor exposure has completed
pub type ShutterCallback = Box<dyn FnOnce() + Send + 'static>;

/// Fired with the encoded picture bytes
pub type PictureCallback = Box<dyn FnOnce(Vec<u8>) + Send + 'static>;

pub type CameraResult<T> = Result<T, CameraError>;

pub trait CameraDevice: Send + Sync {
    /// Current exposure compensation step
    fn exposure_compensation(&self) -> i32;

    /// Request a new exposure compensation step
    ///
    /// May return before the hardware has settled.
    fn set_exposure_compensation(&self, value: i32) -> CameraResult<()>;

    /// Dimensions of the next still capture, before rotation
    fn picture_size(&self) -> (u32, u32);

    /// Dimensions of recorded video, before rotation
    fn video_size(&self) -> (u32, u32) {
        self.picture_size()
    }

    /// Rotation that will be applied to the stored picture, in degrees
    fn orientation(&self) -> u32 {
        0
    }

    /// Latest preview frame scaled down for use as a placeholder
    fn preview_thumbnail(&self) -> Option<Thumbnail>;

    /// Device-specific bracketing mode that changes exposure per shot
    fn bracket_mode_active(&self) -> bool {
        false
    }

    /// Start a still capture
    ///
    /// Returns as soon as the capture is queued with the hardware; the
    /// callbacks fire later from a thread owned by the device.
    fn take_picture(&self, on_shutter: ShutterCallback, on_picture: PictureCallback)
    -> CameraResult<()>;
}
