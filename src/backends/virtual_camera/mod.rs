// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera device
//!
//! Renders a gradient test pattern whose brightness follows the exposure
//! compensation and encodes it as JPEG on a per-capture thread. Shutter and
//! readout latencies are configurable so burst behavior can be observed
//! without hardware.

use crate::backends::camera::{
    CameraDevice, CameraResult, PictureCallback, ShutterCallback, Thumbnail,
};
use crate::errors::CameraError;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error};

const THUMBNAIL_WIDTH: u32 = 160;
const JPEG_QUALITY: u8 = 90;
/// Brightness change per exposure compensation step
const EV_STEP: i32 = 24;

#[derive(Debug, Clone)]
pub struct VirtualCameraConfig {
    pub width: u32,
    pub height: u32,
    /// Time from `take_picture` to the shutter callback
    pub shutter_latency: Duration,
    /// Time from the shutter callback to the picture callback
    pub readout_latency: Duration,
    /// Rotation reported for stored pictures
    pub orientation: u32,
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            shutter_latency: Duration::from_millis(30),
            readout_latency: Duration::from_millis(60),
            orientation: 0,
        }
    }
}

pub struct VirtualCamera {
    config: VirtualCameraConfig,
    exposure: Arc<AtomicI32>,
    busy: Arc<AtomicBool>,
    frame_counter: Arc<AtomicU64>,
}

impl VirtualCamera {
    pub fn new(config: VirtualCameraConfig) -> Self {
        Self {
            config,
            exposure: Arc::new(AtomicI32::new(0)),
            busy: Arc::new(AtomicBool::new(false)),
            frame_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of pictures delivered so far
    pub fn frames_captured(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }

    fn render(width: u32, height: u32, exposure: i32, frame: u64) -> RgbImage {
        let offset = (frame * 17 % 255) as u32;
        let bias = exposure * EV_STEP;
        RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1) + offset) % 256;
            let g = y * 255 / height.max(1);
            let b = 128u32;
            let adjust = |c: u32| (c as i32 + bias).clamp(0, 255) as u8;
            Rgb([adjust(r), adjust(g), adjust(b)])
        })
    }

    fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, String> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
        encoder
            .encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| format!("JPEG encoding failed: {}", e))?;
        Ok(buffer)
    }
}

impl CameraDevice for VirtualCamera {
    fn exposure_compensation(&self) -> i32 {
        self.exposure.load(Ordering::Relaxed)
    }

    fn set_exposure_compensation(&self, value: i32) -> CameraResult<()> {
        if !(-4..=4).contains(&value) {
            return Err(CameraError::ParameterRejected(format!(
                "exposure compensation {} outside -4..=4",
                value
            )));
        }
        self.exposure.store(value, Ordering::Relaxed);
        debug!(value, "Virtual camera exposure set");
        Ok(())
    }

    fn picture_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn orientation(&self) -> u32 {
        self.config.orientation
    }

    fn preview_thumbnail(&self) -> Option<Thumbnail> {
        let width = THUMBNAIL_WIDTH.min(self.config.width);
        let height = (width * self.config.height / self.config.width.max(1)).max(1);
        let level = (128 + self.exposure_compensation() * EV_STEP).clamp(0, 255) as u8;
        Some(Arc::new(RgbaImage::from_pixel(
            width,
            height,
            Rgba([level, level, level, 255]),
        )))
    }

    fn take_picture(
        &self,
        on_shutter: ShutterCallback,
        on_picture: PictureCallback,
    ) -> CameraResult<()> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(CameraError::Busy);
        }

        let config = self.config.clone();
        let exposure = self.exposure_compensation();
        let busy = Arc::clone(&self.busy);
        let counter = Arc::clone(&self.frame_counter);

        let spawned = std::thread::Builder::new()
            .name("virtual-camera-capture".to_string())
            .spawn(move || {
                std::thread::sleep(config.shutter_latency);
                on_shutter();

                std::thread::sleep(config.readout_latency);
                let frame = counter.fetch_add(1, Ordering::Relaxed);
                let image = Self::render(config.width, config.height, exposure, frame);
                let data = match Self::encode_jpeg(&image) {
                    Ok(data) => data,
                    Err(e) => {
                        error!(error = %e, "Virtual camera failed to encode frame");
                        Vec::new()
                    }
                };

                // Free the device before handing off so the next capture can chain
                busy.store(false, Ordering::Release);
                on_picture(data);
            });

        if let Err(e) = spawned {
            self.busy.store(false, Ordering::Release);
            return Err(CameraError::CaptureFailed(format!(
                "spawn capture thread: {}",
                e
            )));
        }
        Ok(())
    }
}
