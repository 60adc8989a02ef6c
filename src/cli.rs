// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! Drives the snapshot pipeline with the virtual camera:
//! - Bursts of photos
//! - A synthetic video clip
//! - Catalog listing

use image::ImageError;
use snapshot_pipeline::backends::virtual_camera::{VirtualCamera, VirtualCameraConfig};
use snapshot_pipeline::errors::EnhanceError;
use snapshot_pipeline::pipelines::RecordedVideo;
use snapshot_pipeline::pipelines::photo::Enhancer;
use snapshot_pipeline::{
    FileStore, MediaId, Notice, PipelineConfig, SavedMedia, SnapshotInfo, SnapshotListener,
    SnapshotManager,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Load config from an explicit path or the default location
pub fn load_config(path: Option<&Path>) -> PipelineConfig {
    match path {
        Some(path) => PipelineConfig::load_from(path),
        None => PipelineConfig::load(),
    }
}

/// Prints pipeline progress to stdout
struct ProgressPrinter {
    started: Instant,
}

impl ProgressPrinter {
    fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }
}

impl SnapshotListener for ProgressPrinter {
    fn on_snapshot_shutter(&self, snapshot: &SnapshotInfo) {
        println!("[{:>6} ms] shutter  #{}", self.elapsed_ms(), snapshot.seq);
    }

    fn on_snapshot_saved(&self, saved: &SavedMedia) {
        println!(
            "[{:>6} ms] saved    {} ({}x{}) {}",
            self.elapsed_ms(),
            saved.title,
            saved.width,
            saved.height,
            saved.id
        );
    }

    fn on_video_recording_start(&self, id: MediaId) {
        println!("[{:>6} ms] recording {}", self.elapsed_ms(), id);
    }

    fn on_video_recording_stop(&self, id: MediaId) {
        println!("[{:>6} ms] stopped   {}", self.elapsed_ms(), id);
    }

    fn on_notice(&self, notice: &Notice) {
        eprintln!("[{:>6} ms] {}", self.elapsed_ms(), notice);
    }
}

/// Simple contrast boost used by `burst --enhance`
struct ContrastEnhancer;

impl Enhancer for ContrastEnhancer {
    fn enhance(&self, jpeg: &[u8]) -> Result<Vec<u8>, EnhanceError> {
        let image = image::load_from_memory(jpeg).map_err(map_image_error)?;
        let enhanced = image.adjust_contrast(12.0).to_rgb8();

        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, 92);
        encoder
            .encode(
                enhanced.as_raw(),
                enhanced.width(),
                enhanced.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(map_image_error)?;
        Ok(buffer)
    }
}

fn map_image_error(err: ImageError) -> EnhanceError {
    match err {
        ImageError::Limits(_) => EnhanceError::OutOfMemory,
        other => EnhanceError::Failed(other.to_string()),
    }
}

fn interrupt_flag() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Interrupted, draining pending saves...");
        flag.store(true, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {}", e);
    }
    interrupted
}

fn build_manager(
    mut config: PipelineConfig,
    output: Option<PathBuf>,
    enhance: bool,
) -> Result<(SnapshotManager, Arc<FileStore>), Box<dyn std::error::Error>> {
    if let Some(dir) = output {
        config.media_dir = dir;
    }
    config.auto_enhance |= enhance;

    let store = Arc::new(FileStore::open(&config.media_dir)?);
    let camera = Arc::new(VirtualCamera::new(VirtualCameraConfig::default()));
    let enhancer: Option<Arc<dyn Enhancer>> = if config.auto_enhance {
        Some(Arc::new(ContrastEnhancer))
    } else {
        None
    };

    println!("Saving to {}", config.media_dir.display());
    let manager = SnapshotManager::new(config, camera, store.clone(), enhancer)?;
    manager.add_listener(Arc::new(ProgressPrinter {
        started: Instant::now(),
    }));
    Ok((manager, store))
}

/// Take `count` photos as fast as the capture queue accepts them
pub fn burst(
    config: PipelineConfig,
    count: u32,
    exposure: i32,
    output: Option<PathBuf>,
    enhance: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let interrupted = interrupt_flag();
    let (manager, _store) = build_manager(config, output, enhance)?;

    let mut queued = 0;
    while queued < count && !interrupted.load(Ordering::SeqCst) {
        if manager.queue_snapshot(true, exposure) {
            queued += 1;
        } else {
            // Capture queue full, the next shutter will make room
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    manager.on_pause();
    let stats = manager.save_stats();
    println!(
        "Queued {} photo(s): {} saved, {} failed",
        queued, stats.completed, stats.failed
    );
    manager.shutdown();
    Ok(())
}

/// Record a synthetic clip of `duration` seconds
pub fn record_video(
    config: PipelineConfig,
    duration: u64,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let interrupted = interrupt_flag();
    let (manager, _store) = build_manager(config, output, false)?;

    if manager.start_video_recording().is_none() {
        return Err("Could not start recording".into());
    }

    let started = Instant::now();
    let target = Duration::from_secs(duration);
    while started.elapsed() < target && !interrupted.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    // Placeholder payload; the virtual camera has no video encoder
    let elapsed = started.elapsed();
    let data = vec![0u8; 64 * 1024 * elapsed.as_secs().max(1) as usize];
    manager.stop_video_recording(RecordedVideo {
        data,
        duration: elapsed,
    });
    manager.shutdown();
    Ok(())
}

/// Print every catalog entry in the media directory
pub fn list_catalog(
    mut config: PipelineConfig,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = output {
        config.media_dir = dir;
    }
    let store = FileStore::open(&config.media_dir)?;
    let entries = store.entries();

    if entries.is_empty() {
        println!("Catalog is empty.");
        return Ok(());
    }

    println!("Catalog of {}:", store.root().display());
    println!();
    for entry in entries {
        let state = if entry.pending { "pending" } else { "saved" };
        println!(
            "  {:<28} {:?} {:>5}x{:<5} {:>9} bytes  {}",
            entry.file_name, entry.kind, entry.width, entry.height, entry.size_bytes, state
        );
    }
    Ok(())
}

pub fn print_config(config: &PipelineConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = PipelineConfig::default_path() {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
