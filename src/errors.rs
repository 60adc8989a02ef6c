// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the snapshot pipeline
//!
//! Worker threads never return these across thread boundaries; they log them
//! and fall back. The caller-facing API uses [`PipelineError`].

use thiserror::Error;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Top-level pipeline error
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Camera hardware errors
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    /// Storage or catalog errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Enhancement errors
    #[error("Enhancement error: {0}")]
    Enhance(#[from] EnhanceError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// A worker thread could not be created
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Camera hardware errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// Camera is busy with another request
    #[error("Camera is busy")]
    Busy,
    /// A parameter change was rejected by the hardware
    #[error("Parameter rejected: {0}")]
    ParameterRejected(String),
    /// Camera disconnected during operation
    #[error("Camera disconnected")]
    Disconnected,
    /// Capture could not be started
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
}

impl CameraError {
    /// Whether resetting to the last known-good configuration may help
    pub fn is_transient(&self) -> bool {
        matches!(self, CameraError::Busy | CameraError::ParameterRejected(_))
    }
}

/// Storage and catalog errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Catalog could not be read or written
    #[error("Catalog error: {0}")]
    Catalog(#[from] serde_json::Error),
    /// No catalog entry with this identifier
    #[error("Unknown media identifier {0}")]
    UnknownId(String),
    /// Entry exists but was already completed
    #[error("Media {0} is not a pending placeholder")]
    NotPending(String),
    /// Generic failure reported by a store implementation
    #[error("{0}")]
    Other(String),
}

/// Enhancement errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnhanceError {
    /// Not enough memory to process the frame
    #[error("Out of memory during enhancement")]
    OutOfMemory,
    /// Any other processing failure
    #[error("Enhancement failed: {0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_camera_errors() {
        assert!(CameraError::Busy.is_transient());
        assert!(CameraError::ParameterRejected("ev".into()).is_transient());
        assert!(!CameraError::Disconnected.is_transient());
    }

    #[test]
    fn test_error_conversion_and_display() {
        let err: PipelineError = CameraError::Busy.into();
        assert_eq!(err.to_string(), "Camera error: Camera is busy");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: PipelineError = StorageError::from(io).into();
        assert!(err.to_string().contains("disk full"));
    }
}
