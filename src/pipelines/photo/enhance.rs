// SPDX-License-Identifier: GPL-3.0-only

//! Enhancement hand-off
//!
//! Image enhancement itself lives outside the pipeline. This module only
//! defines the seam and the fallback policy: whatever goes wrong, the
//! unmodified capture is saved.

use crate::errors::EnhanceError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, warn};

/// External enhancement step run between capture and save
pub trait Enhancer: Send + Sync {
    fn enhance(&self, jpeg: &[u8]) -> Result<Vec<u8>, EnhanceError>;
}

/// Result of running an enhancer with fallback
#[derive(Debug)]
pub enum EnhanceOutcome {
    Enhanced(Vec<u8>),
    /// The original bytes, with the reason enhancement was skipped
    Original(Vec<u8>, EnhanceError),
}

impl EnhanceOutcome {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            EnhanceOutcome::Enhanced(data) | EnhanceOutcome::Original(data, _) => data,
        }
    }
}

/// Run `enhancer`, falling back to `original` on error, empty output or panic
pub fn enhance_or_original(enhancer: &dyn Enhancer, original: Vec<u8>) -> EnhanceOutcome {
    let result = catch_unwind(AssertUnwindSafe(|| enhancer.enhance(&original)))
        .unwrap_or_else(|_| Err(EnhanceError::Failed("enhancer panicked".to_string())));

    match result {
        Ok(enhanced) if !enhanced.is_empty() => {
            debug!(
                original = original.len(),
                enhanced = enhanced.len(),
                "Enhancement complete"
            );
            EnhanceOutcome::Enhanced(enhanced)
        }
        Ok(_) => {
            warn!("Enhancer returned no data, keeping original");
            EnhanceOutcome::Original(
                original,
                EnhanceError::Failed("empty output".to_string()),
            )
        }
        Err(err) => {
            warn!(%err, "Enhancement failed, keeping original");
            EnhanceOutcome::Original(original, err)
        }
    }
}
