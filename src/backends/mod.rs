// SPDX-License-Identifier: GPL-3.0-only

//! Camera backends
//!
//! - [`camera`]: the hardware abstraction the pipeline drives
//! - [`virtual_camera`]: a synthetic device for demos and the CLI

pub mod camera;
pub mod virtual_camera;
