// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=SNAPSHOT_PIPELINE_VERSION");

    // Packagers can pin the version string without a git checkout
    let version = std::env::var("SNAPSHOT_PIPELINE_VERSION").unwrap_or_else(|_| build_version());

    println!("cargo::rustc-env=PIPELINE_BUILD_VERSION={}", version);
}

/// Crate version, suffixed with the short commit hash when built from git
fn build_version() -> String {
    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    match commit_hash() {
        Some(hash) => format!("{}-{}", pkg_version, hash),
        None => pkg_version,
    }
}

fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
