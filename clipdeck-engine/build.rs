//! Build script for clipdeck-engine
//!
//! Embeds build identification (git hash, timestamp, profile) for the
//! startup log line of the `clipdeck` binary.

use std::process::Command;

fn main() {
    // Capture git commit hash (short form, 8 characters)
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Capture build timestamp in ISO 8601 format
    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    // Determine build profile
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=CLIPDECK_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=CLIPDECK_BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=CLIPDECK_BUILD_PROFILE={}", profile);
    println!("cargo:rerun-if-changed=src");
}
