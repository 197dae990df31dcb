//! Bakes the build identity into compile-time `env!()` constants, defaulting
//! to `"unknown"`/`"TRUNK"` unless the build system injects real
//! values. Here the injection point is an environment variable read at
//! build time rather than a `-D` compiler flag.

use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn git_commit() -> String {
    std::env::var("FIM_BUILD_COMMIT").unwrap_or_else(|_| {
        Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=FIM_BUILD_COMMIT");
    println!("cargo:rerun-if-env-changed=FIM_BUILD_DIST");
    println!("cargo:rerun-if-env-changed=FIM_BUILD_TIMESTAMP");

    let commit = git_commit();
    let dist = std::env::var("FIM_BUILD_DIST").unwrap_or_else(|_| "TRUNK".to_string());
    let timestamp = std::env::var("FIM_BUILD_TIMESTAMP").unwrap_or_else(|_| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs().to_string())
            .unwrap_or_else(|_| "0".to_string())
    });

    println!("cargo:rustc-env=FIM_COMMIT={commit}");
    println!("cargo:rustc-env=FIM_DIST={dist}");
    println!("cargo:rustc-env=FIM_TIMESTAMP={timestamp}");
}
