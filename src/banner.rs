//! Startup diagnostics: root warning and the version report.
use std::ffi::OsStr;

use crate::launcher::find_executable;

/// Program names checked for the version report.
const KNOWN_TOOLS: &[&str] = &["streamlink", "yt-dlp", "youtube-dl"];

pub fn check_root() {
    if nix::unistd::geteuid().is_root() {
        tracing::info!("LiveProxy is running as root! Be careful!");
    }
}

pub fn build_info() -> String {
    format!(
        "{} ({}, {}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("LIVEPROXY_BUILD_TARGET"),
        env!("LIVEPROXY_BUILD_PROFILE"),
        env!("LIVEPROXY_BUILD_DATE"),
    )
}

pub fn log_current_versions(search_path: Option<&OsStr>) {
    tracing::info!("For LiveProxy support visit https://github.com/back-to/liveproxy");
    tracing::debug!(
        "OS:         {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    tracing::debug!("LiveProxy:  {}", build_info());
    tracing::debug!("Rust:       {}", env!("LIVEPROXY_BUILD_RUSTC"));
    for tool in KNOWN_TOOLS {
        let found = find_executable(tool, search_path)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not found)".to_string());
        tracing::debug!("{:<11} {}", format!("{tool}:"), found);
    }
}
