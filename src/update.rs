//! Best-effort release check against crates.io
//!
//! Runs beside the session and never delays it. Any failure simply means no
//! notice is shown.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Version of this build (from Cargo.toml)
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const CRATES_IO_URL: &str = "https://crates.io/api/v1/crates/amy-cli";
const CHECK_TIMEOUT_SECS: u64 = 5;

/// A newer release published on crates.io
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub latest_version: String,
}

#[derive(Debug, Deserialize)]
struct CrateResponse {
    #[serde(rename = "crate")]
    krate: CrateInfo,
}

#[derive(Debug, Deserialize)]
struct CrateInfo {
    max_stable_version: String,
}

/// Query crates.io; `Some` only when a newer stable release exists
pub async fn check_for_update() -> Result<Option<UpdateInfo>> {
    let client = reqwest::Client::builder()
        .user_agent(format!("amy-cli/{}", CURRENT_VERSION))
        .timeout(Duration::from_secs(CHECK_TIMEOUT_SECS))
        .build()
        .context("Failed to create HTTP client")?;

    let body = client
        .get(CRATES_IO_URL)
        .send()
        .await
        .context("Failed to fetch version info from crates.io")?
        .text()
        .await
        .context("Failed to read crates.io response")?;

    Ok(newer_release(&body, CURRENT_VERSION))
}

fn newer_release(body: &str, current: &str) -> Option<UpdateInfo> {
    let response: CrateResponse = serde_json::from_str(body).ok()?;
    let latest = response.krate.max_stable_version;
    is_newer_version(&latest, current).then_some(UpdateInfo {
        latest_version: latest,
    })
}

/// Start the check in the background
pub fn spawn_check() -> JoinHandle<Option<UpdateInfo>> {
    tokio::spawn(async {
        match check_for_update().await {
            Ok(info) => info,
            Err(err) => {
                tracing::debug!(error = %err, "update check failed");
                None
            }
        }
    })
}

/// Result of a background check, but only if it has already finished
pub async fn take_if_finished(handle: JoinHandle<Option<UpdateInfo>>) -> Option<UpdateInfo> {
    if !handle.is_finished() {
        handle.abort();
        return None;
    }
    handle.await.ok().flatten()
}

pub fn print_notice(info: &UpdateInfo) {
    eprintln!();
    eprintln!(
        "  Update available: {} -> {}",
        CURRENT_VERSION, info.latest_version
    );
    eprintln!("  Run: cargo install amy-cli --locked");
}

/// True when `latest` is a higher `major.minor.patch` than `current`.
/// A leading `v` and prerelease suffixes are ignored; unparseable input never counts as newer.
fn is_newer_version(latest: &str, current: &str) -> bool {
    fn triple(v: &str) -> Option<(u32, u32, u32)> {
        let mut parts = v.trim().trim_start_matches('v').splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.split(['-', '+']).next()?.parse().ok()?;
        Some((major, minor, patch))
    }

    match (triple(latest), triple(current)) {
        (Some(l), Some(c)) => l > c,
        _ => false,
    }
}
