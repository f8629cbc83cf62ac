//! Environment facts fed into prompt composition
//!
//! The session treats every field as opaque input; nothing here decides
//! behaviour beyond what ends up in the system prompt.

use anyhow::{Context, Result};
use std::path::Path;

/// Platform facts describing where a generated command will run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub platform: String,
    pub release: String,
    pub arch: String,
    pub shell: String,
    pub cwd: String,
    pub is_root: bool,
}

impl EnvironmentContext {
    /// Probe the current process environment
    pub fn detect() -> Result<Self> {
        let platform = platform_name().to_string();
        let cwd = std::env::current_dir()
            .context("Failed to detect environment: working directory is unavailable")?;

        Ok(Self {
            shell: detect_shell(std::env::var("SHELL").ok().as_deref(), &platform),
            release: os_release(),
            arch: arch_name().to_string(),
            cwd: cwd.display().to_string(),
            is_root: is_root(),
            platform,
        })
    }
}

/// Map Rust's OS names onto the names shells and package docs use
fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn arch_name() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    }
}

/// Shell name from `$SHELL`, falling back to the platform default
fn detect_shell(shell_var: Option<&str>, platform: &str) -> String {
    if let Some(shell) = shell_var.map(str::trim).filter(|s| !s.is_empty()) {
        return Path::new(shell)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| shell.to_string());
    }

    match platform {
        "win32" => "powershell".to_string(),
        "darwin" => "zsh".to_string(),
        _ => "bash".to_string(),
    }
}

#[cfg(unix)]
fn os_release() -> String {
    std::process::Command::new("uname")
        .arg("-r")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|release| !release.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(unix))]
fn os_release() -> String {
    std::env::var("OS").unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn is_root() -> bool {
    std::process::Command::new("id")
        .arg("-u")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim() == "0")
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}
