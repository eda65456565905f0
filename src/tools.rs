//! External tool resolution.
//!
//! The transcoder and probe binaries are resolved once at startup: an
//! explicitly configured path wins, then a bundled binary directory, then
//! PATH lookup. Acquisition (downloading FFmpeg) is the shell's business;
//! this crate only consumes the resolved paths.

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

pub const FFMPEG: &str = "ffmpeg";
pub const FFPROBE: &str = "ffprobe";

#[derive(Debug, thiserror::Error)]
pub enum ToolsError {
    /// A required external tool could not be located.
    #[error("tool not found: {tool}")]
    NotFound { tool: String },
}

/// Resolved transcoder/probe binaries plus the reported ffmpeg version line.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// First line of `ffmpeg -version`, for startup logging.
    pub version_line: Option<String>,
}

/// Where to look for the binaries, in order of preference.
#[derive(Debug, Clone, Default)]
pub struct ToolLocations {
    /// Explicit path to ffmpeg, e.g. from configuration.
    pub ffmpeg: Option<PathBuf>,
    /// Explicit path to ffprobe.
    pub ffprobe: Option<PathBuf>,
    /// Directory holding bundled copies of both binaries.
    pub bin_dir: Option<PathBuf>,
}

/// Resolve ffmpeg and ffprobe once at startup.
pub fn resolve(locations: &ToolLocations) -> Result<ToolPaths, ToolsError> {
    let ffmpeg = resolve_tool(FFMPEG, locations.ffmpeg.as_deref(), locations.bin_dir.as_deref())?;
    let ffprobe = resolve_tool(
        FFPROBE,
        locations.ffprobe.as_deref(),
        locations.bin_dir.as_deref(),
    )?;

    let version_line = version_line(&ffmpeg);
    match &version_line {
        Some(line) => debug!("resolved ffmpeg at {}: {}", ffmpeg.display(), line),
        None => warn!("resolved ffmpeg at {} but -version failed", ffmpeg.display()),
    }

    Ok(ToolPaths {
        ffmpeg,
        ffprobe,
        version_line,
    })
}

fn resolve_tool(
    name: &str,
    configured: Option<&Path>,
    bin_dir: Option<&Path>,
) -> Result<PathBuf, ToolsError> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        warn!(
            "configured path for {} does not exist: {}",
            name,
            path.display()
        );
    }

    if let Some(dir) = bin_dir {
        let candidate = dir.join(exe_name(name));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    which::which(name).map_err(|_| ToolsError::NotFound {
        tool: name.to_string(),
    })
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// First line of `<ffmpeg> -version`, if the binary runs.
pub fn version_line(ffmpeg: &Path) -> Option<String> {
    let output = Command::new(ffmpeg).arg("-version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|line| line.trim().to_string())
}
