//! Media inspection via ffprobe.
//!
//! One probe per job, before the transcoder is ever launched. The result
//! drives stream-copy eligibility and percentage computation; an unusable
//! probe (non-zero exit, malformed JSON, zero duration) aborts the job.

use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// ffprobe could not be started.
    #[error("failed to run ffprobe: {0}")]
    Spawn(#[source] std::io::Error),

    /// ffprobe exited with a non-zero status.
    #[error("ffprobe exited with status {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    /// ffprobe output was not valid JSON.
    #[error("failed to parse ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    /// The container reported no usable duration.
    #[error("no usable duration in probe output")]
    UnusableDuration,
}

/// Normalized description of an input file, produced once per job.
///
/// String fields use the empty string for "unknown".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaDescription {
    /// Container duration in seconds, always > 0 for a successful probe.
    pub duration_secs: f64,
    pub video: VideoStream,
    /// Codec of the first audio stream, empty if none.
    pub audio_codec: String,
}

/// First video stream of the input; later video streams are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoStream {
    pub codec_name: String,
    pub profile: String,
    pub pix_fmt: String,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    profile: Option<String>,
    pix_fmt: Option<String>,
}

/// Probe a media file using ffprobe.
///
/// Single attempt; every failure mode maps to one terminal outcome for the
/// calling job.
pub fn inspect(ffprobe: &Path, file: &Path) -> Result<MediaDescription, ProbeError> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_name,codec_type,profile,pix_fmt",
            "-of",
            "json",
        ])
        .arg(file)
        .output()
        .map_err(ProbeError::Spawn)?;

    if !output.status.success() {
        return Err(ProbeError::Failed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    let description = normalize(parsed)?;

    debug!(
        duration = description.duration_secs,
        codec = %description.video.codec_name,
        profile = %description.video.profile,
        pix_fmt = %description.video.pix_fmt,
        audio = %description.audio_codec,
        "probed {}",
        file.display()
    );

    Ok(description)
}

fn normalize(output: FfprobeOutput) -> Result<MediaDescription, ProbeError> {
    let duration_secs = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    if duration_secs <= 0.0 {
        return Err(ProbeError::UnusableDuration);
    }

    let mut video: Option<VideoStream> = None;
    let mut audio_codec: Option<String> = None;

    for stream in output.streams {
        match stream.codec_type.as_deref() {
            Some("video") if video.is_none() => {
                video = Some(VideoStream {
                    codec_name: stream.codec_name.unwrap_or_default(),
                    profile: stream.profile.unwrap_or_default(),
                    pix_fmt: stream.pix_fmt.unwrap_or_default(),
                });
            }
            Some("audio") if audio_codec.is_none() => {
                audio_codec = Some(stream.codec_name.unwrap_or_default());
            }
            _ => {}
        }
    }

    Ok(MediaDescription {
        duration_secs,
        video: video.unwrap_or_default(),
        audio_codec: audio_codec.unwrap_or_default(),
    })
}
