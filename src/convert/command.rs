//! Transcode command construction.
//!
//! Pure argument assembly; nothing here touches the filesystem or spawns a
//! process. Quality targets are a static per-encoder table approximating the
//! same visual quality index across rate-control vocabularies.

use crate::encoder::{EncoderId, EncoderRegistry};
use crate::probe::MediaDescription;
use std::path::Path;

/// Target video codec for MP4 output.
pub const TARGET_VIDEO_CODEC: &str = "h264";
/// Target pixel format.
pub const TARGET_PIX_FMT: &str = "yuv420p";
/// Profiles safe to carry over without re-encoding.
pub const COPY_SAFE_PROFILES: [&str; 3] = ["Baseline", "Main", "High"];
/// Audio codecs MP4 players handle without re-encoding.
pub const PASSTHROUGH_AUDIO: [&str; 2] = ["aac", "mp3"];
/// Bitrate used when audio has to be re-encoded.
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// True when the video stream can be copied into the MP4 container as-is.
///
/// Only the software path may stream-copy; a hardware selection always
/// re-encodes so the user's choice of encoder is honored.
pub fn stream_copy_eligible(description: &MediaDescription, encoder: EncoderId) -> bool {
    encoder == EncoderId::Cpu
        && description.video.codec_name == TARGET_VIDEO_CODEC
        && description.video.pix_fmt == TARGET_PIX_FMT
        && COPY_SAFE_PROFILES.contains(&description.video.profile.as_str())
}

/// True when the source audio can pass through untouched.
pub fn audio_passthrough(description: &MediaDescription) -> bool {
    PASSTHROUGH_AUDIO.contains(&description.audio_codec.as_str())
}

/// Build the transcoder argument list for one conversion.
///
/// Always requests machine-parsable progress on stdout, suppresses the
/// human stats line, overwrites any pre-existing output, and moves the moov
/// atom up front so the result is ready for progressive playback.
pub fn build_args(
    input: &Path,
    output: &Path,
    description: &MediaDescription,
    encoder: EncoderId,
    registry: &EncoderRegistry,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
    ];

    if stream_copy_eligible(description, encoder) {
        args.extend(["-c:v".into(), "copy".into()]);
    } else {
        let codec = registry
            .codec(encoder)
            .unwrap_or_else(|| EncoderId::Cpu.codec());

        args.extend([
            "-c:v".into(),
            codec.into(),
            "-pix_fmt".into(),
            TARGET_PIX_FMT.into(),
            "-profile:v".into(),
            "high".into(),
            "-level".into(),
            "4.1".into(),
        ]);

        // Each family exposes constant-quality through a different knob; the
        // numeric targets are tuned to land near the same visual quality.
        let quality: &[&str] = match encoder {
            EncoderId::Cpu => &["-preset", "medium", "-crf", "18"],
            EncoderId::Amf => &["-rc", "cqp", "-qp_i", "18", "-qp_p", "18", "-qp_b", "18"],
            EncoderId::Nvenc => &["-rc", "vbr", "-cq", "18", "-b:v", "0"],
            EncoderId::Qsv => &["-global_quality", "18"],
        };
        args.extend(quality.iter().map(|s| s.to_string()));
    }

    if audio_passthrough(description) {
        args.extend(["-c:a".into(), "copy".into()]);
    } else {
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            DEFAULT_AUDIO_BITRATE.into(),
        ]);
    }

    args.extend([
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]);

    args
}
