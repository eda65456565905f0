//! Encoder capability detection.
//!
//! Each hardware family is confirmed by actually running a short synthetic
//! encode through the transcoder, not by listing compiled-in encoders.
//! Detection runs once at startup, before any job, and the resulting
//! registry is immutable for the life of the process.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::str::FromStr;
use tracing::{debug, info};

/// Stable identifier for a video encoder family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncoderId {
    /// Software fallback, always available.
    Cpu,
    Amf,
    Nvenc,
    Qsv,
}

/// Auto-selection preference order for the hardware families. Ties between
/// simultaneously present families resolve to whichever comes first here.
const HARDWARE_PREFERENCE: [EncoderId; 3] = [EncoderId::Amf, EncoderId::Nvenc, EncoderId::Qsv];

impl EncoderId {
    pub const fn as_str(self) -> &'static str {
        match self {
            EncoderId::Cpu => "CPU",
            EncoderId::Amf => "AMF",
            EncoderId::Nvenc => "NVENC",
            EncoderId::Qsv => "QSV",
        }
    }

    /// Underlying ffmpeg codec name.
    pub const fn codec(self) -> &'static str {
        match self {
            EncoderId::Cpu => "libx264",
            EncoderId::Amf => "h264_amf",
            EncoderId::Nvenc => "h264_nvenc",
            EncoderId::Qsv => "h264_qsv",
        }
    }

    pub const fn is_hardware(self) -> bool {
        !matches!(self, EncoderId::Cpu)
    }
}

impl fmt::Display for EncoderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown encoder id: {0}")]
pub struct UnknownEncoder(String);

impl FromStr for EncoderId {
    type Err = UnknownEncoder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CPU" => Ok(EncoderId::Cpu),
            "AMF" => Ok(EncoderId::Amf),
            "NVENC" => Ok(EncoderId::Nvenc),
            "QSV" => Ok(EncoderId::Qsv),
            _ => Err(UnknownEncoder(s.to_string())),
        }
    }
}

/// Immutable table of encoders confirmed usable on this machine.
#[derive(Debug, Clone)]
pub struct EncoderRegistry {
    available: BTreeMap<EncoderId, &'static str>,
}

impl EncoderRegistry {
    /// Registry holding only the software fallback.
    pub fn cpu_only() -> Self {
        Self::from_ids([])
    }

    /// Build a registry from a known set of ids. CPU is always included.
    pub fn from_ids(ids: impl IntoIterator<Item = EncoderId>) -> Self {
        let mut available = BTreeMap::new();
        available.insert(EncoderId::Cpu, EncoderId::Cpu.codec());
        for id in ids {
            available.insert(id, id.codec());
        }
        Self { available }
    }

    /// Probe the hardware families with short test encodes.
    ///
    /// With no transcoder available the registry is CPU-only; encode attempts
    /// using it will then fail at launch time rather than here.
    pub fn detect(ffmpeg: Option<&Path>) -> Self {
        let Some(ffmpeg) = ffmpeg else {
            info!("transcoder unavailable; encoder registry is CPU-only");
            return Self::cpu_only();
        };

        let detected = HARDWARE_PREFERENCE
            .into_iter()
            .filter(|id| test_encoder(ffmpeg, *id))
            .collect::<Vec<_>>();

        let registry = Self::from_ids(detected);
        info!(
            encoders = ?registry.available.keys().map(|id| id.as_str()).collect::<Vec<_>>(),
            "encoder detection complete"
        );
        registry
    }

    pub fn contains(&self, id: EncoderId) -> bool {
        self.available.contains_key(&id)
    }

    /// Codec name for an available encoder.
    pub fn codec(&self, id: EncoderId) -> Option<&'static str> {
        self.available.get(&id).copied()
    }

    /// Deterministic auto-selection: AMF, NVENC, QSV, then CPU.
    pub fn best_available(&self) -> EncoderId {
        HARDWARE_PREFERENCE
            .into_iter()
            .find(|id| self.contains(*id))
            .unwrap_or(EncoderId::Cpu)
    }

    /// Available ids in stable order.
    pub fn ids(&self) -> impl Iterator<Item = EncoderId> + '_ {
        self.available.keys().copied()
    }
}

/// Run one short synthetic encode to confirm the encoder initializes.
///
/// Pixel-format handling differs per family: AMF and QSV want an explicit
/// NV12 conversion stage, NVENC accepts yuv420p directly.
fn test_encoder(ffmpeg: &Path, id: EncoderId) -> bool {
    let size = if id == EncoderId::Nvenc {
        "256x144"
    } else {
        "128x72"
    };

    let synthetic_input = format!("testsrc=size={size}:rate=30");
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error"])
        .args(["-f", "lavfi", "-i", synthetic_input.as_str()])
        .args(["-t", "0.2", "-an"]);

    match id {
        EncoderId::Amf | EncoderId::Qsv => {
            cmd.args(["-vf", "format=nv12", "-pix_fmt", "nv12"]);
        }
        EncoderId::Nvenc => {
            cmd.args(["-pix_fmt", "yuv420p"]);
        }
        EncoderId::Cpu => {
            cmd.args(["-vf", "format=yuv420p", "-pix_fmt", "yuv420p"]);
        }
    }

    cmd.args(["-c:v", id.codec(), "-f", "null", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    match cmd.output() {
        Ok(output) if output.status.success() => {
            debug!("test encoder {}: available", id);
            true
        }
        Ok(output) => {
            debug!(
                "test encoder {}: unavailable ({})",
                id,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Err(e) => {
            debug!("test encoder {}: failed to run: {}", id, e);
            false
        }
    }
}
