use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User-facing settings, persisted as a small TOML file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Settings {
    /// Directory converted files are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Preferred encoder id ("CPU", "AMF", "NVENC", "QSV"). An id that
    /// detection did not confirm is remapped at job start.
    #[serde(default = "default_encoder")]
    pub encoder: String,

    /// Whether the shell shows the first-run notice.
    #[serde(default = "default_show_startup_notice")]
    pub show_startup_notice: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/Downloads").into_owned())
}

fn default_encoder() -> String {
    "CPU".to_string()
}

fn default_show_startup_notice() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            encoder: default_encoder(),
            show_startup_notice: default_show_startup_notice(),
        }
    }
}
