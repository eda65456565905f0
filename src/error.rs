//! Error types for conversion jobs.

use std::path::PathBuf;

/// Errors that end a conversion job in the `Failed` state.
///
/// Validation problems (wrong extension, missing input) are not represented
/// here; they surface as a skip event and the job never starts.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// The probe step could not produce a usable description of the input.
    #[error("inspection failed: {0}")]
    Inspection(#[from] crate::probe::ProbeError),

    /// The transcoder process could not be started.
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The transcoder exited with a non-zero status.
    #[error("transcoder exited with status {code:?}")]
    Runtime {
        code: Option<i32>,
        /// Most recent diagnostic lines from the transcoder's error stream.
        diagnostics: Vec<String>,
    },

    /// The transcoder reported success but the output file is missing or empty.
    #[error("output missing or empty: {}", path.display())]
    OutputInvalid { path: PathBuf },

    /// Reading the transcoder's progress stream failed mid-job.
    #[error("progress stream error: {0}")]
    Progress(#[source] std::io::Error),

    /// Filesystem error outside the progress loop.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JobError {
    /// Create a launch failure for the named tool.
    pub fn launch(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::Launch {
            tool: tool.into(),
            source,
        }
    }
}
