//! Process-wide application context.
//!
//! Everything jobs share is resolved once at startup and passed around
//! explicitly; there are no ambient globals. Tool paths and the encoder
//! registry are read-only after construction, so jobs share them without
//! locking.

use crate::config::SettingsStore;
use crate::encoder::EncoderRegistry;
use crate::tools::{self, ToolLocations, ToolPaths, ToolsError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct AppContext {
    pub tools: ToolPaths,
    pub encoders: EncoderRegistry,
    pub settings: SettingsStore,
}

/// Startup options for [`AppContext::initialize`].
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Backing file for the settings store.
    pub settings_path: PathBuf,
    /// Where to look for ffmpeg/ffprobe.
    pub tool_locations: ToolLocations,
}

impl AppContext {
    /// Resolve tools, detect encoders, and load settings.
    ///
    /// Missing binaries are the one startup failure the shell must handle
    /// itself (acquire them or abort the process).
    pub fn initialize(options: ContextOptions) -> Result<Arc<Self>, ToolsError> {
        let tools = tools::resolve(&options.tool_locations)?;
        info!(
            ffmpeg = %tools.ffmpeg.display(),
            ffprobe = %tools.ffprobe.display(),
            version = tools.version_line.as_deref().unwrap_or("unknown"),
            "tools resolved"
        );

        let encoders = EncoderRegistry::detect(Some(&tools.ffmpeg));
        let settings = SettingsStore::open(options.settings_path);

        Ok(Arc::new(Self {
            tools,
            encoders,
            settings,
        }))
    }

    /// Assemble a context from already-built parts.
    pub fn new(tools: ToolPaths, encoders: EncoderRegistry, settings: SettingsStore) -> Arc<Self> {
        Arc::new(Self {
            tools,
            encoders,
            settings,
        })
    }
}
