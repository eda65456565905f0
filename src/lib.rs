//! Aviconv - AVI to MP4 conversion engine
//!
//! Drives an external FFmpeg installation to convert AVI files to MP4:
//! media probing, encoder capability detection, transcode command
//! construction, and supervised conversion jobs with pause/resume/cancel
//! semantics. The graphical shell lives elsewhere and talks to this crate
//! through [`events::UiSink`] and [`config::SettingsStore`].

pub mod config;
pub mod context;
pub mod convert;
pub mod encoder;
pub mod error;
pub mod events;
pub mod logging;
pub mod probe;
pub mod tools;

pub use context::AppContext;
pub use convert::{JobHandle, JobOutcome, JobSupervisor};
pub use error::JobError;
