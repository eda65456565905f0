//! Conversion job control.
//!
//! [`JobController`] owns the process lifecycle for one conversion;
//! [`JobSupervisor`] dispatches one controller per requested file. Command
//! construction lives in [`command`] and is pure.

pub mod command;
mod controller;
mod process;
mod progress;
mod supervisor;

pub use controller::{
    ConversionJob, JobController, JobHandle, JobOutcome, JobState, SkipReason,
};
pub use progress::ProgressUpdate;
pub use supervisor::JobSupervisor;
