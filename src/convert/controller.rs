//! Conversion job controller.
//!
//! Owns the full lifecycle of one conversion: validation, probing, launch,
//! progress parsing, pause/resume, cancellation with cleanup, exit
//! interpretation, and output validation. Every failure is recovered here;
//! a job can never take the process down or disturb another job.

use crate::context::AppContext;
use crate::convert::command;
use crate::convert::process;
use crate::convert::progress::ProgressTracker;
use crate::encoder::EncoderId;
use crate::error::JobError;
use crate::events::UiSink;
use crate::probe::{self, MediaDescription};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lines of transcoder stderr retained for failure diagnostics.
const DIAGNOSTIC_TAIL_LINES: usize = 10;

/// How long a cancelled child gets to exit before it is killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Job state machine. `Completed`, `Failed` and `Cancelled` are terminal;
/// a rejected input never leaves `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Probing,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

/// Why an input was rejected before the job started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAvi,
    Missing,
}

/// Terminal result of one conversion job.
#[derive(Debug)]
pub enum JobOutcome {
    /// Input rejected up front; informational, not an error.
    Skipped(SkipReason),
    Completed,
    Failed(JobError),
    Cancelled,
}

/// One file's conversion attempt.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: Uuid,
    pub input: PathBuf,
    /// Output directory joined with the input basename, `.mp4` extension.
    pub output: PathBuf,
    pub encoder: EncoderId,
    pub state: JobState,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct ControlInner {
    pause_requested: bool,
    cancel_requested: bool,
    child_pid: Option<u32>,
}

/// Pause/cancel flags shared between a controller and its handle.
///
/// Owned exclusively by one job; no other job ever touches it.
pub(crate) struct ControlState {
    inner: Mutex<ControlInner>,
    cond: Condvar,
}

impl ControlState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(ControlInner::default()),
            cond: Condvar::new(),
        })
    }

    fn cancel_requested(&self) -> bool {
        self.inner.lock().cancel_requested
    }

    fn pause_requested(&self) -> bool {
        self.inner.lock().pause_requested
    }

    /// Block until resumed or cancelled; returns true if cancellation won.
    fn wait_while_paused(&self) -> bool {
        let mut inner = self.inner.lock();
        while inner.pause_requested && !inner.cancel_requested {
            self.cond.wait(&mut inner);
        }
        inner.cancel_requested
    }

    fn register_child(&self, pid: u32) {
        let mut inner = self.inner.lock();
        inner.child_pid = Some(pid);
        // A pause requested before launch applies to the child immediately.
        if inner.pause_requested {
            process::suspend(pid);
        }
    }

    fn clear_child(&self) {
        self.inner.lock().child_pid = None;
    }
}

/// Control surface for a dispatched job.
///
/// Pause and resume are best-effort process suspension plus a gate the
/// controller's read loop honors; cancel is polled by the loop, which then
/// performs the graceful-then-forced kill and cleanup itself.
pub struct JobHandle {
    id: Uuid,
    control: Arc<ControlState>,
    sink: Arc<dyn UiSink>,
    task: tokio::task::JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(
        id: Uuid,
        control: Arc<ControlState>,
        sink: Arc<dyn UiSink>,
        task: tokio::task::JoinHandle<JobOutcome>,
    ) -> Self {
        Self {
            id,
            control,
            sink,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_paused(&self) -> bool {
        self.control.pause_requested()
    }

    pub fn pause(&self) {
        let pid = {
            let mut inner = self.control.inner.lock();
            if inner.pause_requested || inner.cancel_requested {
                return;
            }
            inner.pause_requested = true;
            inner.child_pid
        };
        if let Some(pid) = pid {
            process::suspend(pid);
        }
        self.control.cond.notify_all();
        info!(job = %self.id, "pause requested");
        self.sink.on_pause_state_changed(true);
        self.sink.on_status("Paused");
    }

    pub fn resume(&self) {
        let pid = {
            let mut inner = self.control.inner.lock();
            if !inner.pause_requested || inner.cancel_requested {
                return;
            }
            inner.pause_requested = false;
            inner.child_pid
        };
        if let Some(pid) = pid {
            process::resume(pid);
        }
        self.control.cond.notify_all();
        info!(job = %self.id, "resumed");
        self.sink.on_pause_state_changed(false);
    }

    pub fn cancel(&self) {
        let stopped_pid = {
            let mut inner = self.control.inner.lock();
            if inner.cancel_requested {
                return;
            }
            inner.cancel_requested = true;
            // A stopped child never produces the line the reader is blocked
            // on; continue it so the loop can observe the cancellation.
            if inner.pause_requested {
                inner.child_pid
            } else {
                None
            }
        };
        if let Some(pid) = stopped_pid {
            process::resume(pid);
        }
        self.control.cond.notify_all();
        info!(job = %self.id, "cancellation requested");
    }

    /// Wait for the job's terminal outcome.
    pub async fn wait(self) -> Result<JobOutcome, tokio::task::JoinError> {
        self.task.await
    }
}

enum LoopExit {
    Finished(std::io::Result<std::process::ExitStatus>),
    Cancelled,
    ReadError(std::io::Error),
}

pub struct JobController {
    ctx: Arc<AppContext>,
    sink: Arc<dyn UiSink>,
    control: Arc<ControlState>,
    job: ConversionJob,
    requested_encoder: String,
    partial_removed: bool,
}

impl JobController {
    /// Build a controller for one input file. The output directory and the
    /// preferred encoder are read from settings here, once, at job start.
    pub fn new(ctx: Arc<AppContext>, input: PathBuf, sink: Arc<dyn UiSink>) -> Self {
        let requested_encoder = ctx.settings.preferred_encoder();
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let output = ctx.settings.output_dir().join(format!("{stem}.mp4"));
        let encoder = requested_encoder
            .parse()
            .unwrap_or_else(|_| ctx.encoders.best_available());

        Self {
            job: ConversionJob {
                id: Uuid::new_v4(),
                input,
                output,
                encoder,
                state: JobState::Idle,
                started_at: Utc::now(),
            },
            requested_encoder,
            partial_removed: false,
            control: ControlState::new(),
            ctx,
            sink,
        }
    }

    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn input(&self) -> &Path {
        &self.job.input
    }

    pub(crate) fn control(&self) -> Arc<ControlState> {
        Arc::clone(&self.control)
    }

    /// Run the job to its terminal state.
    ///
    /// Failures are fully recovered at this boundary and delivered through
    /// the sink; exactly one terminal status is emitted per job.
    pub fn run(mut self) -> JobOutcome {
        let outcome = self.execute();
        self.finish(outcome)
    }

    fn execute(&mut self) -> JobOutcome {
        // Wrong extension and missing input are informational skips, not
        // failures; the job never reaches `Probing`.
        if !has_avi_extension(&self.job.input) {
            return JobOutcome::Skipped(SkipReason::NotAvi);
        }
        if !self.job.input.is_file() {
            return JobOutcome::Skipped(SkipReason::Missing);
        }

        self.job.state = JobState::Probing;
        let description = match probe::inspect(&self.ctx.tools.ffprobe, &self.job.input) {
            Ok(description) => description,
            Err(e) => return JobOutcome::Failed(e.into()),
        };

        // An unconfirmed encoder preference is remapped, not fatal.
        let encoder = match self.requested_encoder.parse::<EncoderId>() {
            Ok(id) if self.ctx.encoders.contains(id) => id,
            _ => {
                let fallback = self.ctx.encoders.best_available();
                warn!(
                    job = %self.job.id,
                    requested = %self.requested_encoder,
                    fallback = %fallback,
                    "preferred encoder unavailable; switching"
                );
                self.sink.on_log(&format!(
                    "Encoder {} unavailable; using {}",
                    self.requested_encoder, fallback
                ));
                fallback
            }
        };
        self.job.encoder = encoder;

        if let Err(e) = std::fs::create_dir_all(
            self.job.output.parent().unwrap_or_else(|| Path::new(".")),
        ) {
            return JobOutcome::Failed(JobError::Io(e));
        }

        let input_name = self
            .job
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.job.input.display().to_string());
        self.sink.on_log(&format!("Input: {input_name}"));
        self.sink.on_status("Working...");

        let args = command::build_args(
            &self.job.input,
            &self.job.output,
            &description,
            encoder,
            &self.ctx.encoders,
        );
        debug!(job = %self.job.id, ?args, "transcoder command");

        if command::stream_copy_eligible(&description, encoder) {
            self.sink.on_log("Video: stream copy");
        } else {
            self.sink.on_log(&format!("Video: {encoder}"));
        }

        self.job.state = JobState::Running;
        self.convert(&args, &description)
    }

    fn convert(&mut self, args: &[String], description: &MediaDescription) -> JobOutcome {
        if self.control.cancel_requested() {
            return JobOutcome::Cancelled;
        }

        let mut child = match Command::new(&self.ctx.tools.ffmpeg)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return JobOutcome::Failed(JobError::launch("ffmpeg", e)),
        };

        self.control.register_child(child.id());

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            process::terminate(&mut child, TERMINATE_GRACE);
            self.control.clear_child();
            return JobOutcome::Failed(JobError::launch(
                "ffmpeg",
                std::io::Error::other("transcoder pipes unavailable"),
            ));
        };

        // The drain keeps the child from blocking on a full stderr pipe and
        // bounds memory to the most recent lines.
        let tail: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let drain = std::thread::spawn({
            let tail = Arc::clone(&tail);
            move || drain_stderr(stderr, &tail)
        });

        let exit = self.event_loop(&mut child, stdout, description);

        // The child is reaped on every path; kill it if it is still running,
        // then let the drain finish so the diagnostic tail is complete
        // before the exit is interpreted.
        if !matches!(exit, LoopExit::Finished(_)) {
            process::terminate(&mut child, TERMINATE_GRACE);
        }
        let _ = drain.join();
        self.control.clear_child();

        match exit {
            LoopExit::Cancelled => {
                self.remove_output();
                JobOutcome::Cancelled
            }
            LoopExit::ReadError(e) => {
                self.remove_output();
                JobOutcome::Failed(JobError::Progress(e))
            }
            LoopExit::Finished(Err(e)) => {
                self.remove_output();
                JobOutcome::Failed(JobError::Io(e))
            }
            LoopExit::Finished(Ok(status)) => {
                if self.control.cancel_requested() {
                    // Cancellation raced the child's exit; honor it.
                    self.remove_output();
                    JobOutcome::Cancelled
                } else if !status.success() {
                    let diagnostics = tail.lock().iter().cloned().collect();
                    self.remove_output();
                    JobOutcome::Failed(JobError::Runtime {
                        code: status.code(),
                        diagnostics,
                    })
                } else if !output_nonempty(&self.job.output) {
                    self.remove_output();
                    JobOutcome::Failed(JobError::OutputInvalid {
                        path: self.job.output.clone(),
                    })
                } else {
                    JobOutcome::Completed
                }
            }
        }
    }

    fn event_loop(
        &mut self,
        child: &mut Child,
        stdout: ChildStdout,
        description: &MediaDescription,
    ) -> LoopExit {
        let reader = BufReader::new(stdout);
        let mut tracker = ProgressTracker::new(description.duration_secs, self.job.output.clone());

        for line in reader.lines() {
            // Cancellation outranks pause: checked first, every iteration.
            if self.control.cancel_requested() {
                return LoopExit::Cancelled;
            }
            if self.control.pause_requested() {
                self.job.state = JobState::Paused;
                let cancelled = self.control.wait_while_paused();
                self.job.state = JobState::Running;
                if cancelled {
                    return LoopExit::Cancelled;
                }
            }

            let line = match line {
                Ok(line) => line,
                Err(e) => return LoopExit::ReadError(e),
            };

            if let Some(update) = tracker.observe(&line) {
                self.sink.on_progress(update.percent);
                self.sink.on_status(&update.status_line());
            }
        }

        // Progress stream closed: the child is exiting.
        LoopExit::Finished(child.wait())
    }

    /// Best-effort removal of the output artifact. Partial files never
    /// outlive a failed or cancelled job.
    fn remove_output(&mut self) {
        match std::fs::remove_file(&self.job.output) {
            Ok(()) => {
                debug!(job = %self.job.id, "removed output {}", self.job.output.display());
                self.partial_removed = true;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    job = %self.job.id,
                    "could not delete output {}: {}",
                    self.job.output.display(),
                    e
                );
            }
        }
    }

    fn finish(&mut self, outcome: JobOutcome) -> JobOutcome {
        match &outcome {
            JobOutcome::Skipped(reason) => {
                self.job.state = JobState::Idle;
                let line = match reason {
                    SkipReason::NotAvi => {
                        format!("Skipped (not AVI): {}", self.job.input.display())
                    }
                    SkipReason::Missing => format!("Missing file: {}", self.job.input.display()),
                };
                info!(job = %self.job.id, "{line}");
                self.sink.on_log(&line);
            }
            JobOutcome::Completed => {
                self.job.state = JobState::Completed;
                self.sink.on_progress(100.0);
                self.sink.on_log(&format!("Output: {}", self.job.output.display()));
                self.sink.on_status("Done");
                info!(
                    job = %self.job.id,
                    output = %self.job.output.display(),
                    "conversion completed"
                );
            }
            JobOutcome::Failed(error) => {
                self.job.state = JobState::Failed;
                self.sink.on_log(&format!("Conversion failed: {error}"));
                if let JobError::Runtime { diagnostics, .. } = error {
                    if !diagnostics.is_empty() {
                        self.sink
                            .on_log(&format!("Last stderr:\n{}", diagnostics.join("\n")));
                    }
                }
                self.sink.on_status("Failed");
                warn!(job = %self.job.id, %error, "conversion failed");
            }
            JobOutcome::Cancelled => {
                self.job.state = JobState::Cancelled;
                let line = if self.partial_removed {
                    "Cancelled (partial output deleted)"
                } else {
                    "Cancelled"
                };
                self.sink.on_log(line);
                self.sink.on_status("Cancelled");
                info!(job = %self.job.id, "conversion cancelled");
            }
        }
        outcome
    }
}

fn has_avi_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avi"))
}

fn output_nonempty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn drain_stderr(stream: impl std::io::Read, tail: &Mutex<VecDeque<String>>) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        let line = line.trim_end().to_string();
        if line.is_empty() {
            continue;
        }
        debug!("transcoder stderr: {}", line);
        push_tail(&mut tail.lock(), line);
    }
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == DIAGNOSTIC_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}
