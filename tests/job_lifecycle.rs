//! Job lifecycle integration tests.
//!
//! Drive the controller end-to-end against scripted stand-ins for ffmpeg and
//! ffprobe, verifying the state machine's terminal outcomes, progress
//! ordering, cancellation cleanup, and pause semantics.

#![cfg(unix)]

use assert_matches::assert_matches;
use aviconv::config::SettingsStore;
use aviconv::context::AppContext;
use aviconv::convert::{JobOutcome, JobSupervisor, SkipReason};
use aviconv::encoder::EncoderRegistry;
use aviconv::error::JobError;
use aviconv::events::{ChannelSink, UiEvent};
use aviconv::tools::ToolPaths;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

/// Probe stand-in reporting a 120 s h264/High/yuv420p file with aac audio.
const PROBE_OK: &str = r#"#!/bin/sh
touch @PROBE_MARKER@
cat <<'EOF'
{"format": {"duration": "120.0"}, "streams": [{"codec_type": "video", "codec_name": "h264", "profile": "High", "pix_fmt": "yuv420p"}, {"codec_type": "audio", "codec_name": "aac"}]}
EOF
"#;

/// Probe stand-in reporting a zero duration (unusable input).
const PROBE_ZERO_DURATION: &str = r#"#!/bin/sh
touch @PROBE_MARKER@
cat <<'EOF'
{"format": {"duration": "0"}, "streams": [{"codec_type": "video", "codec_name": "h264", "profile": "High", "pix_fmt": "yuv420p"}]}
EOF
"#;

/// Transcoder stand-in: reports progress, writes the output, exits cleanly.
const FFMPEG_OK: &str = r#"#!/bin/sh
touch @FFMPEG_MARKER@
printf '%s\n' "$@" > @ARG_FILE@
out=""
for a in "$@"; do out="$a"; done
printf 'out_time_ms=30000000\nprogress=continue\n'
printf 'data-data-data' > "$out"
printf 'out_time_ms=60000000\nprogress=continue\n'
printf 'out_time_ms=120000000\nprogress=end\n'
exit 0
"#;

/// Transcoder stand-in: fails mid-run with diagnostics on stderr.
const FFMPEG_FAILS: &str = r#"#!/bin/sh
touch @FFMPEG_MARKER@
printf 'out_time_ms=10000000\nprogress=continue\n'
echo "Error while decoding stream #0:0" >&2
echo "Conversion failed!" >&2
exit 3
"#;

/// Transcoder stand-in: exits zero but leaves an empty output file.
const FFMPEG_EMPTY_OUTPUT: &str = r#"#!/bin/sh
touch @FFMPEG_MARKER@
out=""
for a in "$@"; do out="$a"; done
: > "$out"
exit 0
"#;

/// Transcoder stand-in: emits progress every 50 ms for ~10 s, with a partial
/// output file on disk the whole time.
const FFMPEG_SLOW: &str = r#"#!/bin/sh
touch @FFMPEG_MARKER@
out=""
for a in "$@"; do out="$a"; done
printf 'partial' > "$out"
i=1
while [ "$i" -le 200 ]; do
  printf 'out_time_ms=%s\nprogress=continue\n' "${i}00000"
  i=$((i+1))
  sleep 0.05
done
exit 0
"#;

struct Fixture {
    dir: TempDir,
    ctx: Arc<AppContext>,
}

impl Fixture {
    fn new(ffmpeg_body: &str, ffprobe_body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();

        let probe_marker = dir.path().join("probe_invoked");
        let ffmpeg_marker = dir.path().join("ffmpeg_invoked");
        let arg_file = dir.path().join("ffmpeg_args");

        let ffmpeg = write_script(
            dir.path(),
            "ffmpeg",
            &ffmpeg_body
                .replace("@FFMPEG_MARKER@", &ffmpeg_marker.to_string_lossy())
                .replace("@ARG_FILE@", &arg_file.to_string_lossy()),
        );
        let ffprobe = write_script(
            dir.path(),
            "ffprobe",
            &ffprobe_body.replace("@PROBE_MARKER@", &probe_marker.to_string_lossy()),
        );

        let settings = SettingsStore::open(dir.path().join("settings.toml"));
        let out_dir = dir.path().join("out");
        settings
            .update(|s| s.output_dir = out_dir)
            .unwrap();

        let tools = ToolPaths {
            ffmpeg,
            ffprobe,
            version_line: None,
        };
        let ctx = AppContext::new(tools, EncoderRegistry::cpu_only(), settings);

        Self { dir, ctx }
    }

    fn input(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, b"RIFFxxxxAVI LIST").unwrap();
        path
    }

    fn output(&self, stem: &str) -> PathBuf {
        self.dir.path().join("out").join(format!("{stem}.mp4"))
    }

    fn probe_invoked(&self) -> bool {
        self.dir.path().join("probe_invoked").exists()
    }

    fn ffmpeg_invoked(&self) -> bool {
        self.dir.path().join("ffmpeg_invoked").exists()
    }

    fn ffmpeg_args(&self) -> String {
        fs::read_to_string(self.dir.path().join("ffmpeg_args")).unwrap_or_default()
    }

    fn supervisor(&self) -> JobSupervisor {
        JobSupervisor::new(Arc::clone(&self.ctx))
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn drain(rx: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn progress_values(events: &[UiEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

fn terminal_statuses(events: &[UiEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            UiEvent::Status(s) if matches!(s.as_str(), "Done" | "Failed" | "Cancelled") => {
                Some(s.as_str())
            }
            _ => None,
        })
        .collect()
}

async fn next_progress(rx: &mut UnboundedReceiver<UiEvent>) -> f64 {
    loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Some(UiEvent::Progress(p))) => return p,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("event channel closed before a progress event"),
            Err(_) => panic!("timed out waiting for a progress event"),
        }
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn copy_safe_input_completes_with_stream_copy() {
    let fixture = Fixture::new(FFMPEG_OK, PROBE_OK);
    let input = fixture.input("movie.avi");
    let (sink, mut rx) = ChannelSink::new();

    let handle = fixture.supervisor().spawn(input, sink);
    let outcome = handle.wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Completed);

    // Output present and nonzero.
    let output = fixture.output("movie");
    assert!(output.is_file());
    assert!(fs::metadata(&output).unwrap().len() > 0);

    // CPU + h264/High/yuv420p source selects stream copy for video and
    // passthrough for aac audio.
    let args = fixture.ffmpeg_args();
    assert!(args.contains("-c:v\ncopy"), "args were:\n{args}");
    assert!(args.contains("-c:a\ncopy"), "args were:\n{args}");
    assert!(args.contains("-movflags\n+faststart"), "args were:\n{args}");

    let events = drain(&mut rx);

    // Progress is monotone non-decreasing and reaches exactly 100.
    let progress = progress_values(&events);
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert_eq!(progress.last().copied(), Some(100.0));

    // Exactly one terminal status.
    assert_eq!(terminal_statuses(&events), vec!["Done"]);
}

#[tokio::test]
async fn concurrent_jobs_are_independent() {
    let fixture = Fixture::new(FFMPEG_OK, PROBE_OK);
    let first = fixture.input("first.avi");
    let second = fixture.input("second.avi");

    let supervisor = fixture.supervisor();
    let (sink_a, _rx_a) = ChannelSink::new();
    let (sink_b, _rx_b) = ChannelSink::new();

    let handle_a = supervisor.spawn(first, sink_a);
    let handle_b = supervisor.spawn(second, sink_b);

    assert_matches!(handle_a.wait().await.unwrap(), JobOutcome::Completed);
    assert_matches!(handle_b.wait().await.unwrap(), JobOutcome::Completed);

    assert!(fixture.output("first").is_file());
    assert!(fixture.output("second").is_file());
}

// ---------------------------------------------------------------------------
// Validation skips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_avi_input_is_skipped_without_probing() {
    let fixture = Fixture::new(FFMPEG_OK, PROBE_OK);
    let input = fixture.input("movie.mkv");
    let (sink, mut rx) = ChannelSink::new();

    let outcome = fixture.supervisor().spawn(input, sink).wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Skipped(SkipReason::NotAvi));

    assert!(!fixture.probe_invoked());
    assert!(!fixture.ffmpeg_invoked());

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::Log(l) if l.starts_with("Skipped (not AVI)"))));
    // A skip is informational; no terminal status is emitted.
    assert!(terminal_statuses(&events).is_empty());
}

#[tokio::test]
async fn missing_input_is_skipped() {
    let fixture = Fixture::new(FFMPEG_OK, PROBE_OK);
    let (sink, mut rx) = ChannelSink::new();

    let missing = fixture.dir.path().join("nope.avi");
    let outcome = fixture
        .supervisor()
        .spawn(missing, sink)
        .wait()
        .await
        .unwrap();
    assert_matches!(outcome, JobOutcome::Skipped(SkipReason::Missing));
    assert!(!fixture.probe_invoked());

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::Log(l) if l.starts_with("Missing file"))));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_duration_probe_fails_without_launching_transcoder() {
    let fixture = Fixture::new(FFMPEG_OK, PROBE_ZERO_DURATION);
    let input = fixture.input("movie.avi");
    let (sink, mut rx) = ChannelSink::new();

    let outcome = fixture.supervisor().spawn(input, sink).wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Failed(JobError::Inspection(_)));

    // The transcoder was never invoked and no artifact exists.
    assert!(fixture.probe_invoked());
    assert!(!fixture.ffmpeg_invoked());
    assert!(!fixture.output("movie").exists());

    assert_eq!(terminal_statuses(&drain(&mut rx)), vec!["Failed"]);
}

#[tokio::test]
async fn transcoder_failure_surfaces_diagnostic_tail() {
    let fixture = Fixture::new(FFMPEG_FAILS, PROBE_OK);
    let input = fixture.input("movie.avi");
    let (sink, mut rx) = ChannelSink::new();

    let outcome = fixture.supervisor().spawn(input, sink).wait().await.unwrap();
    let diagnostics = match outcome {
        JobOutcome::Failed(JobError::Runtime { code, diagnostics }) => {
            assert_eq!(code, Some(3));
            diagnostics
        }
        other => panic!("expected runtime failure, got {other:?}"),
    };
    assert!(diagnostics.iter().any(|l| l.contains("Conversion failed!")));

    assert!(!fixture.output("movie").exists());

    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, UiEvent::Log(l) if l.contains("Last stderr"))));
    assert_eq!(terminal_statuses(&events), vec!["Failed"]);
}

#[tokio::test]
async fn zero_exit_with_empty_output_is_a_failure() {
    let fixture = Fixture::new(FFMPEG_EMPTY_OUTPUT, PROBE_OK);
    let input = fixture.input("movie.avi");
    let (sink, mut rx) = ChannelSink::new();

    let outcome = fixture.supervisor().spawn(input, sink).wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Failed(JobError::OutputInvalid { .. }));

    // The empty stub is cleaned up too.
    assert!(!fixture.output("movie").exists());
    assert_eq!(terminal_statuses(&drain(&mut rx)), vec!["Failed"]);
}

#[tokio::test]
async fn unlaunchable_transcoder_is_a_launch_failure() {
    let fixture = Fixture::new(FFMPEG_OK, PROBE_OK);
    let input = fixture.input("movie.avi");

    // Break the resolved ffmpeg path after detection.
    fs::remove_file(&fixture.ctx.tools.ffmpeg).unwrap();

    let (sink, _rx) = ChannelSink::new();
    let outcome = fixture.supervisor().spawn(input, sink).wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Failed(JobError::Launch { .. }));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_removes_partial_output() {
    let fixture = Fixture::new(FFMPEG_SLOW, PROBE_OK);
    let input = fixture.input("movie.avi");
    let (sink, mut rx) = ChannelSink::new();

    let handle = fixture.supervisor().spawn(input, sink);

    // Let the job get genuinely underway first.
    next_progress(&mut rx).await;
    assert!(fixture.output("movie").is_file());

    handle.cancel();
    let outcome = handle.wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Cancelled);

    // No artifact survives a cancelled job.
    assert!(!fixture.output("movie").exists());
    assert_eq!(terminal_statuses(&drain(&mut rx)), vec!["Cancelled"]);
}

#[tokio::test]
async fn cancel_before_any_progress_still_cleans_up() {
    let fixture = Fixture::new(FFMPEG_SLOW, PROBE_OK);
    let input = fixture.input("movie.avi");
    let (sink, _rx) = ChannelSink::new();

    let handle = fixture.supervisor().spawn(input, sink);
    handle.cancel();
    let outcome = handle.wait().await.unwrap();

    assert_matches!(outcome, JobOutcome::Cancelled);
    assert!(!fixture.output("movie").exists());
}

// ---------------------------------------------------------------------------
// Pause / resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_stalls_progress_and_resume_restores_it() {
    let fixture = Fixture::new(FFMPEG_SLOW, PROBE_OK);
    let input = fixture.input("movie.avi");
    let (sink, mut rx) = ChannelSink::new();

    let handle = fixture.supervisor().spawn(input, sink);
    next_progress(&mut rx).await;

    handle.pause();
    assert!(handle.is_paused());

    // Give the loop time to reach the gate, then flush everything in flight.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let paused_events = drain(&mut rx);
    assert!(paused_events
        .iter()
        .any(|e| matches!(e, UiEvent::PauseStateChanged(true))));

    // While paused, no progress events arrive.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stalled = drain(&mut rx);
    assert!(
        progress_values(&stalled).is_empty(),
        "progress while paused: {stalled:?}"
    );

    handle.resume();
    assert!(!handle.is_paused());
    let resumed_value = next_progress(&mut rx).await;

    handle.cancel();
    let outcome = handle.wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Cancelled);

    // Progress after resume continues monotonically from before the pause.
    let remaining = drain(&mut rx);
    let mut all = vec![resumed_value];
    all.extend(progress_values(&remaining));
    assert!(all.windows(2).all(|w| w[0] <= w[1]), "{all:?}");
}

#[tokio::test]
async fn cancel_while_paused_terminates_the_job() {
    let fixture = Fixture::new(FFMPEG_SLOW, PROBE_OK);
    let input = fixture.input("movie.avi");
    let (sink, mut rx) = ChannelSink::new();

    let handle = fixture.supervisor().spawn(input, sink);
    next_progress(&mut rx).await;

    handle.pause();
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle.cancel();
    let outcome = handle.wait().await.unwrap();
    assert_matches!(outcome, JobOutcome::Cancelled);
    assert!(!fixture.output("movie").exists());
}
