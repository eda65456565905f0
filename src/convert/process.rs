//! Child-process control: suspend/continue and graceful shutdown.
//!
//! Suspension is best-effort. On unix the child is stopped with SIGSTOP so it
//! releases CPU/GPU while paused; elsewhere these are no-ops and pause only
//! stalls the progress loop.

use std::process::Child;
use std::time::{Duration, Instant};
use tracing::debug;

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        debug!("failed to send {} to pid {}: {}", signal, pid, e);
    }
}

/// Suspend a running child process.
pub fn suspend(pid: u32) {
    #[cfg(unix)]
    send_signal(pid, nix::sys::signal::Signal::SIGSTOP);
    #[cfg(not(unix))]
    let _ = pid;
}

/// Continue a suspended child process.
pub fn resume(pid: u32) {
    #[cfg(unix)]
    send_signal(pid, nix::sys::signal::Signal::SIGCONT);
    #[cfg(not(unix))]
    let _ = pid;
}

/// Ask the child to exit, escalating to a hard kill after `grace`.
///
/// A stopped child cannot act on a termination request, so it is continued
/// first. The child is always reaped before returning.
pub fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        resume(child.id());
        send_signal(child.id(), nix::sys::signal::Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }

    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!("child exited after termination request: {}", status);
                return;
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                debug!("try_wait failed during termination: {}", e);
                break;
            }
        }
    }

    debug!("child did not exit within {:?}; killing", grace);
    let _ = child.kill();
    let _ = child.wait();
}
