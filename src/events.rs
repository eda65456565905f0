//! Job status delivery to the presentation layer.
//!
//! Jobs never call into the presentation layer directly; they post through a
//! [`UiSink`], whose methods are fire-and-forget and safe to invoke from any
//! job's thread. The channel-backed implementation feeds a single consumer
//! loop on the presentation side.

use std::sync::Arc;
use tokio::sync::mpsc;

/// Sink for job status updates.
///
/// Implementations must be cheap and non-blocking; a job thread must never
/// wait on the presentation layer.
pub trait UiSink: Send + Sync {
    fn on_log(&self, line: &str);
    fn on_status(&self, status: &str);
    fn on_progress(&self, percent: f64);
    fn on_pause_state_changed(&self, paused: bool);
}

/// Event form of the sink calls, for channel-based consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Log(String),
    Status(String),
    Progress(f64),
    PauseStateChanged(bool),
}

/// [`UiSink`] that posts events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSink {
    /// Create the sink together with the receiving end for the presentation
    /// loop.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn post(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("no consumer for ui event");
        }
    }
}

impl UiSink for ChannelSink {
    fn on_log(&self, line: &str) {
        self.post(UiEvent::Log(line.to_string()));
    }

    fn on_status(&self, status: &str) {
        self.post(UiEvent::Status(status.to_string()));
    }

    fn on_progress(&self, percent: f64) {
        self.post(UiEvent::Progress(percent));
    }

    fn on_pause_state_changed(&self, paused: bool) {
        self.post(UiEvent::PauseStateChanged(paused));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sink, mut rx) = ChannelSink::new();

        sink.on_status("Working...");
        sink.on_progress(12.5);
        sink.on_log("Input: movie.avi");
        sink.on_pause_state_changed(true);

        assert_eq!(rx.recv().await, Some(UiEvent::Status("Working...".into())));
        assert_eq!(rx.recv().await, Some(UiEvent::Progress(12.5)));
        assert_eq!(rx.recv().await, Some(UiEvent::Log("Input: movie.avi".into())));
        assert_eq!(rx.recv().await, Some(UiEvent::PauseStateChanged(true)));
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_progress(50.0);
    }
}
