//! Fire-and-forget job dispatch.
//!
//! One blocking task per requested file; jobs are independent and
//! uncoordinated. This is dispatch, not scheduling: no queue, no
//! prioritization, no admission control.

use crate::context::AppContext;
use crate::convert::controller::{JobController, JobHandle};
use crate::events::UiSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct JobSupervisor {
    ctx: Arc<AppContext>,
}

impl JobSupervisor {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Spawn a controller for one input file on its own blocking task and
    /// return the handle used to pause, resume, or cancel it.
    pub fn spawn(&self, input: impl Into<PathBuf>, sink: Arc<dyn UiSink>) -> JobHandle {
        let controller = JobController::new(Arc::clone(&self.ctx), input.into(), Arc::clone(&sink));
        let id = controller.id();
        let control = controller.control();
        info!(job = %id, input = %controller.input().display(), "job dispatched");

        let task = tokio::task::spawn_blocking(move || controller.run());
        JobHandle::new(id, control, sink, task)
    }
}
