/*!
 * Two-phase card pipeline.
 *
 * A run goes through two phases:
 * 1. **Translation**: items are translated one at a time, in source order
 * 2. **Processing**: audio synthesis and card assembly fan out under a
 *    bounded concurrency limit
 *
 * Progress flows to a single consumer over a bounded channel. The consumer
 * restores source order with a `ReorderBuffer`. A run can be aborted at any
 * time through its `CancellationController`.
 */

use std::time::Duration;

pub mod cancel;
pub mod events;
pub mod item;
pub mod limiter;
pub mod orchestrator;
pub mod progress;

pub use cancel::CancellationController;
pub use events::{Phase, ProgressEvent};
pub use item::{Item, ItemStatus};
pub use limiter::{ConcurrencyLimiter, LimiterSlot};
pub use orchestrator::{Pipeline, PipelinePhase, PipelineState, RunHandle, RunReport};
pub use progress::{ProgressObserver, ProgressReceiver, ProgressSender, ReorderBuffer};

/// Identifies one run; media files are tracked per run
pub type RunId = uuid::Uuid;

/// Tuning knobs for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Maximum number of processing tasks in flight
    pub concurrency: usize,

    /// Whether cards get synthesized audio
    pub audio_enabled: bool,

    /// Capacity of the progress channel
    pub channel_capacity: usize,

    /// How long dispatched tasks may keep running after an abort
    pub abort_grace: Duration,

    /// How long a producer waits for room in a full progress buffer
    pub stall_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            audio_enabled: true,
            channel_capacity: 64,
            abort_grace: Duration::from_secs(2),
            stall_timeout: Duration::from_millis(500),
        }
    }
}

impl PipelineOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_audio(mut self, enabled: bool) -> Self {
        self.audio_enabled = enabled;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}
