/*!
 * Pipeline orchestrator for one card run.
 *
 * The orchestrator owns everything a run needs and sequences it:
 * 1. Source materialization on a blocking thread
 * 2. Translation phase, strictly sequential
 * 3. Processing phase, fanned out under the concurrency limiter
 *
 * A run ends in exactly one of `Completed`, `Aborted` or `Failed`, and the
 * consumer sees the matching terminal event (`Done`, `Aborted`, `Error`).
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use uuid::Uuid;

use super::cancel::CancellationController;
use super::events::{Phase, ProgressEvent};
use super::item::{Item, ItemStatus};
use super::limiter::ConcurrencyLimiter;
use super::progress::{self, ProgressObserver, ProgressReceiver, ProgressSender};
use super::{PipelineOptions, RunId};
use crate::deck::{CardSink, MediaStore};
use crate::errors::PipelineError;
use crate::providers::{Synthesizer, Translator};
use crate::source::{SourceFilter, SourceIterator, SourceProvider};

/// Lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelinePhase {
    #[default]
    Idle,
    Translating,
    Processing,
    Completed,
    Aborted,
    Failed,
}

impl PipelinePhase {
    /// Whether the run is over
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelinePhase::Completed | PipelinePhase::Aborted | PipelinePhase::Failed
        )
    }

    /// Whether moving to `next` is allowed
    pub fn can_transition_to(&self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;

        match (*self, next) {
            (from, _) if from.is_terminal() => false,
            // fatal errors end a run from anywhere
            (_, Failed) => true,
            (Idle, Translating)
            | (Translating, Processing)
            | (Translating, Aborted)
            | (Processing, Completed)
            | (Processing, Aborted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Idle => "Idle",
            PipelinePhase::Translating => "Translating",
            PipelinePhase::Processing => "Processing",
            PipelinePhase::Completed => "Completed",
            PipelinePhase::Aborted => "Aborted",
            PipelinePhase::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Phase of a run with validated transitions
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    phase: PipelinePhase,
}

impl PipelineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition(&mut self, next: PipelinePhase) -> Result<(), PipelineError> {
        if !self.phase.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Pipeline {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}

/// Outcome of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    /// Terminal phase the run ended in
    pub phase: PipelinePhase,
    /// Number of items the source produced
    pub total: usize,
    /// Items that got past the source, sorted by index
    pub items: Vec<Item>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.phase == PipelinePhase::Completed
    }

    /// Items whose card made it into the sink
    pub fn processed(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Processed)
            .count()
    }

    /// Processed items that carry audio
    pub fn with_audio(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Processed && item.has_audio())
            .count()
    }
}

/// Handle to a running pipeline
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    events: ProgressReceiver,
    controller: CancellationController,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Progress stream of this run
    pub fn events(&mut self) -> &mut ProgressReceiver {
        &mut self.events
    }

    /// Ask the run to stop. Safe to call any number of times.
    pub fn request_abort(&self) {
        self.controller.request_abort();
    }

    /// Controller to abort the run from elsewhere (e.g. a signal handler)
    pub fn abort_controller(&self) -> CancellationController {
        self.controller.clone()
    }

    /// Whether the run has reached a terminal phase and its task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to end.
    ///
    /// Events not consumed yet are dropped together with the receiver.
    pub async fn wait(self) -> Result<RunReport, PipelineError> {
        let RunHandle { events, task, .. } = self;
        drop(events);
        task.await.map_err(|e| PipelineError::Task(e.to_string()))
    }

    /// Deliver every event in source order to `observer`, then wait for the run
    pub async fn observe_and_wait<O: ProgressObserver + ?Sized>(
        mut self,
        observer: &mut O,
    ) -> Result<RunReport, PipelineError> {
        if self.events.observe(observer).await.is_none() {
            warn!("Progress stream of run {} closed without a terminal event", self.run_id);
        }
        self.wait().await
    }
}

/// Capabilities and settings a run is built from
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn SourceProvider>,
    translator: Arc<dyn Translator>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    sink: Arc<dyn CardSink>,
    media: Arc<dyn MediaStore>,
    options: PipelineOptions,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("translator", &self.translator)
            .field("synthesizer", &self.synthesizer)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline without audio synthesis
    pub fn new(
        source: Arc<dyn SourceProvider>,
        translator: Arc<dyn Translator>,
        sink: Arc<dyn CardSink>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            source,
            translator,
            synthesizer: None,
            sink,
            media,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Start a run on the tokio runtime.
    ///
    /// Must be called from within a runtime. Undrained events fill the
    /// progress buffer and then slow each send down to the stall timeout,
    /// so a handle nobody reads from delays the run but never stops it.
    pub fn start(&self, filter: SourceFilter) -> RunHandle {
        let run_id = Uuid::new_v4();
        let controller = CancellationController::new();
        let (sender, events) = progress::channel(
            self.options.channel_capacity,
            self.options.stall_timeout,
            controller.clone(),
        );

        let run = Run {
            pipeline: self.clone(),
            run_id,
            controller: controller.clone(),
            progress: sender,
            state: PipelineState::new(),
        };
        let task = tokio::spawn(run.execute(filter));

        RunHandle {
            run_id,
            events,
            controller,
            task,
        }
    }
}

/// Everything one run owns while it executes
struct Run {
    pipeline: Pipeline,
    run_id: RunId,
    controller: CancellationController,
    progress: ProgressSender,
    state: PipelineState,
}

impl Run {
    async fn execute(mut self, filter: SourceFilter) -> RunReport {
        info!("Starting run {}", self.run_id);
        self.advance(PipelinePhase::Translating);

        let source = self.pipeline.source.clone();
        let iter = match tokio::task::spawn_blocking(move || source.iterate(&filter)).await {
            Ok(Ok(iter)) => iter,
            Ok(Err(e)) => return self.fail(e.into(), 0, Vec::new()).await,
            Err(e) => return self.fail(PipelineError::Task(e.to_string()), 0, Vec::new()).await,
        };

        let total = iter.total();
        if total == 0 {
            self.progress.emit(ProgressEvent::Total { count: 0 }).await;
        }

        let items = self.translate_phase(iter).await;
        if !self.controller.is_running() {
            return self.abort(total, items).await;
        }

        if total > 0 {
            self.progress
                .emit(ProgressEvent::PhaseComplete {
                    phase: Phase::Translation,
                })
                .await;
        }
        self.advance(PipelinePhase::Processing);

        let (items, fatal) = self.process_phase(items, total).await;
        if let Some(error) = fatal {
            return self.fail(error, total, items).await;
        }
        if !self.controller.is_running() {
            return self.abort(total, items).await;
        }

        self.advance(PipelinePhase::Completed);
        self.progress.emit(ProgressEvent::Done { total }).await;
        info!("Run {} completed with {} card(s)", self.run_id, total);
        self.report(total, items)
    }

    async fn translate_phase(&self, iter: SourceIterator) -> Vec<Item> {
        let total = iter.total();
        let mut items = Vec::with_capacity(total);

        for raw in iter {
            if !self.controller.is_running() {
                info!("Translation stopped before item {} of {}", raw.index, total);
                break;
            }
            if raw.index == 1 {
                self.progress.emit(ProgressEvent::Total { count: total }).await;
            }

            let mut item = Item::new(raw.index, raw.text);
            match self.pipeline.translator.translate(&item.original_text).await {
                Ok(translation) => item.mark_translated(translation),
                Err(e) => {
                    warn!("Translation of item {} failed: {}", item.index, e);
                    item.mark_translation_failed(&e.to_string());
                }
            }

            // the call is never interrupted, its result is dropped instead
            if !self.controller.is_running() {
                debug!("Discarding translation of item {} after abort", item.index);
                break;
            }

            self.progress
                .emit_item(
                    ProgressEvent::Translated {
                        index: item.index,
                        total,
                        original: item.original_text.clone(),
                        translation: item.translation().to_string(),
                    },
                    &self.controller,
                )
                .await;
            items.push(item);
        }

        items
    }

    async fn process_phase(&self, items: Vec<Item>, total: usize) -> (Vec<Item>, Option<PipelineError>) {
        let options = &self.pipeline.options;
        let synthesizer = if options.audio_enabled {
            if self.pipeline.synthesizer.is_none() {
                warn!("Audio is enabled but no synthesizer is configured, cards will have no audio");
            }
            self.pipeline.synthesizer.clone()
        } else {
            None
        };

        let halt = self.controller.child();
        let ctx = Arc::new(TaskContext {
            run_id: self.run_id,
            total,
            synthesizer,
            sink: self.pipeline.sink.clone(),
            media: self.pipeline.media.clone(),
            limiter: ConcurrencyLimiter::new(options.concurrency),
            progress: self.progress.clone(),
            halt: halt.clone(),
            fatal: Mutex::new(None),
        });

        let mut results: BTreeMap<usize, Item> = items.into_iter().map(|item| (item.index, item)).collect();
        let mut tasks = JoinSet::new();
        for item in results.values() {
            if !halt.is_running() {
                break;
            }
            tasks.spawn(process_item(ctx.clone(), item.clone()));
        }
        debug!(
            "Dispatched {} processing task(s), at most {} in flight",
            tasks.len(),
            ctx.limiter.capacity()
        );

        let grace = options.abort_grace;
        let mut deadline: Option<Instant> = None;
        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            "{} processing task(s) still running after {:?}, abandoning them",
                            tasks.len(),
                            grace
                        );
                        tasks.abort_all();
                        while tasks.join_next().await.is_some() {}
                        break;
                    }
                },
                None => tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = halt.cancelled() => {
                        deadline = Some(Instant::now() + grace);
                        continue;
                    }
                },
            };

            match joined {
                None => break,
                Some(Ok(Some(item))) => {
                    results.insert(item.index, item);
                }
                // abandoned before doing anything
                Some(Ok(None)) => {}
                Some(Err(e)) if e.is_cancelled() => {}
                Some(Err(e)) => ctx.fail(PipelineError::Task(e.to_string())),
            }
        }

        debug!("Limiter peak for run {}: {}", self.run_id, ctx.limiter.peak());
        let fatal = ctx.fatal.lock().take();
        (results.into_values().collect(), fatal)
    }

    async fn abort(mut self, total: usize, items: Vec<Item>) -> RunReport {
        info!("Run {} aborted", self.run_id);
        self.advance(PipelinePhase::Aborted);
        self.cleanup();
        self.progress.emit(ProgressEvent::Aborted).await;
        self.report(total, items)
    }

    async fn fail(mut self, error: PipelineError, total: usize, items: Vec<Item>) -> RunReport {
        error!("Run {} failed: {}", self.run_id, error);
        self.advance(PipelinePhase::Failed);
        self.cleanup();
        self.progress
            .emit(ProgressEvent::Error {
                message: error.to_string(),
            })
            .await;
        self.report(total, items)
    }

    fn cleanup(&self) {
        if let Err(e) = self.pipeline.media.remove_artifacts(self.run_id) {
            warn!("Failed to clean up media of run {}: {}", self.run_id, e);
        }
    }

    fn advance(&mut self, next: PipelinePhase) {
        if let Err(e) = self.state.transition(next) {
            error!("{}", e);
        }
    }

    fn report(&self, total: usize, items: Vec<Item>) -> RunReport {
        RunReport {
            run_id: self.run_id,
            phase: self.state.phase(),
            total,
            items,
        }
    }
}

/// Shared by every processing task of one run
struct TaskContext {
    run_id: RunId,
    total: usize,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    sink: Arc<dyn CardSink>,
    media: Arc<dyn MediaStore>,
    limiter: ConcurrencyLimiter,
    progress: ProgressSender,
    /// Stops on user abort and on fatal errors
    halt: CancellationController,
    fatal: Mutex<Option<PipelineError>>,
}

impl TaskContext {
    /// Record a fatal error and stop dispatching work. The first error wins.
    fn fail(&self, error: PipelineError) {
        {
            let mut fatal = self.fatal.lock();
            if fatal.is_none() {
                error!("Processing failed: {}", error);
                *fatal = Some(error);
            }
        }
        self.halt.request_abort();
    }
}

/// Process one item. `None` means the task was abandoned without side effects.
async fn process_item(ctx: Arc<TaskContext>, mut item: Item) -> Option<Item> {
    if !ctx.halt.is_running() {
        return None;
    }

    let _slot = tokio::select! {
        biased;
        _ = ctx.halt.cancelled() => return None,
        slot = ctx.limiter.acquire() => slot.ok()?,
    };
    if !ctx.halt.is_running() {
        return None;
    }

    if let Some(synthesizer) = &ctx.synthesizer {
        match synthesizer.synthesize(&item.original_text).await {
            Ok(audio) => match ctx.media.store_audio(ctx.run_id, &item.original_text, &audio) {
                Ok(audio_ref) => item.audio_ref = Some(audio_ref),
                Err(e) => warn!("Item {}: {}, adding card without audio", item.index, e),
            },
            Err(e) => warn!("Item {}: speech synthesis failed, adding card without audio: {}", item.index, e),
        }

        if !ctx.halt.is_running() {
            debug!("Discarding result of item {} after stop", item.index);
            return None;
        }
    }

    if let Err(e) = ctx
        .sink
        .add_card(&item.original_text, item.translation(), item.audio_ref.as_ref())
    {
        item.status = ItemStatus::ProcessFailed;
        ctx.fail(e.into());
        return Some(item);
    }
    item.status = ItemStatus::Processed;

    ctx.progress
        .emit_item(
            ProgressEvent::Processed {
                index: item.index,
                total: ctx.total,
                original: item.original_text.clone(),
                translation: item.translation().to_string(),
                has_audio: item.has_audio(),
            },
            &ctx.halt,
        )
        .await;

    Some(item)
}
