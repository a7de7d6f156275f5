/*!
 * Progress delivery from pipeline workers to one consumer.
 *
 * The channel holds `capacity` events. Once it is full a producer waits for
 * the consumer to take one, but never longer than the stall timeout: after
 * that the event is queued past the limit. A lagging consumer slows the
 * pipeline down, and a consumer that never drains cannot stop it. Per-item
 * sends also race the run's cancellation, so no producer waits on a full
 * buffer after an abort.
 *
 * The consumer either awaits events (`recv`, `observe`) or polls with
 * `try_drain`, which never blocks. Processing events complete in any
 * order; `ReorderBuffer` restores source order before they reach an
 * observer.
 */

use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::cancel::CancellationController;
use super::events::ProgressEvent;

/// Create a progress channel for one run.
///
/// `stall_timeout` bounds how long a producer waits for room in a full
/// buffer. `abort` is the run's controller: once it stops, the receiver
/// discards any per-item event still in flight.
pub fn channel(
    capacity: usize,
    stall_timeout: Duration,
    abort: CancellationController,
) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let slots = Arc::new(Semaphore::new(capacity.max(1)));
    (
        ProgressSender {
            tx,
            slots: slots.clone(),
            stall_timeout,
            overflowed: Arc::new(AtomicBool::new(false)),
        },
        ProgressReceiver {
            rx,
            slots,
            abort,
            closed: false,
        },
    )
}

/// An event and whether it holds one of the buffer's slots
#[derive(Debug)]
struct Queued {
    event: ProgressEvent,
    holds_slot: bool,
}

/// Producer side, cloned into every worker
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<Queued>,
    slots: Arc<Semaphore>,
    stall_timeout: Duration,
    overflowed: Arc<AtomicBool>,
}

impl ProgressSender {
    /// Send a run-level event. Returns false if the consumer is gone.
    pub async fn emit(&self, event: ProgressEvent) -> bool {
        let holds_slot = tokio::select! {
            biased;
            _ = self.tx.closed() => false,
            holds_slot = self.wait_for_slot() => holds_slot,
        };
        self.push(event, holds_slot)
    }

    /// Send a per-item event unless the run stops first.
    pub async fn emit_item(&self, event: ProgressEvent, running: &CancellationController) -> bool {
        if !running.is_running() {
            return false;
        }

        let holds_slot = tokio::select! {
            biased;
            _ = running.cancelled() => return false,
            _ = self.tx.closed() => false,
            holds_slot = self.wait_for_slot() => holds_slot,
        };
        self.push(event, holds_slot)
    }

    /// Wait for room in the buffer, at most `stall_timeout`. False means over the limit.
    async fn wait_for_slot(&self) -> bool {
        match tokio::time::timeout(self.stall_timeout, self.slots.acquire()).await {
            Ok(Ok(permit)) => {
                // given back by the receiver once it takes the event
                permit.forget();
                true
            }
            Ok(Err(_)) => false,
            Err(_) => {
                if !self.overflowed.swap(true, Ordering::SeqCst) {
                    warn!(
                        "Progress consumer is not keeping up, buffering events past capacity after {:?}",
                        self.stall_timeout
                    );
                }
                false
            }
        }
    }

    fn push(&self, event: ProgressEvent, holds_slot: bool) -> bool {
        match self.tx.send(Queued { event, holds_slot }) {
            Ok(()) => true,
            Err(e) => {
                debug!("Progress consumer gone, dropping {:?}", e.0.event);
                false
            }
        }
    }
}

/// Consumer side
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<Queued>,
    slots: Arc<Semaphore>,
    abort: CancellationController,
    closed: bool,
}

impl ProgressReceiver {
    /// Wait for the next event. `None` once the pipeline has finished and the buffer is empty.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Some(queued) => {
                    if let Some(event) = self.accept(queued) {
                        return Some(event);
                    }
                }
                None => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    /// Take every event currently buffered without waiting.
    ///
    /// An empty result is normal while the pipeline is busy.
    pub fn try_drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(queued) => events.extend(self.accept(queued)),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        events
    }

    /// Whether the pipeline has dropped every sender and the buffer is drained
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feed events through a reorder buffer into `observer` until a terminal event.
    ///
    /// Returns the terminal event, or `None` if the channel closed without one.
    pub async fn observe<O: ProgressObserver + ?Sized>(&mut self, observer: &mut O) -> Option<ProgressEvent> {
        let mut reorder = ReorderBuffer::new();
        while let Some(event) = self.recv().await {
            let terminal = event.is_terminal().then(|| event.clone());
            for ready in reorder.push(event) {
                observer.on_event(&ready);
            }
            if terminal.is_some() {
                return terminal;
            }
        }
        None
    }

    fn accept(&self, queued: Queued) -> Option<ProgressEvent> {
        if queued.holds_slot {
            self.slots.add_permits(1);
        }

        let event = queued.event;
        if event.is_item_event() && !self.abort.is_running() {
            debug!("Discarding item event received after abort: {:?}", event.item_index());
            return None;
        }
        Some(event)
    }
}

/// Receives progress events in source order
pub trait ProgressObserver {
    fn on_event(&mut self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&ProgressEvent),
{
    fn on_event(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

impl ProgressObserver for Vec<ProgressEvent> {
    fn on_event(&mut self, event: &ProgressEvent) {
        self.push(event.clone());
    }
}

/// Restores index order to item events that arrive out of order.
///
/// `next_to_emit` counts the items already delivered in the current phase;
/// item `next_to_emit + 1` is the one being waited for. Non-item events
/// pass straight through, and `PhaseComplete` starts a fresh ordering pass.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    next_to_emit: usize,
    pending: BTreeMap<usize, ProgressEvent>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept one event and return everything now deliverable, in order
    pub fn push(&mut self, event: ProgressEvent) -> Vec<ProgressEvent> {
        let Some(index) = event.item_index() else {
            if matches!(event, ProgressEvent::PhaseComplete { .. }) {
                self.reset();
            }
            return vec![event];
        };

        if index <= self.next_to_emit || self.pending.contains_key(&index) {
            debug!("Ignoring already seen item {}", index);
            return Vec::new();
        }

        self.pending.insert(index, event);

        let mut ready = Vec::new();
        while let Some(next) = self.pending.remove(&(self.next_to_emit + 1)) {
            self.next_to_emit += 1;
            ready.push(next);
        }
        ready
    }

    /// Number of items delivered in the current phase
    pub fn next_to_emit(&self) -> usize {
        self.next_to_emit
    }

    /// Items held back waiting for a lower index
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Clear held items and restart ordering at index 1
    pub fn reset(&mut self) {
        self.pending.clear();
        self.next_to_emit = 0;
    }
}
