//! Multi-consumer FIFO of work units terminated by per-worker sentinels.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::dispatcher::DispatchError;
use crate::types::WorkUnit;

/// A message taken from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueMessage {
    Unit(WorkUnit),
    /// Termination sentinel: the worker that receives it stops.
    Stop,
}

/// Shared work queue.
///
/// One producer enqueues every unit, then one [`QueueMessage::Stop`] per
/// worker. Consumers share the receiving end behind an async mutex, so each
/// message is delivered to exactly one worker.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<QueueMessage>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<QueueMessage>>>,
    enqueued: Arc<AtomicUsize>,
    dequeued: Arc<AtomicUsize>,
    sentinels: Arc<AtomicUsize>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            enqueued: Arc::new(AtomicUsize::new(0)),
            dequeued: Arc::new(AtomicUsize::new(0)),
            sentinels: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue a unit. Fails once any sentinel has been enqueued.
    pub fn enqueue(&self, unit: WorkUnit) -> Result<(), DispatchError> {
        if self.sentinels.load(Ordering::SeqCst) > 0 {
            return Err(DispatchError::UnitAfterSentinel(unit.id));
        }
        self.send(QueueMessage::Unit(unit))
    }

    pub fn enqueue_sentinel(&self) -> Result<(), DispatchError> {
        self.sentinels.fetch_add(1, Ordering::SeqCst);
        self.send(QueueMessage::Stop)
    }

    fn send(&self, message: QueueMessage) -> Result<(), DispatchError> {
        self.tx
            .send(message)
            .map_err(|_| DispatchError::QueueClosed)?;
        self.enqueued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Wait for the next message.
    ///
    /// The queue keeps its own sender alive, so the channel cannot close
    /// while a consumer holds a `WorkQueue`; a `None` from the channel is
    /// still mapped to `Stop` so a consumer can never spin.
    pub async fn dequeue(&self) -> QueueMessage {
        let message = self.rx.lock().await.recv().await;
        self.dequeued.fetch_add(1, Ordering::SeqCst);
        message.unwrap_or(QueueMessage::Stop)
    }

    /// Messages enqueued so far, sentinels included.
    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    /// Messages delivered so far, sentinels included.
    pub fn dequeued(&self) -> usize {
        self.dequeued.load(Ordering::SeqCst)
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
