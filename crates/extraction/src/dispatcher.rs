//! Fan-out of work units over a fixed pool of workers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::checkpoint::CheckpointStore;
use crate::queue::WorkQueue;
use crate::types::{DispatchReport, WorkUnit};
use crate::worker::{ExtractionWorker, SessionOpener};

/// Process-level dispatch failures. None of these are retried.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No workers configured")]
    NoWorkers,

    #[error("Unit '{0}' appears more than once")]
    DuplicateUnit(String),

    #[error("Unit '{0}' enqueued after a sentinel")]
    UnitAfterSentinel(String),

    #[error("Work queue closed")]
    QueueClosed,
}

/// Enqueues every unit once followed by one sentinel per worker, then starts
/// one worker per opener and waits for all of them to stop.
pub struct Dispatcher {
    store: Arc<CheckpointStore>,
    openers: Vec<Arc<dyn SessionOpener>>,
}

impl Dispatcher {
    pub fn new(store: CheckpointStore, openers: Vec<Arc<dyn SessionOpener>>) -> Self {
        Self {
            store: Arc::new(store),
            openers,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.openers.len()
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub async fn run(&self, units: Vec<WorkUnit>) -> Result<DispatchReport, DispatchError> {
        if self.openers.is_empty() {
            return Err(DispatchError::NoWorkers);
        }
        let mut seen = HashSet::new();
        for unit in &units {
            if !seen.insert(unit.id.as_str()) {
                return Err(DispatchError::DuplicateUnit(unit.id.clone()));
            }
        }

        let start = Instant::now();
        let num_units = units.len();
        let queue = fill_queue(units, self.openers.len())?;
        tracing::info!(
            units = num_units,
            workers = self.openers.len(),
            output = %self.store.root().display(),
            "Starting dispatch"
        );

        let handles: Vec<_> = self
            .openers
            .iter()
            .enumerate()
            .map(|(i, opener)| {
                let worker = ExtractionWorker::new(i, Arc::clone(opener), Arc::clone(&self.store));
                tokio::spawn(worker.run(queue.clone()))
            })
            .collect();

        let mut report = DispatchReport::default();
        for (i, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(worker_report) => report.workers.push(worker_report),
                Err(e) => {
                    tracing::error!(worker = i, error = %e, "Worker task failed");
                    report.lost_workers += 1;
                }
            }
        }

        tracing::info!(
            units = num_units,
            dequeues = queue.dequeued(),
            extracted = report.items_extracted(),
            failed = report.items_failed(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "Dispatch finished"
        );
        Ok(report)
    }
}

/// Enqueue every unit, then one sentinel per worker.
///
/// Runs before any worker starts, so a failure here leaves no worker waiting
/// on a queue that will never be closed.
fn fill_queue(units: Vec<WorkUnit>, workers: usize) -> Result<WorkQueue, DispatchError> {
    let queue = WorkQueue::new();
    for unit in units {
        queue.enqueue(unit)?;
    }
    for _ in 0..workers {
        queue.enqueue_sentinel()?;
    }
    Ok(queue)
}
