//! Extraction worker: one per backend connection.
//!
//! A worker owns exactly one session at a time and never shares it. It pulls
//! units from the [`WorkQueue`] until it receives its sentinel. Per-item and
//! per-unit failures are turned into checkpoint markers here; nothing that
//! goes wrong inside a unit stops the worker.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use qisabelle::{ExtractedTheory, SessionError};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::queue::{QueueMessage, WorkQueue};
use crate::types::{ItemRef, UnitOutcome, WorkUnit, WorkerReport, WorkerState};

/// Opens sessions against one backend connection.
#[async_trait]
pub trait SessionOpener: Send + Sync {
    /// Short label for logs, usually the server port.
    fn label(&self) -> String;

    /// Open a session scoped to `unit`.
    async fn open(&self, unit: &WorkUnit) -> Result<Box<dyn ExtractionSession>, SessionError>;
}

/// A session able to extract items of the unit it was opened for.
#[async_trait]
pub trait ExtractionSession: Send {
    async fn extract(&mut self, item: &ItemRef) -> Result<ExtractedTheory, SessionError>;

    /// Release the session.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

pub struct ExtractionWorker {
    id: usize,
    opener: Arc<dyn SessionOpener>,
    store: Arc<CheckpointStore>,
    state: WorkerState,
    report: WorkerReport,
}

impl ExtractionWorker {
    pub fn new(id: usize, opener: Arc<dyn SessionOpener>, store: Arc<CheckpointStore>) -> Self {
        let report = WorkerReport::new(id, opener.label());
        Self {
            id,
            opener,
            store,
            state: WorkerState::Idle,
            report,
        }
    }

    pub fn state(&self) -> &WorkerState {
        &self.state
    }

    /// Consume units until a sentinel arrives.
    pub async fn run(mut self, queue: WorkQueue) -> WorkerReport {
        tracing::info!(worker = self.id, label = %self.report.label, "Worker started");
        loop {
            self.state = WorkerState::Idle;
            let message = queue.dequeue().await;
            self.report.dequeues += 1;
            match message {
                QueueMessage::Unit(unit) => {
                    self.state = WorkerState::ProcessingUnit(unit.id.clone());
                    let outcome = self.process_unit(&unit).await;
                    self.report.record(&outcome);
                }
                QueueMessage::Stop => {
                    self.state = WorkerState::Stopped;
                    break;
                }
            }
        }

        tracing::info!(
            worker = self.id,
            label = %self.report.label,
            units = self.report.units_completed,
            extracted = self.report.items_extracted,
            failed = self.report.items_failed,
            "Worker stopped"
        );
        self.report.final_state = self.state.clone();
        self.report
    }

    /// Run a checkpoint operation on the blocking pool. Store calls touch
    /// the filesystem (gzip, fsync, rename) and must not hold a runtime thread.
    async fn with_store<T, F>(&self, op: F) -> Result<T, CheckpointError>
    where
        F: FnOnce(&CheckpointStore) -> Result<T, CheckpointError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| CheckpointError::Task(e.to_string()))?
    }

    /// Process one unit end to end.
    pub async fn process_unit(&mut self, unit: &WorkUnit) -> UnitOutcome {
        let unit_id = unit.id.clone();
        let prepared = self
            .with_store(move |store| {
                if store.is_unit_done(&unit_id) {
                    return Ok(false);
                }
                store.ensure_unit_dir(&unit_id).map(|_| true)
            })
            .await;
        match prepared {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(worker = self.id, unit = %unit.id, "Unit already done, skipping");
                return UnitOutcome::AlreadyDone;
            }
            Err(e) => {
                tracing::error!(worker = self.id, unit = %unit.id, error = %e, "Cannot prepare unit directory");
                return UnitOutcome::StoreFailed {
                    detail: e.to_string(),
                };
            }
        }

        let start = Instant::now();
        let outcome = match self.opener.open(unit).await {
            Ok(session) => self.extract_items(unit, session).await,
            Err(e) => {
                let detail = e.to_string();
                tracing::warn!(
                    worker = self.id,
                    unit = %unit.id,
                    error = %detail,
                    "Failed to open session for unit"
                );
                let (unit_id, marker) = (unit.id.clone(), detail.clone());
                if let Err(store_err) = self
                    .with_store(move |store| store.mark_unit_error(&unit_id, &marker))
                    .await
                {
                    tracing::error!(unit = %unit.id, error = %store_err, "Failed to write unit error marker");
                }
                UnitOutcome::OpenFailed { detail }
            }
        };

        let unit_id = unit.id.clone();
        if let Err(e) = self
            .with_store(move |store| store.mark_unit_done(&unit_id))
            .await
        {
            tracing::error!(unit = %unit.id, error = %e, "Failed to write done marker");
        }
        tracing::info!(
            worker = self.id,
            unit = %unit.id,
            items = unit.items.len(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "Unit done"
        );
        outcome
    }

    async fn extract_items(
        &mut self,
        unit: &WorkUnit,
        mut session: Box<dyn ExtractionSession>,
    ) -> UnitOutcome {
        let mut extracted = 0;
        let mut skipped = 0;
        let mut failed = 0;

        for item in &unit.items {
            let (unit_id, key) = (unit.id.clone(), item.clone());
            let present = self
                .with_store(move |store| Ok(store.has_artifact(&unit_id, &key)))
                .await
                .unwrap_or(false);
            if present {
                tracing::debug!(unit = %unit.id, item = %item.id, "Artifact present, skipping");
                skipped += 1;
                continue;
            }

            let start = Instant::now();
            let detail = match session.extract(item).await {
                Ok(record) => {
                    let transitions = record.extractions.len();
                    let (unit_id, key) = (unit.id.clone(), item.clone());
                    match self
                        .with_store(move |store| store.write_artifact(&unit_id, &key, &record))
                        .await
                    {
                        Ok(_) => {
                            tracing::info!(
                                worker = self.id,
                                unit = %unit.id,
                                item = %item.id,
                                transitions,
                                elapsed_s = start.elapsed().as_secs_f64(),
                                "Extracted"
                            );
                            extracted += 1;
                            continue;
                        }
                        Err(e) => e.to_string(),
                    }
                }
                Err(e) => e.to_string(),
            };

            tracing::warn!(worker = self.id, unit = %unit.id, item = %item.id, error = %detail, "Item failed");
            failed += 1;
            let (unit_id, key, marker) = (unit.id.clone(), item.clone(), detail);
            if let Err(e) = self
                .with_store(move |store| store.mark_item_error(&unit_id, &key, &marker))
                .await
            {
                tracing::error!(unit = %unit.id, item = %item.id, error = %e, "Failed to write item error marker");
            }
        }

        if let Err(e) = session.close().await {
            tracing::warn!(worker = self.id, unit = %unit.id, error = %e, "Failed to close session");
        }

        UnitOutcome::Completed {
            extracted,
            skipped,
            failed,
        }
    }
}
