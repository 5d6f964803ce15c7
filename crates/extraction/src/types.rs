//! Work units, items and per-unit/per-worker outcomes.

use std::fmt;
use std::path::{Path, PathBuf};

/// One theory file to extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    /// Logical name, unique within its unit (e.g. `"Foo.Bar"` for `Foo/Bar.thy`).
    /// Also the artifact key.
    pub id: String,
    /// Path on the machine running the scheduler.
    pub host_path: PathBuf,
    /// Path as seen by the QIsabelle server.
    pub backend_path: PathBuf,
}

impl ItemRef {
    pub fn new(id: impl Into<String>, host_path: impl Into<PathBuf>, backend_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            host_path: host_path.into(),
            backend_path: backend_path.into(),
        }
    }

    /// Derive the logical name of `thy_file` relative to `session_dir`:
    /// extension dropped, path separators replaced by dots.
    pub fn logical_name(session_dir: &Path, thy_file: &Path) -> String {
        let relative = thy_file.strip_prefix(session_dir).unwrap_or(thy_file);
        let without_ext = relative.with_extension("");
        without_ext
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A group of items processed together under one Isabelle session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Unit id; also the Isabelle session name.
    pub id: String,
    /// Items in processing order.
    pub items: Vec<ItemRef>,
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, items: Vec<ItemRef>) -> Self {
        Self {
            id: id.into(),
            items,
        }
    }
}

/// Durable per-unit marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointMarker {
    /// Every item was attempted. Blocks reprocessing.
    Done,
    /// The unit failed as a whole (e.g. the session could not be opened).
    /// Informational only; does not block a later retry.
    Error(String),
}

/// What happened to one unit taken from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Already marked done by an earlier run; no session opened.
    AlreadyDone,
    /// The session could not be opened; recorded as a unit error.
    OpenFailed { detail: String },
    /// The unit directory could not be prepared; nothing was recorded.
    StoreFailed { detail: String },
    /// Every item was attempted.
    Completed {
        extracted: usize,
        skipped: usize,
        failed: usize,
    },
}

/// Lifecycle of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    ProcessingUnit(String),
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ProcessingUnit(unit) => write!(f, "processing {unit}"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters for one worker's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker index.
    pub worker: usize,
    /// Human-readable label (usually the server port).
    pub label: String,
    /// Messages taken from the queue, sentinel included.
    pub dequeues: usize,
    pub units_completed: usize,
    pub units_already_done: usize,
    pub units_open_failed: usize,
    pub units_store_failed: usize,
    pub items_extracted: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub final_state: WorkerState,
}

impl WorkerReport {
    pub fn new(worker: usize, label: String) -> Self {
        Self {
            worker,
            label,
            dequeues: 0,
            units_completed: 0,
            units_already_done: 0,
            units_open_failed: 0,
            units_store_failed: 0,
            items_extracted: 0,
            items_skipped: 0,
            items_failed: 0,
            final_state: WorkerState::Idle,
        }
    }

    /// Fold a unit outcome into the counters.
    pub fn record(&mut self, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::AlreadyDone => self.units_already_done += 1,
            UnitOutcome::OpenFailed { .. } => self.units_open_failed += 1,
            UnitOutcome::StoreFailed { .. } => self.units_store_failed += 1,
            UnitOutcome::Completed {
                extracted,
                skipped,
                failed,
            } => {
                self.units_completed += 1;
                self.items_extracted += extracted;
                self.items_skipped += skipped;
                self.items_failed += failed;
            }
        }
    }
}

/// Aggregate over all workers of one dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub workers: Vec<WorkerReport>,
    /// Workers whose task panicked or was cancelled.
    pub lost_workers: usize,
}

impl DispatchReport {
    pub fn total_dequeues(&self) -> usize {
        self.workers.iter().map(|w| w.dequeues).sum()
    }

    pub fn items_extracted(&self) -> usize {
        self.workers.iter().map(|w| w.items_extracted).sum()
    }

    pub fn items_skipped(&self) -> usize {
        self.workers.iter().map(|w| w.items_skipped).sum()
    }

    pub fn items_failed(&self) -> usize {
        self.workers.iter().map(|w| w.items_failed).sum()
    }

    pub fn units_completed(&self) -> usize {
        self.workers.iter().map(|w| w.units_completed).sum()
    }

    pub fn units_already_done(&self) -> usize {
        self.workers.iter().map(|w| w.units_already_done).sum()
    }

    pub fn units_open_failed(&self) -> usize {
        self.workers.iter().map(|w| w.units_open_failed).sum()
    }

    /// True if every worker consumed its sentinel.
    pub fn all_stopped(&self) -> bool {
        self.lost_workers == 0
            && self
                .workers
                .iter()
                .all(|w| w.final_state == WorkerState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_name_nested() {
        let name = ItemRef::logical_name(
            Path::new("/afp/thys/Foo"),
            Path::new("/afp/thys/Foo/Sub/Bar.thy"),
        );
        assert_eq!(name, "Sub.Bar");
    }

    #[test]
    fn logical_name_top_level() {
        let name = ItemRef::logical_name(Path::new("/afp/thys/Foo"), Path::new("/afp/thys/Foo/Bar.thy"));
        assert_eq!(name, "Bar");
    }

    #[test]
    fn logical_name_outside_session_dir_uses_whole_path() {
        let name = ItemRef::logical_name(Path::new("/elsewhere"), Path::new("Foo/Bar.thy"));
        assert_eq!(name, "Foo.Bar");
    }

    #[test]
    fn report_records_outcomes() {
        let mut report = WorkerReport::new(0, "17000".into());
        report.record(&UnitOutcome::AlreadyDone);
        report.record(&UnitOutcome::OpenFailed {
            detail: "refused".into(),
        });
        report.record(&UnitOutcome::Completed {
            extracted: 2,
            skipped: 1,
            failed: 1,
        });
        assert_eq!(report.units_already_done, 1);
        assert_eq!(report.units_open_failed, 1);
        assert_eq!(report.units_completed, 1);
        assert_eq!(report.items_extracted, 2);
        assert_eq!(report.items_skipped, 1);
        assert_eq!(report.items_failed, 1);
    }

    #[test]
    fn worker_state_display() {
        assert_eq!(WorkerState::Idle.to_string(), "idle");
        assert_eq!(WorkerState::ProcessingUnit("Foo".into()).to_string(), "processing Foo");
        assert_eq!(WorkerState::Stopped.to_string(), "stopped");
    }
}
