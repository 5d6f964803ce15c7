//! Resumable bulk extraction of proof-state traces.
//!
//! A fixed pool of workers, one per QIsabelle server, pulls work units
//! (Isabelle sessions) from a shared queue. Each worker opens one session per
//! unit and extracts its theory files in order, persisting each result as a
//! gzip JSON artifact. Progress is recorded as filesystem markers so a killed
//! run can simply be restarted:
//!
//! - a unit with a `done` marker is never reopened;
//! - an item with an artifact is never re-extracted;
//! - failures leave `error` markers and never stop a worker.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use extraction::{CheckpointStore, Dispatcher, ExtractionPaths, QIsabelleOpener, SessionOpener};
//! use qisabelle::SessionConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let paths = ExtractionPaths::new("afp", "isabelle", "extractions");
//! let units = paths.discover_units(false)?;
//! let openers: Vec<Arc<dyn SessionOpener>> =
//!     QIsabelleOpener::pool(&SessionConfig::default(), 4, &paths.session_roots())?
//!         .into_iter()
//!         .map(|o| Arc::new(o) as Arc<dyn SessionOpener>)
//!         .collect();
//! let report = Dispatcher::new(CheckpointStore::new(&paths.output_root), openers)
//!     .run(units)
//!     .await?;
//! println!("extracted {}", report.items_extracted());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod checkpoint;
pub mod corpus;
pub mod dispatcher;
pub mod mocks;
pub mod queue;
pub mod types;
pub mod worker;

pub use adapters::{PortRangeError, QIsabelleOpener};
pub use checkpoint::{CheckpointError, CheckpointStore, StoreSummary};
pub use corpus::{CorpusError, ExtractionPaths, HOL_UNIT};
pub use dispatcher::{DispatchError, Dispatcher};
pub use queue::{QueueMessage, WorkQueue};
pub use types::{
    CheckpointMarker, DispatchReport, ItemRef, UnitOutcome, WorkUnit, WorkerReport, WorkerState,
};
pub use worker::{ExtractionSession, ExtractionWorker, SessionOpener};
