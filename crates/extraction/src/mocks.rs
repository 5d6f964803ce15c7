//! Mock session opener for testing the scheduler without a QIsabelle server.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use qisabelle::{ExtractedTheory, Extraction, Position, SessionError, State, Theory, Transition};

use crate::types::{ItemRef, WorkUnit};
use crate::worker::{ExtractionSession, SessionOpener};

/// Build a unit whose items live under `/afp/thys/{unit}/`.
pub fn make_unit(unit: &str, items: &[&str]) -> WorkUnit {
    let items = items
        .iter()
        .map(|id| {
            let rel = id.replace('.', "/");
            ItemRef::new(
                *id,
                format!("/host/afp/thys/{unit}/{rel}.thy"),
                format!("/afp/thys/{unit}/{rel}.thy"),
            )
        })
        .collect();
    WorkUnit::new(unit, items)
}

/// A small extraction record for `item` in `unit`.
pub fn sample_theory(unit: &str, item: &ItemRef) -> ExtractedTheory {
    let name = item.id.rsplit('.').next().unwrap_or(&item.id).to_string();
    ExtractedTheory {
        theory: Theory {
            path: item.backend_path.to_string_lossy().into_owned(),
            session_name: unit.to_string(),
            name: name.clone(),
            imports: vec!["Main".into()],
            import_names: vec!["Main".into()],
        },
        extractions: vec![Extraction {
            transition: Transition {
                name: "theory".into(),
                text: format!("theory {name} imports Main begin"),
                position: Position {
                    line: 1,
                    offset: 1,
                    end_offset: 30,
                },
            },
            state: State {
                mode: "Theory".into(),
                proof_state: String::new(),
                local_theory: format!("theory {name}"),
                proof_level: 0,
            },
        }],
    }
}

/// Shared record of what mock sessions were asked to do.
#[derive(Clone, Default)]
pub struct MockCalls {
    inner: Arc<Mutex<CallLog>>,
}

#[derive(Default)]
struct CallLog {
    opens: Vec<String>,
    extracted: Vec<(String, String)>,
    closes: usize,
}

impl MockCalls {
    fn log(&self) -> MutexGuard<'_, CallLog> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Unit ids passed to `open`, in call order.
    pub fn opened_units(&self) -> Vec<String> {
        self.log().opens.clone()
    }

    pub fn opens(&self) -> usize {
        self.log().opens.len()
    }

    /// `(unit, item)` pairs passed to `extract`, in call order.
    pub fn extracted(&self) -> Vec<(String, String)> {
        self.log().extracted.clone()
    }

    pub fn closes(&self) -> usize {
        self.log().closes
    }
}

/// Opener whose sessions answer from canned data.
///
/// By default every open and every extraction succeeds. Failures are
/// configured per unit (open) and per item id (extract).
pub struct MockOpener {
    label: String,
    failing_opens: HashMap<String, String>,
    failing_items: HashSet<String>,
    delay: Duration,
    calls: MockCalls,
}

impl MockOpener {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failing_opens: HashMap::new(),
            failing_items: HashSet::new(),
            delay: Duration::ZERO,
            calls: MockCalls::default(),
        }
    }

    /// Make `open` fail for `unit` with an `Unavailable` error carrying `detail`.
    pub fn with_failing_open(mut self, unit: &str, detail: &str) -> Self {
        self.failing_opens.insert(unit.to_string(), detail.to_string());
        self
    }

    /// Make `extract` fail for every item with this id.
    pub fn with_failing_item(mut self, item: &str) -> Self {
        self.failing_items.insert(item.to_string());
        self
    }

    /// Sleep this long inside every `extract` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Share call recording with another opener.
    pub fn with_calls(mut self, calls: MockCalls) -> Self {
        self.calls = calls;
        self
    }

    pub fn calls(&self) -> MockCalls {
        self.calls.clone()
    }
}

#[async_trait]
impl SessionOpener for MockOpener {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn open(&self, unit: &WorkUnit) -> Result<Box<dyn ExtractionSession>, SessionError> {
        self.calls.log().opens.push(unit.id.clone());
        if let Some(detail) = self.failing_opens.get(&unit.id) {
            return Err(SessionError::Unavailable(detail.clone()));
        }
        Ok(Box::new(MockExtractionSession {
            unit: unit.id.clone(),
            failing_items: self.failing_items.clone(),
            delay: self.delay,
            calls: self.calls.clone(),
        }))
    }
}

struct MockExtractionSession {
    unit: String,
    failing_items: HashSet<String>,
    delay: Duration,
    calls: MockCalls,
}

#[async_trait]
impl ExtractionSession for MockExtractionSession {
    async fn extract(&mut self, item: &ItemRef) -> Result<ExtractedTheory, SessionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls
            .log()
            .extracted
            .push((self.unit.clone(), item.id.clone()));
        if self.failing_items.contains(&item.id) {
            return Err(SessionError::Backend {
                kind: "not_found".into(),
                desc: format!("Theory file not found: {}", item.backend_path.display()),
            });
        }
        Ok(sample_theory(&self.unit, item))
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.calls.log().closes += 1;
        Ok(())
    }
}
