//! Mock implementations of search traits for testing without Isabelle or a model.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use qisabelle::{SessionError, StepOutcome};

use crate::engine::{ProofEnvironment, ProofSession, SearchError, StepGenerator};
use crate::types::GeneratedStep;

/// Convenience constructor for a `GeneratedStep`.
pub fn make_step(text: &str, score: f64) -> GeneratedStep {
    GeneratedStep {
        text: text.to_string(),
        score,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

/// Inputs a [`MockGenerator`] was called with.
#[derive(Clone, Default)]
pub struct GeneratorCalls {
    inner: Arc<Mutex<Vec<(String, String)>>>,
}

impl GeneratorCalls {
    /// `(previous_step, goals)` pairs in call order.
    pub fn inputs(&self) -> Vec<(String, String)> {
        lock(&self.inner).clone()
    }
}

/// Mock generator that returns canned steps based on the goal text.
pub struct MockGenerator {
    responses: HashMap<String, Vec<GeneratedStep>>,
    contains_responses: Vec<(String, Vec<GeneratedStep>)>,
    default_responses: Vec<GeneratedStep>,
    calls: GeneratorCalls,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    /// Create an empty mock generator with no responses.
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            contains_responses: Vec::new(),
            default_responses: Vec::new(),
            calls: GeneratorCalls::default(),
        }
    }

    /// Create a mock generator with default responses for any goals.
    pub fn with_default(steps: Vec<GeneratedStep>) -> Self {
        Self {
            default_responses: steps,
            ..Self::new()
        }
    }

    /// Add a canned response for an exact goal text match.
    pub fn add_response(&mut self, goals: &str, steps: Vec<GeneratedStep>) {
        self.responses.insert(goals.to_string(), steps);
    }

    /// Add a canned response that matches if the goals *contain* the pattern.
    ///
    /// Checked after exact matches.
    pub fn add_contains_response(&mut self, pattern: &str, steps: Vec<GeneratedStep>) {
        self.contains_responses.push((pattern.to_string(), steps));
    }

    pub fn calls(&self) -> GeneratorCalls {
        self.calls.clone()
    }
}

#[async_trait]
impl StepGenerator for MockGenerator {
    async fn generate(
        &self,
        previous_step: &str,
        goals: &str,
    ) -> Result<Vec<GeneratedStep>, SearchError> {
        lock(&self.calls.inner).push((previous_step.to_string(), goals.to_string()));
        if let Some(steps) = self.responses.get(goals) {
            return Ok(steps.clone());
        }
        for (pattern, steps) in &self.contains_responses {
            if goals.contains(pattern.as_str()) {
                return Ok(steps.clone());
            }
        }
        Ok(self.default_responses.clone())
    }
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

/// What a [`MockSession`] was asked to do.
#[derive(Clone, Default)]
pub struct SessionCalls {
    inner: Arc<Mutex<SessionLog>>,
}

#[derive(Default)]
struct SessionLog {
    loads: Vec<(String, String)>,
    executed: Vec<(String, String, String)>,
    hammered: Vec<(String, Vec<String>)>,
    closes: usize,
}

impl SessionCalls {
    /// `(new_state, until)` for every `load_theory`.
    pub fn loads(&self) -> Vec<(String, String)> {
        lock(&self.inner).loads.clone()
    }

    /// `(state, step, new_state)` for every `execute`.
    pub fn executed(&self) -> Vec<(String, String, String)> {
        lock(&self.inner).executed.clone()
    }

    /// `(state, deleted_facts)` for every `hammer`.
    pub fn hammered(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.inner).hammered.clone()
    }

    pub fn closes(&self) -> usize {
        lock(&self.inner).closes
    }
}

enum ScriptedStep {
    Outcome {
        expected_step: String,
        outcome: StepOutcome,
    },
    Error(SessionError),
}

/// Mock session answering from a script.
///
/// `load_theory` returns the initial goals. Each `execute` consumes the next
/// scripted entry; a step that differs from the scripted one fails with a
/// `failed-proof` backend error. Once the script is exhausted, every step
/// succeeds with fresh, distinct goals and no proof completion.
pub struct MockSession {
    initial_goals: String,
    load_done: bool,
    load_delay: Duration,
    execute_delay: Duration,
    script: VecDeque<ScriptedStep>,
    hammer_proof: String,
    states: HashMap<String, String>,
    calls: SessionCalls,
}

impl MockSession {
    pub fn new(initial_goals: &str) -> Self {
        Self {
            initial_goals: initial_goals.to_string(),
            load_done: false,
            load_delay: Duration::ZERO,
            execute_delay: Duration::ZERO,
            script: VecDeque::new(),
            hammer_proof: "by auto".to_string(),
            states: HashMap::new(),
            calls: SessionCalls::default(),
        }
    }

    /// Script the next `execute`: `step` yields `goals` and `done`.
    pub fn with_execute(mut self, step: &str, goals: &str, done: bool) -> Self {
        self.script.push_back(ScriptedStep::Outcome {
            expected_step: step.to_string(),
            outcome: StepOutcome {
                proof_done: done,
                goals: goals.to_string(),
            },
        });
        self
    }

    /// Script the next `execute` to fail with `error`, whatever the step.
    pub fn with_execute_error(mut self, error: SessionError) -> Self {
        self.script.push_back(ScriptedStep::Error(error));
        self
    }

    /// Make `load_theory` report the statement as already proved.
    pub fn with_load_done(mut self) -> Self {
        self.load_done = true;
        self
    }

    pub fn with_hammer(mut self, proof: &str) -> Self {
        self.hammer_proof = proof.to_string();
        self
    }

    /// Sleep this long (on the tokio clock) inside every `load_theory`.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Sleep this long (on the tokio clock) inside every `execute`.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = delay;
        self
    }

    pub fn with_calls(mut self, calls: SessionCalls) -> Self {
        self.calls = calls;
        self
    }

    pub fn calls(&self) -> SessionCalls {
        self.calls.clone()
    }

    fn unknown_state(state: &str) -> SearchError {
        SearchError::Session(SessionError::Backend {
            kind: "not_found".into(),
            desc: format!("No such state: {state}"),
        })
    }
}

#[async_trait]
impl ProofSession for MockSession {
    async fn load_theory(
        &mut self,
        _theory_path: &Path,
        until: &str,
        _inclusive: bool,
        new_state: &str,
    ) -> Result<StepOutcome, SearchError> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        lock(&self.calls.inner)
            .loads
            .push((new_state.to_string(), until.to_string()));
        self.states
            .insert(new_state.to_string(), self.initial_goals.clone());
        Ok(StepOutcome {
            proof_done: self.load_done,
            goals: self.initial_goals.clone(),
        })
    }

    async fn execute(
        &mut self,
        state: &str,
        step: &str,
        new_state: &str,
    ) -> Result<StepOutcome, SearchError> {
        if !self.execute_delay.is_zero() {
            tokio::time::sleep(self.execute_delay).await;
        }
        let step_index = {
            let mut log = lock(&self.calls.inner);
            log.executed
                .push((state.to_string(), step.to_string(), new_state.to_string()));
            log.executed.len()
        };
        if !self.states.contains_key(state) {
            return Err(Self::unknown_state(state));
        }

        let outcome = match self.script.pop_front() {
            Some(ScriptedStep::Outcome {
                expected_step,
                outcome,
            }) => {
                if expected_step != step {
                    return Err(SearchError::Session(SessionError::Backend {
                        kind: "failed-proof".into(),
                        desc: format!("Step failed: {step}"),
                    }));
                }
                outcome
            }
            Some(ScriptedStep::Error(e)) => return Err(e.into()),
            None => StepOutcome {
                proof_done: false,
                goals: format!("proof (prove)\ngoal (1 subgoal):\n 1. after step {step_index}"),
            },
        };
        self.states.insert(new_state.to_string(), outcome.goals.clone());
        Ok(outcome)
    }

    async fn hammer(&mut self, state: &str, deleted_facts: &[String]) -> Result<String, SearchError> {
        lock(&self.calls.inner)
            .hammered
            .push((state.to_string(), deleted_facts.to_vec()));
        if !self.states.contains_key(state) {
            return Err(Self::unknown_state(state));
        }
        Ok(self.hammer_proof.clone())
    }

    async fn describe_state(&mut self, state: &str) -> Result<String, SearchError> {
        self.states
            .get(state)
            .cloned()
            .ok_or_else(|| Self::unknown_state(state))
    }

    async fn close(self: Box<Self>) -> Result<(), SearchError> {
        lock(&self.calls.inner).closes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockEnvironment
// ---------------------------------------------------------------------------

type SessionFactory = Box<dyn Fn(&Path) -> MockSession + Send + Sync>;

/// Mock environment building a fresh [`MockSession`] per `open`.
pub struct MockEnvironment {
    factory: SessionFactory,
    unavailable: Option<String>,
    opened: Arc<Mutex<Vec<PathBuf>>>,
    calls: SessionCalls,
}

impl MockEnvironment {
    pub fn new(factory: impl Fn(&Path) -> MockSession + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            unavailable: None,
            opened: Arc::new(Mutex::new(Vec::new())),
            calls: SessionCalls::default(),
        }
    }

    /// Every `open` fails with [`SessionError::Unavailable`].
    pub fn unavailable(detail: &str) -> Self {
        Self {
            unavailable: Some(detail.to_string()),
            ..Self::new(|_| MockSession::new(""))
        }
    }

    /// Theory paths passed to `open`, in call order.
    pub fn opened(&self) -> Vec<PathBuf> {
        lock(&self.opened).clone()
    }

    /// Sessions closed so far, across all opens.
    pub fn closed(&self) -> usize {
        self.calls.closes()
    }
}

#[async_trait]
impl ProofEnvironment for MockEnvironment {
    async fn open(&self, theory_path: &Path) -> Result<Box<dyn ProofSession>, SearchError> {
        lock(&self.opened).push(theory_path.to_path_buf());
        if let Some(detail) = &self.unavailable {
            return Err(SessionError::Unavailable(detail.clone()).into());
        }
        let session = (self.factory)(theory_path).with_calls(self.calls.clone());
        Ok(Box::new(session))
    }
}
