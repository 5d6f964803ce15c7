//! Greedy, bounded-time proof search against a live Isabelle session.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use qisabelle::{SessionError, StepOutcome};

use crate::config::SearchConfig;
use crate::types::{FailureReason, GeneratedStep, SearchOutcome, SearchResult, SearchTrace, StepRecord};

/// Errors that can occur during proof search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Error from the Isabelle session (including per-call timeouts).
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    /// Error from the step generator.
    #[error("Generator error: {0}")]
    Generator(#[source] anyhow::Error),
    /// The statement was already proved right after loading.
    #[error("Statement already proved after loading: {0}")]
    AlreadyProved(String),
}

impl SearchError {
    /// Result bucket for evaluation summaries.
    pub fn kind(&self) -> &str {
        match self {
            SearchError::Session(e) => e.kind(),
            SearchError::Generator(_) => "generator-error",
            SearchError::AlreadyProved(_) => "already-proved",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SearchError::Session(e) if e.is_timeout())
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A session holding named proof states.
///
/// State names are opaque keys: every operation that creates a state takes
/// the name to store it under, and existing states are never modified.
#[async_trait]
pub trait ProofSession: Send {
    /// Load `theory_path` up to the transition `until` (inclusive or not),
    /// storing the resulting state as `new_state`.
    async fn load_theory(
        &mut self,
        theory_path: &Path,
        until: &str,
        inclusive: bool,
        new_state: &str,
    ) -> Result<StepOutcome, SearchError>;

    /// Execute `step` against `state`, storing the result as `new_state`.
    async fn execute(
        &mut self,
        state: &str,
        step: &str,
        new_state: &str,
    ) -> Result<StepOutcome, SearchError>;

    /// Run the automated search on `state` and return the proof text it found.
    async fn hammer(&mut self, state: &str, deleted_facts: &[String]) -> Result<String, SearchError>;

    async fn describe_state(&mut self, state: &str) -> Result<String, SearchError>;

    /// Release the session.
    async fn close(self: Box<Self>) -> Result<(), SearchError>;
}

/// Opens a session able to load a given theory.
#[async_trait]
pub trait ProofEnvironment: Send + Sync {
    async fn open(&self, theory_path: &Path) -> Result<Box<dyn ProofSession>, SearchError>;
}

/// Proposes proof steps for the current goals.
#[async_trait]
pub trait StepGenerator: Send + Sync {
    /// Candidates for the next step, best first. May be empty.
    ///
    /// `previous_step` is the statement itself before the first step.
    async fn generate(
        &self,
        previous_step: &str,
        goals: &str,
    ) -> Result<Vec<GeneratedStep>, SearchError>;
}

// ---------------------------------------------------------------------------
// GreedySearch
// ---------------------------------------------------------------------------

/// Greedy search: at every step execute the generator's top candidate.
///
/// Ends with `Success` when a step completes the proof, `Failure` when the
/// generator proposes nothing or a step leaves the goals unchanged, and
/// `Timeout` once the budget is spent. The deadline is checked before each
/// step, so a step started before the deadline always runs to completion
/// (bounded only by the session's own per-call timeout).
#[derive(Clone)]
pub struct GreedySearch {
    config: SearchConfig,
}

impl GreedySearch {
    pub fn new(config: SearchConfig) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search for a proof of `statement` inside `theory_path`, on an open session.
    pub async fn search_one(
        &self,
        session: &mut dyn ProofSession,
        generator: &dyn StepGenerator,
        theory_path: &Path,
        statement: &str,
    ) -> Result<SearchResult, SearchError> {
        let load_start = Instant::now();
        let initial_state = self.config.initial_state_name.as_str();
        let loaded = session
            .load_theory(theory_path, statement, true, initial_state)
            .await?;
        if loaded.proof_done {
            return Err(SearchError::AlreadyProved(statement.to_string()));
        }
        let load_time_ms = load_start.elapsed().as_millis() as u64;

        let search_start = Instant::now();
        let budget = Duration::from_secs_f64(self.config.max_proof_search_time_secs.max(0.0));
        let mut trace = SearchTrace::new(initial_state, statement, loaded.goals, search_start + budget);
        let mut steps: Vec<StepRecord> = Vec::new();

        let outcome = loop {
            if trace.expired() {
                tracing::info!(
                    statement,
                    steps = steps.len(),
                    elapsed_s = search_start.elapsed().as_secs_f64(),
                    "Search timed out"
                );
                break SearchOutcome::Timeout;
            }

            tracing::debug!(state = %trace.current_state_name, goals = %trace.previous_goal_description, "Proof state");
            let candidates = generator
                .generate(&trace.previous_step_text, &trace.previous_goal_description)
                .await?;
            let Some(top) = candidates.into_iter().next() else {
                tracing::info!(statement, steps = steps.len(), "Generator returned no candidates");
                break SearchOutcome::Failure(FailureReason::NoCandidates);
            };

            let new_state = trace.child_state_name();
            let executed = if self.config.is_hammer(&top.text) {
                let proof = session
                    .hammer(&trace.current_state_name, &self.config.hammer_deleted_facts)
                    .await?;
                tracing::debug!(state = %trace.current_state_name, proof = %proof, "Hammer found step");
                proof
            } else {
                top.text.clone()
            };

            let result = session
                .execute(&trace.current_state_name, &executed, &new_state)
                .await?;
            tracing::debug!(
                state = %new_state,
                step = %executed,
                score = top.score,
                done = result.proof_done,
                "Executed step"
            );

            steps.push(StepRecord {
                from_state: trace.current_state_name.clone(),
                new_state: new_state.clone(),
                proposed: top.text,
                executed: executed.clone(),
                score: top.score,
                goals_after: result.goals.clone(),
                proof_done: result.proof_done,
            });

            if result.goals == trace.previous_goal_description {
                tracing::info!(statement, state = %new_state, "Proof state unchanged");
                break SearchOutcome::Failure(FailureReason::Stalled);
            }
            if result.proof_done {
                tracing::info!(
                    statement,
                    steps = steps.len(),
                    elapsed_s = search_start.elapsed().as_secs_f64(),
                    "Proof found"
                );
                break SearchOutcome::Success;
            }

            trace.advance(new_state, executed, result.goals);
        };

        Ok(SearchResult {
            statement: statement.to_string(),
            outcome,
            steps,
            load_time_ms,
            search_time_ms: search_start.elapsed().as_millis() as u64,
        })
    }

    /// Open a fresh session for `theory_path`, search, and release the session
    /// on every exit path.
    pub async fn search_in_new_session(
        &self,
        env: &dyn ProofEnvironment,
        generator: &dyn StepGenerator,
        theory_path: &Path,
        statement: &str,
    ) -> Result<SearchResult, SearchError> {
        let mut session = env.open(theory_path).await?;
        let result = self
            .search_one(session.as_mut(), generator, theory_path, statement)
            .await;
        if let Err(e) = session.close().await {
            tracing::warn!(theory = %theory_path.display(), error = %e, "Failed to close session");
        }
        result
    }
}
