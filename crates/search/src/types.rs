//! Candidate steps, per-run trace and results of the greedy search.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A candidate proof step proposed by a [`StepGenerator`](crate::StepGenerator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedStep {
    /// Isar text, or the hammer token.
    pub text: String,
    /// Generator score; higher is better. Only informational.
    pub score: f64,
}

/// Why a search ended without a proof before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The generator proposed nothing.
    NoCandidates,
    /// A step left the goals textually unchanged.
    Stalled,
}

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    Success,
    Failure(FailureReason),
    Timeout,
}

impl SearchOutcome {
    /// Result bucket name used in evaluation summaries.
    pub fn bucket(&self) -> &'static str {
        match self {
            SearchOutcome::Success => "success",
            SearchOutcome::Failure(_) => "failure",
            SearchOutcome::Timeout => "timeout",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SearchOutcome::Success)
    }
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// State the step was executed against.
    pub from_state: String,
    /// State the result was stored under.
    pub new_state: String,
    /// Candidate text as proposed by the generator.
    pub proposed: String,
    /// Text actually executed (differs from `proposed` for hammer steps).
    pub executed: String,
    pub score: f64,
    /// Goals after the step.
    pub goals_after: String,
    pub proof_done: bool,
}

/// Result of one greedy search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The statement searched for.
    pub statement: String,
    pub outcome: SearchOutcome,
    /// Executed steps in order.
    pub steps: Vec<StepRecord>,
    /// Time spent loading the theory up to the statement.
    pub load_time_ms: u64,
    /// Time spent in the step loop.
    pub search_time_ms: u64,
}

impl SearchResult {
    /// The executed proof text, if the search succeeded.
    pub fn proof(&self) -> Option<Vec<String>> {
        self.outcome
            .is_success()
            .then(|| self.steps.iter().map(|s| s.executed.clone()).collect())
    }
}

/// Mutable state of one search invocation. Never persisted.
#[derive(Debug, Clone)]
pub struct SearchTrace {
    pub current_state_name: String,
    pub previous_step_text: String,
    pub previous_goal_description: String,
    pub deadline: Instant,
}

impl SearchTrace {
    pub fn new(initial_state: &str, statement: &str, goals: String, deadline: Instant) -> Self {
        Self {
            current_state_name: initial_state.to_string(),
            previous_step_text: statement.to_string(),
            previous_goal_description: goals,
            deadline,
        }
    }

    /// Name for the state produced by the next step: `{current}.0`.
    pub fn child_state_name(&self) -> String {
        format!("{}.0", self.current_state_name)
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Move to the state produced by a step.
    pub fn advance(&mut self, new_state: String, step: String, goals: String) {
        self.current_state_name = new_state;
        self.previous_step_text = step;
        self.previous_goal_description = goals;
    }
}
