//! Greedy, bounded-time proof search driven by a pluggable step generator.
//!
//! The search loads a theory up to a target statement, then repeatedly asks a
//! [`StepGenerator`] for the next step and executes the top candidate against
//! the current named state. A reserved token hands the step over to
//! Sledgehammer. Uses trait-based abstraction so the loop can be tested with
//! mocks (no Isabelle, no model).
//!
//! # Key types
//!
//! - [`GreedySearch`]: the search driver
//! - [`SearchConfig`]: configuration loaded from TOML
//! - [`ProofSession`] / [`ProofEnvironment`]: traits for Isabelle interaction
//! - [`StepGenerator`]: trait for step proposal
//! - [`SearchResult`] / [`SearchOutcome`]: what happened
//! - [`TestCase`]: evaluation input

pub mod adapters;
pub mod cases;
pub mod config;
pub mod engine;
pub mod mocks;
pub mod types;

pub use adapters::{HammerOnlyGenerator, QIsabelleEnvironment};
pub use cases::{load_test_cases, CasesError, TestCase};
pub use config::SearchConfig;
pub use engine::{GreedySearch, ProofEnvironment, ProofSession, SearchError, StepGenerator};
pub use types::{
    FailureReason, GeneratedStep, SearchOutcome, SearchResult, SearchTrace, StepRecord,
};
