//! Bridges between search traits and the QIsabelle client.

use std::path::Path;

use async_trait::async_trait;
use qisabelle::{QIsabelleSession, SessionConfig, SessionScope, StepOutcome};

use crate::engine::{ProofEnvironment, ProofSession, SearchError, StepGenerator};
use crate::types::GeneratedStep;

// ---------------------------------------------------------------------------
// HammerOnlyGenerator: always defers to Sledgehammer
// ---------------------------------------------------------------------------

/// A generator that proposes the hammer token at every step.
///
/// Baseline for evaluating the harness itself: the search degenerates into
/// repeated Sledgehammer calls. No model server needed.
pub struct HammerOnlyGenerator {
    token: String,
}

impl HammerOnlyGenerator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl StepGenerator for HammerOnlyGenerator {
    async fn generate(
        &self,
        _previous_step: &str,
        _goals: &str,
    ) -> Result<Vec<GeneratedStep>, SearchError> {
        Ok(vec![GeneratedStep {
            text: self.token.clone(),
            score: 0.0,
        }])
    }
}

// ---------------------------------------------------------------------------
// ProofSession for QIsabelleSession
// ---------------------------------------------------------------------------

#[async_trait]
impl ProofSession for QIsabelleSession {
    async fn load_theory(
        &mut self,
        theory_path: &Path,
        until: &str,
        inclusive: bool,
        new_state: &str,
    ) -> Result<StepOutcome, SearchError> {
        Ok(QIsabelleSession::load_theory(self, theory_path, until, inclusive, new_state).await?)
    }

    async fn execute(
        &mut self,
        state: &str,
        step: &str,
        new_state: &str,
    ) -> Result<StepOutcome, SearchError> {
        Ok(QIsabelleSession::execute(self, state, step, new_state).await?)
    }

    async fn hammer(&mut self, state: &str, deleted_facts: &[String]) -> Result<String, SearchError> {
        Ok(QIsabelleSession::hammer(self, state, deleted_facts).await?)
    }

    async fn describe_state(&mut self, state: &str) -> Result<String, SearchError> {
        Ok(QIsabelleSession::describe_state(self, state).await?)
    }

    async fn close(self: Box<Self>) -> Result<(), SearchError> {
        Ok(QIsabelleSession::close(*self).await?)
    }
}

// ---------------------------------------------------------------------------
// QIsabelleEnvironment
// ---------------------------------------------------------------------------

/// Opens one session per theory on a QIsabelle server, scoped to the theory
/// file (its directory becomes the session root).
pub struct QIsabelleEnvironment {
    config: SessionConfig,
}

impl QIsabelleEnvironment {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProofEnvironment for QIsabelleEnvironment {
    async fn open(&self, theory_path: &Path) -> Result<Box<dyn ProofSession>, SearchError> {
        let scope = SessionScope::Theory {
            theory_path: theory_path.to_path_buf(),
        };
        let session = QIsabelleSession::open(&self.config, &scope).await?;
        tracing::debug!(port = self.config.port, theory = %theory_path.display(), "Session ready");
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hammer_only_always_proposes_token() {
        let generator = HammerOnlyGenerator::new("normalhammer");
        for goals in ["", "goal (1 subgoal):\n 1. x = x"] {
            let steps = generator.generate("lemma x", goals).await.unwrap();
            assert_eq!(steps.len(), 1);
            assert_eq!(steps[0].text, "normalhammer");
        }
    }

    #[tokio::test]
    async fn test_environment_unreachable_server_is_session_error() {
        let env = QIsabelleEnvironment::new(SessionConfig {
            port: 9,
            open_timeout_secs: 2,
            ..SessionConfig::default()
        });
        let result = env.open(Path::new("/afp/thys/Foo/Foo.thy")).await;
        assert!(matches!(result, Err(SearchError::Session(_))));
    }
}
