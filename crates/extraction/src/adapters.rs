//! Bridges the scheduler traits to the real QIsabelle client.

use std::path::PathBuf;

use async_trait::async_trait;
use qisabelle::{ExtractedTheory, QIsabelleSession, SessionConfig, SessionError, SessionScope};

use crate::types::{ItemRef, WorkUnit};
use crate::worker::{ExtractionSession, SessionOpener};

/// Worker ports past `u16::MAX`.
#[derive(Debug, thiserror::Error)]
#[error("{workers} workers from base port {base} exceed port 65535")]
pub struct PortRangeError {
    pub base: u16,
    pub workers: usize,
}

/// Opens named Isabelle sessions (one per unit) on a single QIsabelle server.
#[derive(Debug)]
pub struct QIsabelleOpener {
    config: SessionConfig,
    session_roots: Vec<PathBuf>,
}

impl QIsabelleOpener {
    pub fn new(config: SessionConfig, session_roots: Vec<PathBuf>) -> Self {
        Self {
            config,
            session_roots,
        }
    }

    /// One opener per port `base.port + i`, `i < workers`.
    ///
    /// Fails if the last port does not fit in a `u16`.
    pub fn pool(
        base: &SessionConfig,
        workers: usize,
        session_roots: &[PathBuf],
    ) -> Result<Vec<Self>, PortRangeError> {
        (0..workers)
            .map(|i| {
                let port = u16::try_from(i)
                    .ok()
                    .and_then(|offset| base.port.checked_add(offset))
                    .ok_or(PortRangeError {
                        base: base.port,
                        workers,
                    })?;
                Ok(Self::new(base.with_port(port), session_roots.to_vec()))
            })
            .collect()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[async_trait]
impl SessionOpener for QIsabelleOpener {
    fn label(&self) -> String {
        self.config.port.to_string()
    }

    async fn open(&self, unit: &WorkUnit) -> Result<Box<dyn ExtractionSession>, SessionError> {
        let scope = SessionScope::Named {
            session_name: unit.id.clone(),
            session_roots: self.session_roots.clone(),
        };
        let session = QIsabelleSession::open(&self.config, &scope).await?;
        Ok(Box::new(session))
    }
}

#[async_trait]
impl ExtractionSession for QIsabelleSession {
    async fn extract(&mut self, item: &ItemRef) -> Result<ExtractedTheory, SessionError> {
        tracing::debug!(port = self.port(), item = %item.id, path = %item.backend_path.display(), "Extracting theory");
        self.extract_theory(&item.backend_path).await
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        QIsabelleSession::close(*self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_assigns_consecutive_ports() {
        let base = SessionConfig::default();
        let pool = QIsabelleOpener::pool(&base, 3, &[PathBuf::from("/afp/thys")]).unwrap();
        let ports: Vec<u16> = pool.iter().map(|o| o.config().port).collect();
        assert_eq!(ports, vec![base.port, base.port + 1, base.port + 2]);
        assert_eq!(pool[1].label(), (base.port + 1).to_string());
    }

    #[test]
    fn pool_rejects_ports_past_u16_max() {
        let base = SessionConfig::default().with_port(65534);
        let pool = QIsabelleOpener::pool(&base, 2, &[]).unwrap();
        let ports: Vec<u16> = pool.iter().map(|o| o.config().port).collect();
        assert_eq!(ports, vec![65534, 65535]);

        let err = QIsabelleOpener::pool(&base, 3, &[]).unwrap_err();
        assert_eq!(err.base, 65534);
        assert_eq!(err.workers, 3);
        assert!(err.to_string().contains("65535"));
    }
}
