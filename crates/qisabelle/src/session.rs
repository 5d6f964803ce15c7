use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::protocol::{
    parse_response, path_str, Ack, DescribeResult, HammerResult, ProofStateResult,
    QIsabelleRequest,
};
use crate::records::ExtractedTheory;
use crate::types::{SessionConfig, SessionError, SessionScope, StepOutcome};

/// An open Isabelle session on one QIsabelle server.
///
/// The server is single-client: one `QIsabelleSession` per port at a time.
/// Proof states live on the server and are referenced by name; every
/// operation that produces a state takes the name it should be stored under.
///
/// Call [`close`](Self::close) when done. If the handle is dropped while
/// still open (early return, panic unwinding), a close request is sent from
/// a background task on the current tokio runtime.
pub struct QIsabelleSession {
    client: Client,
    base_url: Url,
    config: SessionConfig,
    scope: SessionScope,
    open: bool,
}

impl QIsabelleSession {
    /// Connect to the server and start an Isabelle session for `scope`.
    pub async fn open(config: &SessionConfig, scope: &SessionScope) -> Result<Self, SessionError> {
        let base_url = Url::parse(&config.base_url())
            .map_err(|e| SessionError::Protocol(format!("Invalid server URL: {e}")))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SessionError::Unavailable(format!("Failed to build HTTP client: {e}")))?;

        let mut session = Self {
            client,
            base_url,
            config: config.clone(),
            scope: scope.clone(),
            open: false,
        };

        let request = match scope {
            SessionScope::Named {
                session_name,
                session_roots,
            } => QIsabelleRequest::OpenSession {
                session_name: Some(session_name.clone()),
                session_roots: session_roots.iter().map(|p| path_str(p)).collect(),
                theory_path: None,
                per_transition_timeout: config.per_transition_timeout_secs,
            },
            SessionScope::Theory { theory_path } => QIsabelleRequest::OpenSession {
                session_name: None,
                session_roots: Vec::new(),
                theory_path: Some(path_str(theory_path)),
                per_transition_timeout: config.per_transition_timeout_secs,
            },
        };

        let _: Ack = session.call(&request, config.open_timeout_secs).await?;
        session.open = true;

        tracing::debug!(
            port = config.port,
            scope = %scope.label(),
            "Opened Isabelle session"
        );
        Ok(session)
    }

    /// Port of the server this session is bound to.
    pub fn port(&self) -> u16 {
        self.config.port
    }

    /// Scope the session was opened with.
    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Close the session, releasing the server for the next client.
    pub async fn close(mut self) -> Result<(), SessionError> {
        if !self.open {
            return Ok(());
        }
        let result: Result<Ack, SessionError> = self
            .call(&QIsabelleRequest::CloseSession, self.config.execute_timeout_secs)
            .await;
        self.open = false;
        result?;
        tracing::debug!(port = self.config.port, "Closed Isabelle session");
        Ok(())
    }

    /// Start a new theory importing `imports`, stored as `new_state_name`.
    pub async fn new_theory(
        &mut self,
        theory_name: &str,
        new_state_name: &str,
        imports: &[String],
        only_import_from_session_heap: bool,
    ) -> Result<(), SessionError> {
        let request = QIsabelleRequest::NewTheory {
            theory_name: theory_name.to_string(),
            new_state_name: new_state_name.to_string(),
            imports: imports.to_vec(),
            only_import_from_session_heap,
        };
        let _: Ack = self.call(&request, self.config.load_timeout_secs).await?;
        Ok(())
    }

    /// Load `theory_path` until the transition whose text is `until`,
    /// storing the resulting state as `new_state_name`.
    pub async fn load_theory(
        &mut self,
        theory_path: &Path,
        until: &str,
        inclusive: bool,
        new_state_name: &str,
    ) -> Result<StepOutcome, SessionError> {
        let request = QIsabelleRequest::LoadTheory {
            theory_path: path_str(theory_path),
            until: until.to_string(),
            inclusive,
            new_state_name: new_state_name.to_string(),
        };
        let result: ProofStateResult = self.call(&request, self.config.load_timeout_secs).await?;
        Ok(StepOutcome {
            proof_done: result.is_proof_done,
            goals: result.proof_goals,
        })
    }

    /// Execute Isar code against `state_name`, storing the result as `new_state_name`.
    pub async fn execute(
        &mut self,
        state_name: &str,
        isar_code: &str,
        new_state_name: &str,
    ) -> Result<StepOutcome, SessionError> {
        let request = QIsabelleRequest::Execute {
            state_name: state_name.to_string(),
            isar_code: isar_code.to_string(),
            new_state_name: new_state_name.to_string(),
        };
        let result: ProofStateResult =
            self.call(&request, self.config.execute_timeout_secs).await?;
        Ok(StepOutcome {
            proof_done: result.is_proof_done,
            goals: result.proof_goals,
        })
    }

    /// Run Sledgehammer on `state_name` without the given facts, returning
    /// the proof text it found (e.g. `"by (simp add: prime_nat_iff)"`).
    pub async fn hammer(
        &mut self,
        state_name: &str,
        deleted_facts: &[String],
    ) -> Result<String, SessionError> {
        let request = QIsabelleRequest::Hammer {
            state_name: state_name.to_string(),
            deleted_facts: deleted_facts.to_vec(),
        };
        let result: HammerResult = self.call(&request, self.config.hammer_timeout_secs).await?;
        Ok(result.proof)
    }

    /// Pretty-print a named state.
    pub async fn describe_state(&mut self, state_name: &str) -> Result<String, SessionError> {
        let request = QIsabelleRequest::DescribeState {
            state_name: state_name.to_string(),
        };
        let result: DescribeResult = self.call(&request, self.config.execute_timeout_secs).await?;
        Ok(result.description)
    }

    /// Extract every transition of a theory file together with the state after it.
    pub async fn extract_theory(
        &mut self,
        theory_path: &Path,
    ) -> Result<ExtractedTheory, SessionError> {
        let request = QIsabelleRequest::ExtractTheory {
            theory_path: path_str(theory_path),
        };
        self.call(&request, self.config.load_timeout_secs).await
    }

    /// POST one request and parse the response.
    async fn call<T: DeserializeOwned>(
        &self,
        request: &QIsabelleRequest,
        timeout_secs: u64,
    ) -> Result<T, SessionError> {
        if !self.open && !matches!(request, QIsabelleRequest::OpenSession { .. }) {
            return Err(SessionError::Closed);
        }

        let url = self
            .base_url
            .join(request.endpoint())
            .map_err(|e| SessionError::Protocol(format!("Invalid endpoint: {e}")))?;
        let body = request
            .to_json()
            .map_err(|e| SessionError::Protocol(format!("Serialization error: {e}")))?;

        let response = self
            .client
            .post(url)
            .json(&body)
            .timeout(Duration::from_secs(timeout_secs))
            .send()
            .await
            .map_err(|e| self.transport_error(e, request, timeout_secs))?;

        let status = response.status();
        // The timeout also covers reading the body.
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, request, timeout_secs))?;
        match parse_response(&text) {
            Err(SessionError::Protocol(msg)) if !status.is_success() => Err(
                SessionError::Protocol(format!("HTTP {status} from {}: {msg}", request.endpoint())),
            ),
            other => other,
        }
    }

    fn transport_error(
        &self,
        e: reqwest::Error,
        request: &QIsabelleRequest,
        timeout_secs: u64,
    ) -> SessionError {
        if e.is_timeout() {
            tracing::warn!(
                port = self.config.port,
                endpoint = request.endpoint(),
                timeout_secs,
                "QIsabelle request timed out"
            );
            SessionError::Timeout(timeout_secs)
        } else {
            SessionError::from(e)
        }
    }
}

impl Drop for QIsabelleSession {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let Ok(url) = self.base_url.join(QIsabelleRequest::CloseSession.endpoint()) else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let port = self.config.port;
                handle.spawn(async move {
                    if let Err(e) = client.post(url).json(&serde_json::json!({})).send().await {
                        tracing::warn!(port, error = %e, "Failed to close dropped Isabelle session");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    port = self.config.port,
                    "Isabelle session dropped outside a runtime; server keeps it open"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_fails_when_server_unreachable() {
        // Port 9 (discard) on localhost is not an HTTP server.
        let config = SessionConfig {
            port: 9,
            open_timeout_secs: 2,
            ..SessionConfig::default()
        };
        let scope = SessionScope::Named {
            session_name: "HOL".into(),
            session_roots: vec![],
        };
        let result = QIsabelleSession::open(&config, &scope).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stalled_response_body_is_timeout() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Sends headers and part of the body, then holds the connection.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 64\r\n\r\n{\"succ")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = SessionConfig {
            host: "127.0.0.1".into(),
            port,
            open_timeout_secs: 1,
            ..SessionConfig::default()
        };
        let scope = SessionScope::Named {
            session_name: "HOL".into(),
            session_roots: vec![],
        };
        let err = QIsabelleSession::open(&config, &scope).await.err().unwrap();
        assert!(matches!(err, SessionError::Timeout(1)), "got {err:?}");
        assert_eq!(err.kind(), "execution-timeout");
        server.abort();
    }
}
