use std::path::PathBuf;

/// Errors that can occur while talking to a QIsabelle server.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server could not be reached, or the connection broke mid-request.
    #[error("QIsabelle server unreachable: {0}")]
    Unavailable(String),

    /// The request did not complete within the client-side timeout.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Malformed or unexpected response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server reported an error (failed proof, unknown state, hammer timeout, ...).
    #[error("Isabelle error ({kind}): {desc}")]
    Backend {
        /// Server-side error category, e.g. `"timeout-hard"` or `"not_found"`.
        kind: String,
        /// Human-readable description.
        desc: String,
    },

    /// The session was already closed.
    #[error("Session already closed")]
    Closed,
}

impl SessionError {
    /// Classify this error into a result bucket for reporting.
    ///
    /// Backend errors report their own category; client-side timeouts are
    /// bucketed as `"execution-timeout"`.
    pub fn kind(&self) -> &str {
        match self {
            SessionError::Unavailable(_) => "unavailable",
            SessionError::Timeout(_) => "execution-timeout",
            SessionError::Protocol(_) => "protocol",
            SessionError::Backend { kind, .. } if !kind.is_empty() => kind,
            SessionError::Backend { .. } => "backend-error",
            SessionError::Closed => "closed",
        }
    }

    /// Whether this error is any kind of timeout (client-side or reported by the server).
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout(_)) || self.kind().contains("timeout")
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SessionError::Protocol(format!("Failed to decode response: {e}"))
        } else {
            SessionError::Unavailable(e.to_string())
        }
    }
}

/// Outcome of loading a theory up to a statement, or executing a proof step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    /// True when no goals remain.
    pub proof_done: bool,
    /// Pretty-printed proof goals, e.g. `"proof (prove)\ngoal (1 subgoal):\n 1. ..."`.
    pub goals: String,
}

/// Which Isabelle session the server should start for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionScope {
    /// A named session (e.g. `"HOL"` or an AFP entry) with extra session root directories.
    Named {
        session_name: String,
        session_roots: Vec<PathBuf>,
    },
    /// Whatever session contains the given theory file (path inside the server).
    Theory { theory_path: PathBuf },
}

impl SessionScope {
    /// Short label for log lines.
    pub fn label(&self) -> String {
        match self {
            SessionScope::Named { session_name, .. } => session_name.clone(),
            SessionScope::Theory { theory_path } => theory_path.display().to_string(),
        }
    }
}

/// Connection settings for one QIsabelle server.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SessionConfig {
    /// Host the server listens on.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the server listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server-side timeout for a single Isar transition.
    #[serde(default = "default_per_transition_timeout")]
    pub per_transition_timeout_secs: u64,

    /// Client-side timeout for opening a session (may build a heap image).
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,

    /// Client-side timeout for loading a theory or extracting it.
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,

    /// Client-side timeout for executing one proof step.
    #[serde(default = "default_execute_timeout")]
    pub execute_timeout_secs: u64,

    /// Client-side timeout for one hammer call.
    #[serde(default = "default_hammer_timeout")]
    pub hammer_timeout_secs: u64,
}

impl SessionConfig {
    /// Same settings, bound to a different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// Base URL of the server, e.g. `http://localhost:17000`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            per_transition_timeout_secs: default_per_transition_timeout(),
            open_timeout_secs: default_open_timeout(),
            load_timeout_secs: default_load_timeout(),
            execute_timeout_secs: default_execute_timeout(),
            hammer_timeout_secs: default_hammer_timeout(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    17000
}
fn default_per_transition_timeout() -> u64 {
    60
}
fn default_open_timeout() -> u64 {
    1800
}
fn default_load_timeout() -> u64 {
    900
}
fn default_execute_timeout() -> u64 {
    120
}
fn default_hammer_timeout() -> u64 {
    240
}
