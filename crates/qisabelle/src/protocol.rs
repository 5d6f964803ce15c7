use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::SessionError;

/// A request to send to the QIsabelle server.
///
/// Each variant is POSTed as a JSON object to `/<endpoint>`.
#[derive(Debug, Clone)]
pub enum QIsabelleRequest {
    /// Start an Isabelle session for this connection.
    OpenSession {
        session_name: Option<String>,
        session_roots: Vec<String>,
        theory_path: Option<String>,
        per_transition_timeout: u64,
    },
    /// Stop the session and release its heap.
    CloseSession,
    /// Start a fresh theory with the given imports.
    NewTheory {
        theory_name: String,
        new_state_name: String,
        imports: Vec<String>,
        only_import_from_session_heap: bool,
    },
    /// Load a theory file until a statement is reached.
    LoadTheory {
        theory_path: String,
        until: String,
        inclusive: bool,
        new_state_name: String,
    },
    /// Run Isar code against a named state.
    Execute {
        state_name: String,
        isar_code: String,
        new_state_name: String,
    },
    /// Run Sledgehammer against a named state.
    Hammer {
        state_name: String,
        deleted_facts: Vec<String>,
    },
    /// Print a named state.
    DescribeState { state_name: String },
    /// Extract all transitions and states of a theory file.
    ExtractTheory { theory_path: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_name: Option<&'a str>,
    session_roots: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    theory_path: Option<&'a str>,
    per_transition_timeout: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTheoryPayload<'a> {
    theory_name: &'a str,
    new_state_name: &'a str,
    imports: &'a [String],
    only_import_from_session_heap: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadTheoryPayload<'a> {
    theory_path: &'a str,
    until: &'a str,
    inclusive: bool,
    new_state_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecutePayload<'a> {
    state_name: &'a str,
    isar_code: &'a str,
    new_state_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HammerPayload<'a> {
    state_name: &'a str,
    added_facts: &'a [String],
    deleted_facts: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatePayload<'a> {
    state_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TheoryPathPayload<'a> {
    theory_path: &'a str,
}

impl QIsabelleRequest {
    /// Endpoint path relative to the server root.
    pub fn endpoint(&self) -> &'static str {
        match self {
            QIsabelleRequest::OpenSession { .. } => "openIsabelleSession",
            QIsabelleRequest::CloseSession => "closeIsabelleSession",
            QIsabelleRequest::NewTheory { .. } => "newTheory",
            QIsabelleRequest::LoadTheory { .. } => "loadTheory",
            QIsabelleRequest::Execute { .. } => "execute",
            QIsabelleRequest::Hammer { .. } => "hammer",
            QIsabelleRequest::DescribeState { .. } => "describeState",
            QIsabelleRequest::ExtractTheory { .. } => "extractTheory",
        }
    }

    /// Serialize the request body.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            QIsabelleRequest::OpenSession {
                session_name,
                session_roots,
                theory_path,
                per_transition_timeout,
            } => serde_json::to_value(OpenSessionPayload {
                session_name: session_name.as_deref(),
                session_roots,
                theory_path: theory_path.as_deref(),
                per_transition_timeout: *per_transition_timeout,
            }),
            QIsabelleRequest::CloseSession => Ok(serde_json::json!({})),
            QIsabelleRequest::NewTheory {
                theory_name,
                new_state_name,
                imports,
                only_import_from_session_heap,
            } => serde_json::to_value(NewTheoryPayload {
                theory_name,
                new_state_name,
                imports,
                only_import_from_session_heap: *only_import_from_session_heap,
            }),
            QIsabelleRequest::LoadTheory {
                theory_path,
                until,
                inclusive,
                new_state_name,
            } => serde_json::to_value(LoadTheoryPayload {
                theory_path,
                until,
                inclusive: *inclusive,
                new_state_name,
            }),
            QIsabelleRequest::Execute {
                state_name,
                isar_code,
                new_state_name,
            } => serde_json::to_value(ExecutePayload {
                state_name,
                isar_code,
                new_state_name,
            }),
            QIsabelleRequest::Hammer {
                state_name,
                deleted_facts,
            } => serde_json::to_value(HammerPayload {
                state_name,
                added_facts: &[],
                deleted_facts,
            }),
            QIsabelleRequest::DescribeState { state_name } => {
                serde_json::to_value(StatePayload { state_name })
            }
            QIsabelleRequest::ExtractTheory { theory_path } => {
                serde_json::to_value(TheoryPathPayload { theory_path })
            }
        }
    }
}

/// Path as a string for the wire; the server runs on Linux.
pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// --- Response types ---

/// Error response from the server.
#[derive(Debug, Clone, Deserialize)]
pub struct QIsabelleError {
    /// Error category, e.g. `"timeout-soft"`, `"not_found"`, `"failed-proof"`.
    pub error: String,
    /// Error description (usually the Scala/ML exception message).
    #[serde(default)]
    pub desc: String,
}

/// Response to `openIsabelleSession`, `closeIsabelleSession` and `newTheory`.
#[derive(Debug, Clone, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub success: String,
}

/// Response to `loadTheory` and `execute`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofStateResult {
    pub is_proof_done: bool,
    #[serde(default)]
    pub proof_goals: String,
}

/// Response to `hammer`.
#[derive(Debug, Clone, Deserialize)]
pub struct HammerResult {
    pub proof: String,
}

/// Response to `describeState`.
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeResult {
    pub description: String,
}

/// Parse a response body, turning `{"error": ..., "desc": ...}` objects into
/// [`SessionError::Backend`].
pub fn parse_response<T: DeserializeOwned>(body: &str) -> Result<T, SessionError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SessionError::Protocol(format!("Invalid JSON: {e}. Raw: {body}")))?;

    if value.get("error").is_some() {
        let err: QIsabelleError = serde_json::from_value(value)
            .map_err(|e| SessionError::Protocol(format!("Failed to parse error: {e}")))?;
        return Err(SessionError::Backend {
            kind: err.error,
            desc: err.desc,
        });
    }

    serde_json::from_value(value)
        .map_err(|e| SessionError::Protocol(format!("Unexpected response: {e}. Raw: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_open_named_session() {
        let req = QIsabelleRequest::OpenSession {
            session_name: Some("HOL".into()),
            session_roots: vec!["/afp/thys".into()],
            theory_path: None,
            per_transition_timeout: 60,
        };
        let json = req.to_json().unwrap();
        assert_eq!(req.endpoint(), "openIsabelleSession");
        assert_eq!(json["sessionName"], "HOL");
        assert_eq!(json["sessionRoots"][0], "/afp/thys");
        assert_eq!(json["perTransitionTimeout"], 60);
        assert!(json.get("theoryPath").is_none());
    }

    #[test]
    fn serialize_open_theory_session() {
        let req = QIsabelleRequest::OpenSession {
            session_name: None,
            session_roots: vec![],
            theory_path: Some("/afp/thys/Foo/Bar.thy".into()),
            per_transition_timeout: 60,
        };
        let json = req.to_json().unwrap();
        assert!(json.get("sessionName").is_none());
        assert_eq!(json["theoryPath"], "/afp/thys/Foo/Bar.thy");
    }

    #[test]
    fn serialize_execute_uses_camel_case() {
        let req = QIsabelleRequest::Execute {
            state_name: "s".into(),
            isar_code: "by simp".into(),
            new_state_name: "s.0".into(),
        };
        let json = req.to_json().unwrap();
        assert_eq!(req.endpoint(), "execute");
        assert_eq!(json["stateName"], "s");
        assert_eq!(json["isarCode"], "by simp");
        assert_eq!(json["newStateName"], "s.0");
        assert!(json.get("state_name").is_none());
    }

    #[test]
    fn serialize_hammer_with_deleted_facts() {
        let req = QIsabelleRequest::Hammer {
            state_name: "state1".into(),
            deleted_facts: vec!["prime_gt_1_nat".into()],
        };
        let json = req.to_json().unwrap();
        assert_eq!(json["deletedFacts"][0], "prime_gt_1_nat");
        assert!(json["addedFacts"].as_array().unwrap().is_empty());
    }

    #[test]
    fn serialize_close_is_empty_object() {
        let json = QIsabelleRequest::CloseSession.to_json().unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn parse_proof_state_result() {
        let body = r#"{"isProofDone": false, "proofGoals": "proof (prove)\ngoal (1 subgoal):\n 1. p > 1"}"#;
        let r: ProofStateResult = parse_response(body).unwrap();
        assert!(!r.is_proof_done);
        assert!(r.proof_goals.starts_with("proof (prove)"));
    }

    #[test]
    fn parse_proof_done_without_goals() {
        let r: ProofStateResult = parse_response(r#"{"isProofDone": true}"#).unwrap();
        assert!(r.is_proof_done);
        assert!(r.proof_goals.is_empty());
    }

    #[test]
    fn parse_error_response() {
        let body = r#"{"error": "timeout-soft", "desc": "Sledgehammer: soft timeout"}"#;
        let err = parse_response::<HammerResult>(body).unwrap_err();
        match err {
            SessionError::Backend { kind, desc } => {
                assert_eq!(kind, "timeout-soft");
                assert!(desc.contains("soft timeout"));
            }
            other => panic!("expected Backend error, got {other:?}"),
        }
    }

    #[test]
    fn parse_malformed_json() {
        let err = parse_response::<Ack>("not json {{").unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[test]
    fn parse_wrong_shape() {
        let err = parse_response::<HammerResult>(r#"{"description": "x"}"#).unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }
}
