//! Records returned by `extractTheory`: one entry per Isar transition, with
//! the toplevel state right after it.

use serde::{Deserialize, Serialize};

/// Header information of an extracted theory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theory {
    /// Path to the `.thy` file, as seen by the server.
    pub path: String,
    /// Isabelle session the theory was run in.
    pub session_name: String,
    /// Theory name from the header.
    pub name: String,
    /// Imports as written in the header (names or paths).
    pub imports: Vec<String>,
    /// Imports resolved to theory names.
    pub import_names: Vec<String>,
}

/// Source position of a transition.
///
/// Offsets count Isabelle symbols (not bytes) from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Line number, starting from 1.
    pub line: u32,
    /// Start offset (inclusive).
    pub offset: u32,
    /// End offset (exclusive).
    pub end_offset: u32,
}

/// A single Isar transition (command) of the theory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Command keyword: `"lemma"`, `"by"`, `"definition"`, `"<ignored>"`, ...
    pub name: String,
    /// Source text of the transition.
    pub text: String,
    pub position: Position,
}

/// Toplevel state after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// One of `Toplevel`, `Theory`, `LocalTheory`, `Proof`, `SkippedProof`.
    pub mode: String,
    /// Pretty-printed proof state (empty outside proofs).
    pub proof_state: String,
    /// Local theory description, e.g. `"theory Foo"` or `"locale foo"`.
    pub local_theory: String,
    /// Number of open proof blocks (zero outside proofs).
    pub proof_level: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub transition: Transition,
    pub state: State,
}

/// Everything extracted from one theory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTheory {
    pub theory: Theory,
    pub extractions: Vec<Extraction>,
}

impl ExtractedTheory {
    /// Number of transitions that leave the toplevel inside a proof.
    pub fn proof_states(&self) -> usize {
        self.extractions
            .iter()
            .filter(|e| e.state.proof_level > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "theory": {
            "path": "/afp/thys/Foo/Bar.thy",
            "sessionName": "Foo",
            "name": "Bar",
            "imports": ["Main"],
            "importNames": ["Main"]
        },
        "extractions": [
            {
                "transition": {"name": "theory", "text": "theory Bar imports Main begin",
                               "position": {"line": 1, "offset": 1, "endOffset": 30}},
                "state": {"mode": "Theory", "proofState": "", "localTheory": "theory Bar", "proofLevel": 0}
            },
            {
                "transition": {"name": "lemma", "text": "lemma foo: \"x = x\"",
                               "position": {"line": 3, "offset": 32, "endOffset": 50}},
                "state": {"mode": "Proof", "proofState": "proof (prove)\ngoal (1 subgoal):\n 1. x = x",
                          "localTheory": "theory Bar", "proofLevel": 1}
            }
        ]
    }"#;

    #[test]
    fn deserialize_extracted_theory() {
        let thy: ExtractedTheory = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(thy.theory.session_name, "Foo");
        assert_eq!(thy.theory.import_names, vec!["Main"]);
        assert_eq!(thy.extractions.len(), 2);
        assert_eq!(thy.extractions[1].transition.name, "lemma");
        assert_eq!(thy.extractions[1].transition.position.end_offset, 50);
        assert_eq!(thy.proof_states(), 1);
    }

    #[test]
    fn serialize_uses_camel_case() {
        let thy: ExtractedTheory = serde_json::from_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&thy).unwrap();
        assert!(json.contains("\"sessionName\""));
        assert!(json.contains("\"endOffset\""));
        assert!(json.contains("\"proofLevel\""));
        assert!(!json.contains("\"proof_level\""));
    }
}
