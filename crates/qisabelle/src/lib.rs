//! Async client for the QIsabelle server.
//!
//! A QIsabelle server wraps one Isabelle process behind an HTTP/JSON API.
//! Proof states are kept server-side in a table of named states: loading a
//! theory, creating a new theory or executing Isar code each store their
//! result under a caller-chosen name, which later requests refer to.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use qisabelle::{QIsabelleSession, SessionConfig, SessionScope};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::default();
//! let thy = PathBuf::from("/home/isabelle/Isabelle/src/HOL/Examples/Seq.thy");
//! let scope = SessionScope::Theory { theory_path: thy.clone() };
//!
//! let mut session = QIsabelleSession::open(&config, &scope).await?;
//! let lemma = r#"lemma reverse_reverse: "reverse (reverse xs) = xs""#;
//! let start = session.load_theory(&thy, lemma, true, "state0").await?;
//! assert!(!start.proof_done);
//!
//! let step = session
//!     .execute("state0", "by (induct xs) (simp_all add: reverse_conc)", "state1")
//!     .await?;
//! assert!(step.proof_done);
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod protocol;
pub mod records;
pub mod session;
pub mod types;

pub use protocol::{QIsabelleError, QIsabelleRequest};
pub use records::{ExtractedTheory, Extraction, Position, State, Theory, Transition};
pub use session::QIsabelleSession;
pub use types::{SessionConfig, SessionError, SessionScope, StepOutcome};
