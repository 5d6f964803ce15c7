/// Greedy search configuration loaded from TOML.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SearchConfig {
    /// Wall-clock budget per statement, in seconds, measured from the moment
    /// the theory has been loaded up to the statement. Checked once per step.
    #[serde(default = "default_max_proof_search_time")]
    pub max_proof_search_time_secs: f64,

    /// Candidate text that is replaced by the automated search (Sledgehammer)
    /// result for the current state.
    #[serde(default = "default_hammer_token")]
    pub hammer_token: String,

    /// Facts hidden from the automated search.
    #[serde(default)]
    pub hammer_deleted_facts: Vec<String>,

    /// Name under which the state right after the statement is stored.
    /// Each step stores its result under `{parent}.0`.
    #[serde(default = "default_initial_state_name")]
    pub initial_state_name: String,
}

fn default_max_proof_search_time() -> f64 {
    500.0
}
fn default_hammer_token() -> String {
    "normalhammer".to_string()
}
fn default_initial_state_name() -> String {
    "s".to_string()
}

impl SearchConfig {
    /// Log a warning for settings that make every search end immediately.
    pub fn validate(&self) {
        if self.max_proof_search_time_secs <= 0.0 {
            tracing::warn!(
                max_proof_search_time_secs = self.max_proof_search_time_secs,
                "Non-positive search budget; every search will time out before the first step"
            );
        }
        if self.hammer_token.trim().is_empty() {
            tracing::warn!("Empty hammer token; blank candidates will trigger Sledgehammer");
        }
    }

    /// Whether `step` is the automated-search token.
    pub fn is_hammer(&self, step: &str) -> bool {
        step.trim() == self.hammer_token
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_proof_search_time_secs: default_max_proof_search_time(),
            hammer_token: default_hammer_token(),
            hammer_deleted_facts: Vec::new(),
            initial_state_name: default_initial_state_name(),
        }
    }
}
