//! TOML config loading for the harness CLI.
//!
//! Deserializes `configs/harness.toml` which has `[session]`, `[search]` and
//! `[extraction]` sections, then merges with environment and CLI overrides.

use std::path::{Path, PathBuf};

use extraction::ExtractionPaths;
use qisabelle::SessionConfig;
use search::SearchConfig;
use serde::Deserialize;

/// Environment variable naming the AFP checkout on the host.
pub const AFP_DIR_ENV: &str = "AFP_DIR";
/// Environment variable naming the Isabelle distribution on the host.
pub const ISABELLE_DIR_ENV: &str = "ISABELLE_DIR";

/// Top-level structure matching `configs/harness.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct HarnessToml {
    /// QIsabelle server connection; `port` is the base port for worker pools.
    #[serde(default)]
    pub session: SessionConfig,
    /// Greedy search parameters.
    #[serde(default)]
    pub search: SearchConfig,
    /// Corpus locations and worker count.
    #[serde(default)]
    pub extraction: ExtractionToml,
}

/// The `[extraction]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionToml {
    /// AFP checkout on the host (contains `thys/ROOTS`).
    #[serde(default = "default_afp_dir")]
    pub afp_dir: PathBuf,
    /// Isabelle distribution on the host (contains `src/HOL`).
    #[serde(default = "default_isabelle_dir")]
    pub isabelle_dir: PathBuf,
    /// Checkpoint store root.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Number of workers, one QIsabelle server each.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Also extract the HOL session from the Isabelle sources.
    #[serde(default)]
    pub include_hol: bool,
    /// AFP checkout as mounted in the backend.
    #[serde(default = "default_backend_afp_root")]
    pub backend_afp_root: PathBuf,
    /// Isabelle distribution as mounted in the backend.
    #[serde(default = "default_backend_isabelle_root")]
    pub backend_isabelle_root: PathBuf,
}

impl Default for ExtractionToml {
    fn default() -> Self {
        Self {
            afp_dir: default_afp_dir(),
            isabelle_dir: default_isabelle_dir(),
            output_dir: default_output_dir(),
            num_workers: default_num_workers(),
            include_hol: false,
            backend_afp_root: default_backend_afp_root(),
            backend_isabelle_root: default_backend_isabelle_root(),
        }
    }
}

fn default_afp_dir() -> PathBuf {
    PathBuf::from("afp")
}
fn default_isabelle_dir() -> PathBuf {
    PathBuf::from("isabelle")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("extractions")
}
fn default_num_workers() -> usize {
    4
}
fn default_backend_afp_root() -> PathBuf {
    PathBuf::from("/afp")
}
fn default_backend_isabelle_root() -> PathBuf {
    PathBuf::from("/home/isabelle/Isabelle")
}

/// Load and deserialize a `HarnessToml` from a TOML file.
pub fn load_harness_toml(path: &Path) -> anyhow::Result<HarnessToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: HarnessToml = toml::from_str(&contents)?;
    config.search.validate();
    if config.extraction.num_workers == 0 {
        tracing::warn!("extraction.num_workers is 0; extraction will refuse to start");
    }
    tracing::info!(path = %path.display(), "Loaded harness config");
    Ok(config)
}

/// Path overrides given on the command line.
#[derive(Debug, Default, Clone)]
pub struct PathOverrides {
    pub afp_dir: Option<PathBuf>,
    pub isabelle_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

/// Build `ExtractionPaths` from TOML, environment and CLI flags.
///
/// Priority chain: defaults < TOML values < `AFP_DIR`/`ISABELLE_DIR` < CLI.
/// Relative paths are resolved against `base_dir`.
pub fn build_extraction_paths(
    section: &ExtractionToml,
    env: impl Fn(&str) -> Option<String>,
    cli: &PathOverrides,
    base_dir: &Path,
) -> ExtractionPaths {
    let mut afp_dir = section.afp_dir.clone();
    let mut isabelle_dir = section.isabelle_dir.clone();
    let mut output_dir = section.output_dir.clone();

    // Environment overrides
    if let Some(dir) = env(AFP_DIR_ENV).filter(|v| !v.is_empty()) {
        afp_dir = PathBuf::from(dir);
    }
    if let Some(dir) = env(ISABELLE_DIR_ENV).filter(|v| !v.is_empty()) {
        isabelle_dir = PathBuf::from(dir);
    }

    // CLI overrides take highest priority
    if let Some(dir) = &cli.afp_dir {
        afp_dir = dir.clone();
    }
    if let Some(dir) = &cli.isabelle_dir {
        isabelle_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        output_dir = dir.clone();
    }

    let mut paths = ExtractionPaths::new(
        resolve(base_dir, afp_dir),
        resolve(base_dir, isabelle_dir),
        resolve(base_dir, output_dir),
    );
    paths.backend_afp_root = section.backend_afp_root.clone();
    paths.backend_isabelle_root = section.backend_isabelle_root.clone();
    paths
}

/// Session config with CLI overrides for port and per-transition timeout.
pub fn build_session_config(
    section: &SessionConfig,
    port_cli: Option<u16>,
    per_transition_timeout_cli: Option<u64>,
) -> SessionConfig {
    let mut config = section.clone();
    if let Some(port) = port_cli {
        config.port = port;
    }
    if let Some(secs) = per_transition_timeout_cli {
        config.per_transition_timeout_secs = secs;
    }
    config
}

fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
