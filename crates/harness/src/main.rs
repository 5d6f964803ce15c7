mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::PathOverrides;
use pipeline::{EvalArgs, ExtractArgs, ProbeArgs, SummaryArgs};

/// qisabelle-harness: AFP extraction and greedy proof search against QIsabelle servers.
#[derive(Parser)]
#[command(name = "qisabelle-harness", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for extraction, evaluation, store inspection and backend probes.
#[derive(Subcommand)]
enum Command {
    /// Extract every theory of the corpus with a pool of workers (resumable).
    Extract {
        /// Path to harness config TOML file.
        #[arg(long, default_value = "configs/harness.toml")]
        config: PathBuf,
        /// AFP checkout on the host (overrides AFP_DIR and the config).
        #[arg(long)]
        afp_dir: Option<PathBuf>,
        /// Isabelle distribution on the host (overrides ISABELLE_DIR and the config).
        #[arg(long)]
        isabelle_dir: Option<PathBuf>,
        /// Checkpoint store root.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Override the number of workers.
        #[arg(long)]
        num_workers: Option<usize>,
        /// Port of the first server; worker i uses base_port + i.
        #[arg(long)]
        base_port: Option<u16>,
        /// Override the server-side timeout per Isar transition, in seconds.
        #[arg(long)]
        per_transition_timeout: Option<u64>,
        /// Also extract the HOL session from the Isabelle sources.
        #[arg(long)]
        include_hol: bool,
        /// Only extract these units (comma-separated session names).
        #[arg(long, value_delimiter = ',')]
        units: Vec<String>,
    },
    /// Run greedy search with the hammer-only generator over test cases.
    Eval {
        /// Path to harness config TOML file.
        #[arg(long, default_value = "configs/harness.toml")]
        config: PathBuf,
        /// Test case JSON file, or a directory of them.
        #[arg(long)]
        cases: PathBuf,
        /// AFP checkout on the host, used to check that theory files exist.
        #[arg(long)]
        afp_dir: Option<PathBuf>,
        /// Override the server port.
        #[arg(long)]
        port: Option<u16>,
        /// Override the server-side timeout per Isar transition, in seconds.
        #[arg(long)]
        per_transition_timeout: Option<u64>,
        /// Override the search budget per statement, in seconds.
        #[arg(long)]
        max_time: Option<f64>,
        /// Maximum number of cases to evaluate (truncates the list).
        #[arg(long)]
        max_cases: Option<usize>,
        /// Path to write the JSON evaluation report.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print counts of markers and artifacts in a checkpoint store.
    Summary {
        /// Checkpoint store root.
        #[arg(long, default_value = "extractions")]
        output_dir: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
    /// Open a session, state a lemma in a scratch theory and print the goals.
    Probe {
        /// Path to harness config TOML file.
        #[arg(long, default_value = "configs/harness.toml")]
        config: PathBuf,
        /// Override the server port.
        #[arg(long)]
        port: Option<u16>,
        /// Session to start.
        #[arg(long, default_value = "HOL")]
        session: String,
        /// Theories to import (comma-separated).
        #[arg(long, value_delimiter = ',', default_values_t = vec!["Main".to_string()])]
        imports: Vec<String>,
        /// Statement to state, e.g. 'lemma "rev (rev xs) = xs"'.
        #[arg(long)]
        lemma: String,
        /// Proof step to execute after the statement.
        #[arg(long)]
        step: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Extract {
            config,
            afp_dir,
            isabelle_dir,
            output_dir,
            num_workers,
            base_port,
            per_transition_timeout,
            include_hol,
            units,
        } => {
            pipeline::run_extract(ExtractArgs {
                config,
                paths: PathOverrides {
                    afp_dir,
                    isabelle_dir,
                    output_dir,
                },
                num_workers,
                base_port,
                per_transition_timeout,
                include_hol,
                units,
            })
            .await
        }
        Command::Eval {
            config,
            cases,
            afp_dir,
            port,
            per_transition_timeout,
            max_time,
            max_cases,
            output,
        } => {
            pipeline::run_eval(EvalArgs {
                config,
                cases,
                paths: PathOverrides {
                    afp_dir,
                    ..PathOverrides::default()
                },
                port,
                per_transition_timeout,
                max_time,
                max_cases,
                output,
            })
            .await
        }
        Command::Summary { output_dir, json } => {
            pipeline::run_summary(SummaryArgs { output_dir, json })
        }
        Command::Probe {
            config,
            port,
            session,
            imports,
            lemma,
            step,
        } => {
            pipeline::run_probe(ProbeArgs {
                config,
                port,
                session_name: session,
                imports,
                lemma,
                step,
            })
            .await
        }
    }
}
