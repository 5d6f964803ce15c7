//! Extraction, evaluation, summary and probe pipelines.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use extraction::{
    CheckpointStore, DispatchReport, Dispatcher, ExtractionPaths, QIsabelleOpener, SessionOpener,
    WorkUnit,
};
use qisabelle::{QIsabelleSession, SessionScope};
use search::{
    load_test_cases, GreedySearch, HammerOnlyGenerator, ProofEnvironment, QIsabelleEnvironment,
    StepGenerator, TestCase,
};

use crate::config::{
    build_extraction_paths, build_session_config, load_harness_toml, PathOverrides,
};
use crate::results::{BucketCounts, CaseResult, EvaluationReport};

/// Arguments for the `extract` subcommand.
#[derive(Debug)]
pub struct ExtractArgs {
    /// Path to the harness config TOML file.
    pub config: PathBuf,
    /// Host path overrides (AFP, Isabelle, output root).
    pub paths: PathOverrides,
    /// Override the number of workers.
    pub num_workers: Option<usize>,
    /// Override the base port; worker `i` talks to `base_port + i`.
    pub base_port: Option<u16>,
    /// Override the server-side timeout per Isar transition, in seconds.
    pub per_transition_timeout: Option<u64>,
    /// Also extract the HOL session.
    pub include_hol: bool,
    /// Only extract these units (all discovered units when empty).
    pub units: Vec<String>,
}

/// Arguments for the `eval` subcommand.
#[derive(Debug)]
pub struct EvalArgs {
    /// Path to the harness config TOML file.
    pub config: PathBuf,
    /// Test case JSON file, or a directory of them.
    pub cases: PathBuf,
    /// Host path overrides (only the AFP directory is used).
    pub paths: PathOverrides,
    /// Override the server port.
    pub port: Option<u16>,
    /// Override the server-side timeout per Isar transition, in seconds.
    pub per_transition_timeout: Option<u64>,
    /// Override the search budget per statement, in seconds.
    pub max_time: Option<f64>,
    /// Maximum number of cases to evaluate (truncates the list).
    pub max_cases: Option<usize>,
    /// Path to write the JSON evaluation report.
    pub output: Option<PathBuf>,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    /// Checkpoint store root.
    pub output_dir: PathBuf,
    /// Output as JSON instead of human-readable text.
    pub json: bool,
}

/// Arguments for the `probe` subcommand.
#[derive(Debug)]
pub struct ProbeArgs {
    /// Path to the harness config TOML file.
    pub config: PathBuf,
    /// Override the server port.
    pub port: Option<u16>,
    /// Session to start, e.g. `HOL` or an AFP entry.
    pub session_name: String,
    /// Theories the scratch theory imports.
    pub imports: Vec<String>,
    /// Statement to state in the scratch theory.
    pub lemma: String,
    /// Optional proof step to execute after the statement.
    pub step: Option<String>,
}

fn progress_bar(len: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn working_dir() -> anyhow::Result<PathBuf> {
    Ok(std::env::current_dir()?)
}

// ---------------------------------------------------------------------------
// extract
// ---------------------------------------------------------------------------

/// Extract every discovered unit with a pool of workers, resuming from the
/// checkpoint store.
pub async fn run_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = load_harness_toml(&args.config)?;
    let paths = build_extraction_paths(
        &toml.extraction,
        |k| std::env::var(k).ok(),
        &args.paths,
        &working_dir()?,
    );
    let num_workers = args.num_workers.unwrap_or(toml.extraction.num_workers);
    let session =
        build_session_config(&toml.session, args.base_port, args.per_transition_timeout);
    let include_hol = args.include_hol || toml.extraction.include_hol;

    // 2. Discover units
    let units = select_units(paths.discover_units(include_hol)?, &args.units);
    tracing::info!(
        units = units.len(),
        items = units.iter().map(|u| u.items.len()).sum::<usize>(),
        corpus = %paths.corpus_root.display(),
        output = %paths.output_root.display(),
        "Discovered units"
    );

    // 3. Dispatch
    let openers: Vec<Arc<dyn SessionOpener>> =
        QIsabelleOpener::pool(&session, num_workers, &paths.session_roots())?
            .into_iter()
            .map(|o| Arc::new(o) as Arc<dyn SessionOpener>)
            .collect();
    tracing::info!(
        num_workers,
        base_port = session.port,
        "Starting extraction workers"
    );
    let dispatcher = Dispatcher::new(CheckpointStore::new(&paths.output_root), openers);
    let report = dispatcher.run(units).await?;

    // 4. Print summary
    print_extraction_summary(&report, &paths, start.elapsed().as_secs_f64());
    if !report.all_stopped() {
        anyhow::bail!("{} worker(s) ended abnormally", report.lost_workers);
    }
    Ok(())
}

/// Keep only the units named in `wanted`, in discovery order.
fn select_units(units: Vec<WorkUnit>, wanted: &[String]) -> Vec<WorkUnit> {
    if wanted.is_empty() {
        return units;
    }
    for name in wanted {
        if !units.iter().any(|u| &u.id == name) {
            tracing::warn!(unit = %name, "Requested unit not found in corpus");
        }
    }
    units
        .into_iter()
        .filter(|u| wanted.contains(&u.id))
        .collect()
}

fn print_extraction_summary(report: &DispatchReport, paths: &ExtractionPaths, elapsed_s: f64) {
    println!("\n--- Extraction Summary ---");
    for w in &report.workers {
        println!(
            "Worker {} (port {}): {} units, {} already done, {} open failures, {} extracted, {} failed [{}]",
            w.worker,
            w.label,
            w.units_completed,
            w.units_already_done,
            w.units_open_failed,
            w.items_extracted,
            w.items_failed,
            w.final_state,
        );
    }
    println!("Units completed: {}", report.units_completed());
    println!("Units already done: {}", report.units_already_done());
    println!("Units failed to open: {}", report.units_open_failed());
    println!("Items extracted: {}", report.items_extracted());
    println!("Items skipped: {}", report.items_skipped());
    println!("Items failed: {}", report.items_failed());
    if report.lost_workers > 0 {
        println!("Workers lost: {}", report.lost_workers);
    }
    println!("Output: {}", paths.output_root.display());
    println!("Elapsed: {elapsed_s:.1}s");
}

// ---------------------------------------------------------------------------
// eval
// ---------------------------------------------------------------------------

/// Run greedy search with the hammer-only generator on each test case.
pub async fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = load_harness_toml(&args.config)?;
    let paths = build_extraction_paths(
        &toml.extraction,
        |k| std::env::var(k).ok(),
        &args.paths,
        &working_dir()?,
    );
    let session = build_session_config(&toml.session, args.port, args.per_transition_timeout);
    let mut search_config = toml.search;
    if let Some(secs) = args.max_time {
        search_config.max_proof_search_time_secs = secs;
    }
    search_config.validate();

    // 2. Load test cases
    let mut cases = load_test_cases(&args.cases)?;
    if let Some(max) = args.max_cases {
        cases.truncate(max);
    }
    tracing::info!(count = cases.len(), path = %args.cases.display(), "Loaded test cases");
    warn_missing_theories(&paths, &cases);

    // 3. Search every case
    let engine = GreedySearch::new(search_config);
    let env = QIsabelleEnvironment::new(session);
    let generator = HammerOnlyGenerator::new(engine.config().hammer_token.clone());
    let pb = progress_bar(cases.len() as u64)?;
    let per_case = evaluate_cases(&engine, &env, &generator, &paths, &cases, &pb).await;
    pb.finish_with_message("done");

    let report = EvaluationReport::from_cases(
        args.cases.display().to_string(),
        engine.config().max_proof_search_time_secs,
        per_case,
    );

    // 4. Print summary
    println!("\n--- Evaluation Summary ---");
    println!("Cases: {}", report.total);
    println!("Buckets: {}", report.buckets);
    println!(
        "Proved: {}/{} ({:.1}%)",
        report.solved,
        report.total,
        report.rate * 100.0
    );
    println!(
        "Time per case: avg {:.1}s, median {:.1}s",
        report.avg_time_secs, report.median_time_secs
    );
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    // 5. Optional JSON report
    if let Some(output) = &args.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, serde_json::to_string_pretty(&report)?)?;
        println!("Report: {}", output.display());
    }
    Ok(())
}

/// Warn about cases whose theory file is not in the host corpus.
///
/// The cases are still attempted: the backend may see a different checkout.
fn warn_missing_theories(paths: &ExtractionPaths, cases: &[TestCase]) -> usize {
    let mut missing = 0;
    for case in cases {
        let host = paths.host_theory_path(&case.thy_file);
        if !host.exists() {
            missing += 1;
            tracing::warn!(case = %case.name, path = %host.display(), "Theory file not found");
        }
    }
    missing
}

/// Search each case in a fresh session and classify the result.
///
/// A case that ends with an error is bucketed by the error kind and the run
/// moves on to the next case.
pub async fn evaluate_cases(
    engine: &GreedySearch,
    env: &dyn ProofEnvironment,
    generator: &dyn StepGenerator,
    paths: &ExtractionPaths,
    cases: &[TestCase],
    pb: &ProgressBar,
) -> Vec<CaseResult> {
    let mut results = Vec::with_capacity(cases.len());
    let mut buckets = BucketCounts::default();

    for case in cases {
        pb.set_message(case.name.clone());
        let theory_path = paths.backend_theory_path(&case.thy_file);
        let case_start = Instant::now();

        let result = match engine
            .search_in_new_session(env, generator, &theory_path, &case.lemma_statement)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    case = %case.name,
                    outcome = result.outcome.bucket(),
                    steps = result.steps.len(),
                    search_ms = result.search_time_ms,
                    "Search finished"
                );
                CaseResult {
                    name: case.name.clone(),
                    thy_file: case.thy_file.clone(),
                    bucket: result.outcome.bucket().to_string(),
                    steps: result.steps.len(),
                    time_secs: case_start.elapsed().as_secs_f64(),
                    proof: result.proof(),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(case = %case.name, kind = e.kind(), error = %e, "Search failed");
                CaseResult {
                    name: case.name.clone(),
                    thy_file: case.thy_file.clone(),
                    bucket: e.kind().to_string(),
                    steps: 0,
                    time_secs: case_start.elapsed().as_secs_f64(),
                    proof: None,
                    error: Some(e.to_string()),
                }
            }
        };

        buckets.record(&result.bucket);
        results.push(result);
        pb.inc(1);
        pb.println(format!(
            "Did {}/{} cases so far: {buckets}",
            results.len(),
            cases.len()
        ));
    }
    results
}

// ---------------------------------------------------------------------------
// summary
// ---------------------------------------------------------------------------

/// Print counts of markers and artifacts in a checkpoint store.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    if !args.output_dir.is_dir() {
        anyhow::bail!("No checkpoint store at {}", args.output_dir.display());
    }
    let summary = CheckpointStore::new(&args.output_dir).summary()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Store Summary ---");
    println!("Root: {}", args.output_dir.display());
    println!("Units: {}", summary.units);
    println!("Units done: {}", summary.units_done);
    println!("Units with errors: {}", summary.units_errored);
    println!("Artifacts: {}", summary.artifacts);
    println!("Item errors: {}", summary.item_errors);
    Ok(())
}

// ---------------------------------------------------------------------------
// probe
// ---------------------------------------------------------------------------

/// Open a session, state a lemma in a scratch theory and print the goals.
pub async fn run_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let toml = load_harness_toml(&args.config)?;
    let config = build_session_config(&toml.session, args.port, None);
    let scope = SessionScope::Named {
        session_name: args.session_name.clone(),
        session_roots: Vec::new(),
    };

    let start = Instant::now();
    let mut session = QIsabelleSession::open(&config, &scope).await?;
    tracing::info!(
        port = config.port,
        session = %args.session_name,
        elapsed_s = start.elapsed().as_secs_f64(),
        "Session opened"
    );

    let result = probe_lemma(&mut session, &args).await;
    session.close().await?;
    result
}

async fn probe_lemma(session: &mut QIsabelleSession, args: &ProbeArgs) -> anyhow::Result<()> {
    session
        .new_theory("Probe", "probe0", &args.imports, false)
        .await?;
    let stated = session.execute("probe0", &args.lemma, "probe1").await?;
    println!("--- Goals ---");
    println!("{}", stated.goals);

    if let Some(step) = &args.step {
        let after = session.execute("probe1", step, "probe2").await?;
        println!("--- After `{step}` ---");
        if after.proof_done {
            println!("Proof done.");
        } else {
            println!("{}", after.goals);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use qisabelle::SessionError;
    use search::mocks::{make_step, MockEnvironment, MockGenerator, MockSession};
    use search::SearchConfig;

    fn paths() -> ExtractionPaths {
        ExtractionPaths::new("/host/afp", "/host/isabelle", "/host/out")
    }

    fn case(name: &str, thy: &str) -> TestCase {
        TestCase {
            name: name.to_string(),
            thy_file: PathBuf::from(thy),
            lemma_statement: format!("lemma {name}: \"x = x\""),
        }
    }

    #[tokio::test]
    async fn test_evaluate_cases_buckets_each_case() {
        // Proved/ proves in one step, Stuck/ stalls.
        let env = MockEnvironment::new(|path: &Path| {
            let p = path.display().to_string();
            if p.contains("Proved") {
                MockSession::new("goal").with_execute("by simp", "", true)
            } else {
                MockSession::new("goal").with_execute("by simp", "goal", false)
            }
        });
        let generator = MockGenerator::with_default(vec![make_step("by simp", 0.0)]);
        let engine = GreedySearch::new(SearchConfig::default());
        let cases = vec![case("a", "Proved/A.thy"), case("b", "Stuck/B.thy")];

        let results =
            evaluate_cases(&engine, &env, &generator, &paths(), &cases, &ProgressBar::hidden())
                .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].bucket, "success");
        assert_eq!(results[0].proof, Some(vec!["by simp".to_string()]));
        assert_eq!(results[1].bucket, "failure");
        assert_eq!(results[1].steps, 1);
        // Sessions are opened at backend paths and always released
        assert_eq!(
            env.opened(),
            vec![
                PathBuf::from("/afp/thys/Proved/A.thy"),
                PathBuf::from("/afp/thys/Stuck/B.thy")
            ]
        );
        assert_eq!(env.closed(), 2);
    }

    #[tokio::test]
    async fn test_evaluate_cases_error_bucket_and_continue() {
        let env = MockEnvironment::unavailable("connection refused");
        let generator = MockGenerator::with_default(vec![make_step("by simp", 0.0)]);
        let engine = GreedySearch::new(SearchConfig::default());
        let cases = vec![case("a", "A/A.thy"), case("b", "B/B.thy")];

        let results =
            evaluate_cases(&engine, &env, &generator, &paths(), &cases, &ProgressBar::hidden())
                .await;

        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.bucket, "unavailable");
            assert!(r.error.as_deref().unwrap_or("").contains("connection refused"));
        }
    }

    #[tokio::test]
    async fn test_evaluate_cases_backend_error_kind() {
        let env = MockEnvironment::new(|_: &Path| {
            MockSession::new("goal").with_execute_error(SessionError::Backend {
                kind: "timeout-soft".into(),
                desc: "Timeout after 10 s".into(),
            })
        });
        let generator = MockGenerator::with_default(vec![make_step("by auto", 0.0)]);
        let engine = GreedySearch::new(SearchConfig::default());

        let results = evaluate_cases(
            &engine,
            &env,
            &generator,
            &paths(),
            &[case("a", "A/A.thy")],
            &ProgressBar::hidden(),
        )
        .await;
        assert_eq!(results[0].bucket, "timeout-soft");
        assert_eq!(env.closed(), 1);
    }

    #[tokio::test]
    async fn test_hammer_only_eval_with_mocks() {
        let env = MockEnvironment::new(|_: &Path| {
            MockSession::new("goal")
                .with_hammer("by (metis foo)")
                .with_execute("by (metis foo)", "", true)
        });
        let engine = GreedySearch::new(SearchConfig::default());
        let generator = HammerOnlyGenerator::new(engine.config().hammer_token.clone());

        let results = evaluate_cases(
            &engine,
            &env,
            &generator,
            &paths(),
            &[case("a", "A/A.thy")],
            &ProgressBar::hidden(),
        )
        .await;
        assert_eq!(results[0].bucket, "success");
        assert_eq!(results[0].proof, Some(vec!["by (metis foo)".to_string()]));
    }

    #[test]
    fn test_select_units_filters_in_discovery_order() {
        let units = vec![
            WorkUnit::new("A", Vec::new()),
            WorkUnit::new("B", Vec::new()),
            WorkUnit::new("C", Vec::new()),
        ];
        let selected = select_units(units.clone(), &["C".to_string(), "A".to_string()]);
        let ids: Vec<_> = selected.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);

        assert_eq!(select_units(units, &[]).len(), 3);
    }

    #[test]
    fn test_warn_missing_theories_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let thy_dir = tmp.path().join("thys/Foo");
        std::fs::create_dir_all(&thy_dir).unwrap();
        std::fs::write(thy_dir.join("Foo.thy"), "theory Foo imports Main begin end").unwrap();
        let paths = ExtractionPaths::new(tmp.path(), "/isabelle", tmp.path().join("out"));

        let cases = vec![case("a", "Foo/Foo.thy"), case("b", "Bar/Bar.thy")];
        assert_eq!(warn_missing_theories(&paths, &cases), 1);
    }

    #[test]
    fn test_summary_rejects_missing_store() {
        let err = run_summary(SummaryArgs {
            output_dir: PathBuf::from("/nonexistent/store"),
            json: false,
        })
        .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/store"));
    }
}
