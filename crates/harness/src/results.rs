//! Result types for evaluation runs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-bucket case counts (`success`, `failure`, `timeout`, or an error kind).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketCounts(BTreeMap<String, usize>);

impl BucketCounts {
    pub fn record(&mut self, bucket: &str) {
        *self.0.entry(bucket.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, bucket: &str) -> usize {
        self.0.get(bucket).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl fmt::Display for BucketCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (bucket, count)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{bucket}: {count}")?;
        }
        write!(f, "}}")
    }
}

/// Results from evaluating greedy search on a set of test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// RFC 3339 timestamp of when the evaluation was run.
    pub timestamp: String,
    /// Path of the test case file or directory.
    pub cases: String,
    /// Search budget per statement, in seconds.
    pub max_proof_search_time_secs: f64,
    /// Total cases attempted.
    pub total: usize,
    /// Cases per bucket.
    pub buckets: BucketCounts,
    /// Number of cases proved.
    pub solved: usize,
    /// Fraction solved (solved / total).
    pub rate: f64,
    /// Average wall-clock time per case in seconds.
    pub avg_time_secs: f64,
    /// Median wall-clock time per case in seconds.
    pub median_time_secs: f64,
    /// Per-case results.
    pub per_case: Vec<CaseResult>,
}

impl EvaluationReport {
    /// Aggregate per-case results into a report.
    pub fn from_cases(
        cases: impl Into<String>,
        max_proof_search_time_secs: f64,
        per_case: Vec<CaseResult>,
    ) -> Self {
        let mut buckets = BucketCounts::default();
        for case in &per_case {
            buckets.record(&case.bucket);
        }
        let total = per_case.len();
        let solved = buckets.get("success");
        let mut times: Vec<f64> = per_case.iter().map(|c| c.time_secs).collect();
        let avg_time_secs = if total > 0 {
            times.iter().sum::<f64>() / total as f64
        } else {
            0.0
        };

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            cases: cases.into(),
            max_proof_search_time_secs,
            total,
            buckets,
            solved,
            rate: if total > 0 {
                solved as f64 / total as f64
            } else {
                0.0
            },
            avg_time_secs,
            median_time_secs: median(&mut times),
            per_case,
        }
    }
}

/// Result for a single test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Test case name.
    pub name: String,
    /// Theory file relative to the AFP `thys/` directory.
    pub thy_file: PathBuf,
    /// `success`, `failure`, `timeout`, or the error kind that ended the case.
    pub bucket: String,
    /// Number of steps executed.
    pub steps: usize,
    /// Wall-clock time in seconds, including session open and theory load.
    pub time_secs: f64,
    /// Executed proof, for successful cases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Vec<String>>,
    /// Error message, for cases that ended with an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Compute the median of a slice of f64 values.
///
/// Returns 0.0 for empty slices.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(name: &str, bucket: &str, time_secs: f64) -> CaseResult {
        CaseResult {
            name: name.to_string(),
            thy_file: PathBuf::from("Foo/Bar.thy"),
            bucket: bucket.to_string(),
            steps: 1,
            time_secs,
            proof: (bucket == "success").then(|| vec!["by simp".to_string()]),
            error: None,
        }
    }

    #[test]
    fn test_median_odd() {
        assert!((median(&mut [3.0, 1.0, 2.0]) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_even() {
        assert!((median(&mut [4.0, 1.0, 3.0, 2.0]) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_median_empty() {
        let mut empty: Vec<f64> = Vec::new();
        assert_eq!(median(&mut empty), 0.0);
    }

    #[test]
    fn test_bucket_counts_display_sorted() {
        let mut counts = BucketCounts::default();
        counts.record("timeout");
        counts.record("success");
        counts.record("success");
        assert_eq!(counts.to_string(), "{success: 2, timeout: 1}");
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.get("failure"), 0);
    }

    #[test]
    fn test_report_aggregates_cases() {
        let report = EvaluationReport::from_cases(
            "cases.json",
            500.0,
            vec![
                case("a", "success", 1.0),
                case("b", "failure", 3.0),
                case("c", "success", 2.0),
                case("d", "execution-timeout", 10.0),
            ],
        );
        assert_eq!(report.total, 4);
        assert_eq!(report.solved, 2);
        assert!((report.rate - 0.5).abs() < 1e-9);
        assert!((report.avg_time_secs - 4.0).abs() < 1e-9);
        assert!((report.median_time_secs - 2.5).abs() < 1e-9);
        assert_eq!(report.buckets.get("execution-timeout"), 1);
        // per_case order is preserved
        assert_eq!(report.per_case[1].name, "b");
    }

    #[test]
    fn test_empty_report() {
        let report = EvaluationReport::from_cases("none.json", 500.0, Vec::new());
        assert_eq!(report.total, 0);
        assert_eq!(report.rate, 0.0);
        assert_eq!(report.avg_time_secs, 0.0);
    }

    #[test]
    fn test_report_serde_roundtrip() {
        let report = EvaluationReport::from_cases(
            "cases.json",
            60.0,
            vec![case("a", "success", 1.5), case("b", "timeout", 60.2)],
        );
        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"buckets\": {"));
        assert!(!json.contains("\"error\""));

        let back: EvaluationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total, 2);
        assert_eq!(back.buckets, report.buckets);
        assert_eq!(back.per_case, report.per_case);
        assert_eq!(back.timestamp, report.timestamp);
    }
}
