//! Evaluation test cases: a lemma statement inside a theory file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One statement to prove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    /// Theory file relative to the AFP `thys/` directory, e.g. `"Foo/Bar.thy"`.
    pub thy_file: PathBuf,
    /// Statement exactly as it appears in the theory file.
    pub lemma_statement: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CasesError {
    #[error("Failed to read test cases from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse test cases in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<TestCase>),
    One(TestCase),
}

/// Load test cases from a JSON file (a list or a single object), or from
/// every `*.json` file of a directory, in file-name order.
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>, CasesError> {
    if !path.is_dir() {
        return load_file(path);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .map_err(|e| CasesError::Read {
            path: path.to_path_buf(),
            source: e,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut cases = Vec::new();
    for file in files {
        cases.extend(load_file(&file)?);
    }
    Ok(cases)
}

fn load_file(path: &Path) -> Result<Vec<TestCase>, CasesError> {
    let text = fs::read_to_string(path).map_err(|e| CasesError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let parsed: OneOrMany = serde_json::from_str(&text).map_err(|e| CasesError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(match parsed {
        OneOrMany::Many(cases) => cases,
        OneOrMany::One(case) => vec![case],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CASE: &str = r#"{"name": "quick_1", "thy_file": "Foo/Bar.thy", "lemma_statement": "lemma x: \"x = x\""}"#;

    #[test]
    fn test_load_list_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("cases.json");
        fs::write(&file, format!("[{CASE}, {CASE}]")).unwrap();
        let cases = load_test_cases(&file).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].thy_file, PathBuf::from("Foo/Bar.thy"));
        assert_eq!(cases[0].lemma_statement, "lemma x: \"x = x\"");
    }

    #[test]
    fn test_load_directory_in_name_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.json"), CASE.replace("quick_1", "quick_b")).unwrap();
        fs::write(tmp.path().join("a.json"), CASE.replace("quick_1", "quick_a")).unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        let cases = load_test_cases(tmp.path()).unwrap();
        let names: Vec<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["quick_a", "quick_b"]);
    }

    #[test]
    fn test_parse_error_names_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("bad.json");
        fs::write(&file, "{not json").unwrap();
        let err = load_test_cases(&file).unwrap_err();
        assert!(matches!(err, CasesError::Parse { .. }));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_test_cases(Path::new("/nonexistent/cases.json")).unwrap_err();
        assert!(matches!(err, CasesError::Read { .. }));
    }
}
