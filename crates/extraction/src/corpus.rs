//! Corpus discovery: the AFP `ROOTS` file and the theory files under each
//! session directory.
//!
//! Every directory listed in `{corpus_root}/thys/ROOTS` is treated as one
//! Isabelle session whose theories are all its `**/*.thy` files. A ROOT file
//! may in fact declare several sessions or pull theories from elsewhere; the
//! approximation holds for nearly all of the AFP.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::types::{ItemRef, WorkUnit};

/// Name of the unit that maps to the Isabelle/HOL source tree.
pub const HOL_UNIT: &str = "HOL";

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Session directory not found: {0}")]
    MissingSession(PathBuf),

    /// Two theory files of one unit map to the same item id (e.g. `A/B.thy`
    /// and `A.B.thy`), so their artifacts would share a key.
    #[error("Duplicate item {id} in unit {unit}: {first} and {second}")]
    DuplicateItem {
        unit: String,
        id: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Where the corpus lives on this machine and inside the backend, and where
/// artifacts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPaths {
    /// AFP checkout on the host (contains `thys/`).
    pub corpus_root: PathBuf,
    /// Isabelle distribution on the host (contains `src/HOL`).
    pub isabelle_root: PathBuf,
    /// Checkpoint store root.
    pub output_root: PathBuf,
    /// AFP checkout as mounted in the backend.
    pub backend_afp_root: PathBuf,
    /// Isabelle distribution as mounted in the backend.
    pub backend_isabelle_root: PathBuf,
}

impl ExtractionPaths {
    pub fn new(
        corpus_root: impl Into<PathBuf>,
        isabelle_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            corpus_root: corpus_root.into(),
            isabelle_root: isabelle_root.into(),
            output_root: output_root.into(),
            backend_afp_root: PathBuf::from("/afp"),
            backend_isabelle_root: PathBuf::from("/home/isabelle/Isabelle"),
        }
    }

    pub fn thys_dir(&self) -> PathBuf {
        self.corpus_root.join("thys")
    }

    /// Session roots passed to the backend when opening a named session.
    pub fn session_roots(&self) -> Vec<PathBuf> {
        vec![self.backend_afp_root.join("thys")]
    }

    /// Host directory holding the theories of `unit`.
    pub fn session_dir(&self, unit: &str) -> PathBuf {
        if unit == HOL_UNIT {
            self.isabelle_root.join("src").join("HOL")
        } else {
            self.thys_dir().join(unit)
        }
    }

    /// Translate a host theory path of `unit` into the backend's view.
    pub fn backend_path(&self, unit: &str, host_path: &Path) -> PathBuf {
        let (host_root, backend_root) = if unit == HOL_UNIT {
            (&self.isabelle_root, &self.backend_isabelle_root)
        } else {
            (&self.corpus_root, &self.backend_afp_root)
        };
        match host_path.strip_prefix(host_root) {
            Ok(relative) => backend_root.join(relative),
            Err(_) => host_path.to_path_buf(),
        }
    }

    /// Backend path of an AFP theory given relative to `thys/`
    /// (the form used by test cases, e.g. `"Foo/Bar.thy"`).
    pub fn backend_theory_path(&self, thy_file: &Path) -> PathBuf {
        self.backend_afp_root.join("thys").join(thy_file)
    }

    /// Host path of an AFP theory given relative to `thys/`.
    pub fn host_theory_path(&self, thy_file: &Path) -> PathBuf {
        self.thys_dir().join(thy_file)
    }

    /// Session names listed in `thys/ROOTS`, in file order.
    pub fn read_roots(&self) -> Result<Vec<String>, CorpusError> {
        let path = self.thys_dir().join("ROOTS");
        let text = fs::read_to_string(&path).map_err(|e| CorpusError::Read { path, source: e })?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect())
    }

    /// Build the unit for one session: all its theory files, sorted.
    ///
    /// Fails if two files map to the same item id.
    pub fn discover_unit(&self, unit: &str) -> Result<WorkUnit, CorpusError> {
        let session_dir = self.session_dir(unit);
        if !session_dir.is_dir() {
            return Err(CorpusError::MissingSession(session_dir));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&session_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "thy"))
            .collect();
        files.sort();

        let mut seen: HashMap<String, PathBuf> = HashMap::with_capacity(files.len());
        let mut items = Vec::with_capacity(files.len());
        for host_path in files {
            let id = ItemRef::logical_name(&session_dir, &host_path);
            if let Some(first) = seen.insert(id.clone(), host_path.clone()) {
                return Err(CorpusError::DuplicateItem {
                    unit: unit.to_string(),
                    id,
                    first,
                    second: host_path,
                });
            }
            let backend_path = self.backend_path(unit, &host_path);
            items.push(ItemRef::new(id, host_path, backend_path));
        }
        Ok(WorkUnit::new(unit, items))
    }

    /// Build the full unit table from `ROOTS`, sorted by unit id.
    ///
    /// Sessions listed in `ROOTS` but missing on disk are logged and skipped.
    pub fn discover_units(&self, include_hol: bool) -> Result<Vec<WorkUnit>, CorpusError> {
        let mut names = self.read_roots()?;
        if include_hol {
            names.push(HOL_UNIT.to_string());
        }
        names.sort();
        names.dedup();

        let mut units = Vec::with_capacity(names.len());
        for name in names {
            match self.discover_unit(&name) {
                Ok(unit) => units.push(unit),
                Err(CorpusError::MissingSession(dir)) => {
                    tracing::warn!(unit = %name, dir = %dir.display(), "Session directory missing, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        let items: usize = units.iter().map(|u| u.items.len()).sum();
        tracing::info!(units = units.len(), items, "Discovered corpus");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "theory X imports Main begin end").unwrap();
    }

    fn corpus() -> (TempDir, ExtractionPaths) {
        let tmp = TempDir::new().unwrap();
        let afp = tmp.path().join("afp");
        let isabelle = tmp.path().join("isabelle");
        fs::create_dir_all(afp.join("thys")).unwrap();
        fs::write(afp.join("thys/ROOTS"), "Zeta\nFoo\n\n# comment\nGone\n").unwrap();
        touch(&afp.join("thys/Foo/Bar.thy"));
        touch(&afp.join("thys/Foo/Sub/Baz.thy"));
        fs::write(afp.join("thys/Foo/ROOT"), "session Foo = HOL").unwrap();
        touch(&afp.join("thys/Zeta/Zeta.thy"));
        touch(&isabelle.join("src/HOL/Nat.thy"));
        let paths = ExtractionPaths::new(afp, isabelle, tmp.path().join("out"));
        (tmp, paths)
    }

    #[test]
    fn read_roots_skips_blank_and_comment_lines() {
        let (_tmp, paths) = corpus();
        assert_eq!(paths.read_roots().unwrap(), vec!["Zeta", "Foo", "Gone"]);
    }

    #[test]
    fn discover_unit_lists_sorted_theories() {
        let (_tmp, paths) = corpus();
        let unit = paths.discover_unit("Foo").unwrap();
        let ids: Vec<_> = unit.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["Bar", "Sub.Baz"]);
        assert_eq!(unit.items[1].backend_path, PathBuf::from("/afp/thys/Foo/Sub/Baz.thy"));
    }

    #[test]
    fn discover_units_sorted_and_missing_skipped() {
        let (_tmp, paths) = corpus();
        let units = paths.discover_units(false).unwrap();
        let ids: Vec<_> = units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["Foo", "Zeta"]);
    }

    #[test]
    fn hol_unit_maps_to_isabelle_tree() {
        let (_tmp, paths) = corpus();
        let units = paths.discover_units(true).unwrap();
        let hol = units.iter().find(|u| u.id == HOL_UNIT).unwrap();
        assert_eq!(hol.items.len(), 1);
        assert_eq!(hol.items[0].id, "Nat");
        assert_eq!(
            hol.items[0].backend_path,
            PathBuf::from("/home/isabelle/Isabelle/src/HOL/Nat.thy")
        );
    }

    #[test]
    fn colliding_item_ids_are_rejected() {
        let (tmp, paths) = corpus();
        touch(&tmp.path().join("afp/thys/Foo/A/B.thy"));
        touch(&tmp.path().join("afp/thys/Foo/A.B.thy"));

        let err = paths.discover_unit("Foo").unwrap_err();
        match &err {
            CorpusError::DuplicateItem { unit, id, .. } => {
                assert_eq!(unit, "Foo");
                assert_eq!(id, "A.B");
            }
            other => panic!("expected DuplicateItem, got {other:?}"),
        }
        assert!(err.to_string().contains("A.B.thy"));
        assert!(matches!(
            paths.discover_units(false),
            Err(CorpusError::DuplicateItem { .. })
        ));
    }

    #[test]
    fn missing_roots_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let paths = ExtractionPaths::new(tmp.path(), tmp.path(), tmp.path());
        assert!(matches!(paths.read_roots(), Err(CorpusError::Read { .. })));
    }

    #[test]
    fn theory_paths_for_test_cases() {
        let paths = ExtractionPaths::new("/data/afp", "/data/isabelle", "/data/out");
        let thy = Path::new("Foo/Bar.thy");
        assert_eq!(paths.backend_theory_path(thy), PathBuf::from("/afp/thys/Foo/Bar.thy"));
        assert_eq!(paths.host_theory_path(thy), PathBuf::from("/data/afp/thys/Foo/Bar.thy"));
        assert_eq!(paths.session_roots(), vec![PathBuf::from("/afp/thys")]);
    }
}
