//! Work items and their discovery.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::naming::file_name;

/// What a single tool invocation consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WorkInput {
    Single(PathBuf),
    Pair { first: PathBuf, second: PathBuf },
}

/// One unit of external-tool work. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Identifier used in logs and reports
    pub id: String,
    pub input: WorkInput,
    /// Paths this item is expected to produce
    pub outputs: Vec<PathBuf>,
}

impl WorkItem {
    /// Item over one file; the id is the file name.
    pub fn single(input: PathBuf, outputs: Vec<PathBuf>) -> Self {
        Self {
            id: file_name(&input),
            input: WorkInput::Single(input),
            outputs,
        }
    }

    /// Item over a pair of files (e.g. ligand × affinity map).
    pub fn pair(id: impl Into<String>, first: PathBuf, second: PathBuf, outputs: Vec<PathBuf>) -> Self {
        Self {
            id: id.into(),
            input: WorkInput::Pair { first, second },
            outputs,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The single input, or the first of a pair.
    pub fn primary_input(&self) -> &Path {
        match &self.input {
            WorkInput::Single(p) => p,
            WorkInput::Pair { first, .. } => first,
        }
    }

    pub fn inputs(&self) -> Vec<&Path> {
        match &self.input {
            WorkInput::Single(p) => vec![p.as_path()],
            WorkInput::Pair { first, second } => vec![first.as_path(), second.as_path()],
        }
    }
}

/// Regular files in `dir` whose name ends with `suffix`, sorted by name.
pub fn discover(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if file_name(&path).ends_with(suffix) {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        warn!("No files ending in {:?} under {:?}", suffix, dir);
    } else {
        debug!("Discovered {} files ending in {:?} under {:?}", files.len(), suffix, dir);
    }
    Ok(files)
}

/// Every (a, b) pair, `a` outer.
pub fn cross_product(first: &[PathBuf], second: &[PathBuf]) -> Vec<(PathBuf, PathBuf)> {
    first
        .iter()
        .flat_map(|a| second.iter().map(move |b| (a.clone(), b.clone())))
        .collect()
}

/// Fail if two items would write the same output path.
pub fn validate_unique_outputs(items: &[WorkItem]) -> Result<()> {
    let mut owners: HashMap<&Path, &str> = HashMap::new();
    for item in items {
        for output in &item.outputs {
            if let Some(first) = owners.insert(output.as_path(), item.id.as_str()) {
                return Err(PipelineError::OutputCollision {
                    path: output.clone(),
                    first: first.to_string(),
                    second: item.id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_protein.pdb", "a_protein.pdb", "a_ligand.pdb", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("c_protein.pdb")).unwrap();

        let files = discover(dir.path(), "_protein.pdb").unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a_protein.pdb", "b_protein.pdb"]);
    }

    #[test]
    fn test_discover_suffix_mismatch_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x_protein.pdb"), "").unwrap();
        assert!(discover(dir.path(), "_protein_Repair.pdb").unwrap().is_empty());
    }

    #[test]
    fn test_discover_missing_dir() {
        let err = discover(Path::new("/nonexistent/ferrodock"), ".pdb").unwrap_err();
        assert!(matches!(err, PipelineError::InputNotFound { .. }));
    }

    #[test]
    fn test_cross_product_order() {
        let a = vec![PathBuf::from("l1"), PathBuf::from("l2")];
        let b = vec![PathBuf::from("m1"), PathBuf::from("m2"), PathBuf::from("m3")];
        let pairs = cross_product(&a, &b);
        assert_eq!(pairs.len(), 6);
        assert_eq!(pairs[0], (PathBuf::from("l1"), PathBuf::from("m1")));
        assert_eq!(pairs[3], (PathBuf::from("l2"), PathBuf::from("m1")));
    }

    #[test]
    fn test_output_collision_detected() {
        let items = vec![
            WorkItem::single(PathBuf::from("a.pdb"), vec![PathBuf::from("out.pdbqt")]),
            WorkItem::single(PathBuf::from("b.pdb"), vec![PathBuf::from("out.pdbqt")]),
        ];
        match validate_unique_outputs(&items) {
            Err(PipelineError::OutputCollision { first, second, .. }) => {
                assert_eq!(first, "a.pdb");
                assert_eq!(second, "b.pdb");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn test_distinct_outputs_pass() {
        let items = vec![
            WorkItem::single(PathBuf::from("a.pdb"), vec![PathBuf::from("a.pdbqt")]),
            WorkItem::single(PathBuf::from("b.pdb"), vec![PathBuf::from("b.pdbqt")]),
        ];
        assert!(validate_unique_outputs(&items).is_ok());
    }
}
