//! Helpers shared by the tool stages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ferrodock_common::cpu;
use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::PipelineConfig;
use ferrodock_runner::{BatchRunner, RetryPolicy, WorkItem};

/// Workers for a tool stage: the CPU budget, capped by `max_workers`.
pub fn tool_workers(config: &PipelineConfig) -> usize {
    cpu::bounded_workers(
        config.execution.max_workers,
        cpu::cpu_count(),
        config.execution.cpu_fraction,
    )
}

/// Docking gets half the tool budget.
pub fn docking_workers(config: &PipelineConfig) -> usize {
    let half = cpu::docking_workers(cpu::cpu_count(), config.execution.cpu_fraction);
    match config.execution.max_workers {
        Some(cap) => half.min(cap).max(1),
        None => half,
    }
}

/// A runner with the configured retry policy.
pub fn runner(config: &PipelineConfig, workers: usize) -> BatchRunner {
    BatchRunner::new(workers).with_retry(RetryPolicy::new(
        config.execution.max_attempts,
        Duration::from_millis(config.execution.retry_backoff_ms),
    ))
}

/// Create a stage directory if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}

/// All expected outputs of an item, or the first one missing.
pub fn expect_outputs(item: &WorkItem) -> Result<Vec<PathBuf>> {
    for output in &item.outputs {
        if !output.exists() {
            return Err(PipelineError::OutputArtifactMissing { path: output.clone() });
        }
    }
    Ok(item.outputs.clone())
}

/// Inputs must exist before a tool is launched on them.
pub fn expect_inputs(item: &WorkItem) -> Result<()> {
    for input in item.inputs() {
        if !input.exists() {
            return Err(PipelineError::InputNotFound { path: input.to_path_buf() });
        }
    }
    Ok(())
}

/// The first expected output; every stage item declares at least one.
pub fn primary_output(item: &WorkItem) -> Result<&Path> {
    item.outputs
        .first()
        .map(PathBuf::as_path)
        .ok_or_else(|| PipelineError::Other(anyhow::anyhow!("{} declares no outputs", item.id)))
}

/// Move a file, copying across filesystems when a rename is impossible.
pub fn relocate(source: &Path, destination: &Path) -> Result<PathBuf> {
    if !source.exists() {
        return Err(PipelineError::OutputArtifactMissing { path: source.to_path_buf() });
    }
    if let Some(parent) = destination.parent() {
        ensure_dir(parent)?;
    }
    if std::fs::rename(source, destination).is_err() {
        std::fs::copy(source, destination).map_err(|e| PipelineError::io(source, e))?;
        std::fs::remove_file(source).map_err(|e| PipelineError::io(source, e))?;
    }
    Ok(destination.to_path_buf())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocate_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a_out.pdbqt");
        std::fs::write(&src, "MODEL 1\n").unwrap();
        let dst = dir.path().join("poses").join("a_out.pdbqt");

        assert_eq!(relocate(&src, &dst).unwrap(), dst);
        assert!(!src.exists());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "MODEL 1\n");
    }

    #[test]
    fn test_relocate_missing_source_is_artifact_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = relocate(&dir.path().join("nope.dro"), &dir.path().join("x.dro")).unwrap_err();
        assert!(matches!(err, PipelineError::OutputArtifactMissing { .. }));
    }

    #[test]
    fn test_expect_outputs_reports_first_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.pdbqt");
        std::fs::write(&present, "").unwrap();
        let missing = dir.path().join("b.pdbqt");
        let item = WorkItem::single(dir.path().join("a.pdb"), vec![present, missing.clone()]);
        match expect_outputs(&item) {
            Err(PipelineError::OutputArtifactMissing { path }) => assert_eq!(path, missing),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tool_workers_respects_cap() {
        let mut config = PipelineConfig::default();
        config.execution.max_workers = Some(1);
        assert_eq!(tool_workers(&config), 1);
        assert_eq!(docking_workers(&config), 1);
    }
}
