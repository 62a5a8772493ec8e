//! Receptor preparation: repaired structures to PDBQT.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use ferrodock_common::error::Result;
use ferrodock_common::naming::{file_name, replace_suffix, PROTEIN_PDBQT, REPAIRED_PDB};
use ferrodock_common::PipelineConfig;
use ferrodock_runner::work::discover;
use ferrodock_runner::{BatchJob, BatchReport, ItemSuccess, ToolExecutor, ToolInvocation, WorkItem};

use crate::stage;

/// Runs `prepare_receptor` on one repaired structure.
pub struct ReceptorJob {
    executor: Arc<dyn ToolExecutor>,
    program: String,
    workdir: PathBuf,
}

impl ReceptorJob {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: &PipelineConfig) -> Self {
        Self {
            executor,
            program: config.tools.prepare_receptor.clone(),
            workdir: config.root_dir(),
        }
    }
}

#[async_trait]
impl BatchJob for ReceptorJob {
    fn name(&self) -> &str {
        "prepare-receptor"
    }

    async fn run(&self, item: &WorkItem) -> Result<ItemSuccess> {
        stage::expect_inputs(item)?;
        let output = stage::primary_output(item)?;
        let invocation = ToolInvocation::new(&self.program)
            .arg("-r")
            .path_arg(item.primary_input())
            .arg("-o")
            .path_arg(output)
            .args(["-A", "bonds_hydrogens"])
            .current_dir(&self.workdir);
        self.executor.execute(&invocation).await?;
        stage::expect_outputs(item).map(ItemSuccess::produced)
    }
}

/// `<name>_protein_Repair.pdb` → `<receptors>/<name>_protein.pdbqt`.
pub fn receptor_items(config: &PipelineConfig) -> Result<Vec<WorkItem>> {
    let out_dir = config.resolve(&config.directories.receptors);
    let items = discover(&config.root_dir(), REPAIRED_PDB)?
        .into_iter()
        .filter_map(|input| {
            let output = replace_suffix(&file_name(&input), REPAIRED_PDB, PROTEIN_PDBQT)?;
            Some(WorkItem::single(input, vec![out_dir.join(output)]))
        })
        .collect();
    Ok(items)
}

#[instrument(skip_all)]
pub async fn run_prepare_receptors(
    config: &PipelineConfig,
    executor: Arc<dyn ToolExecutor>,
) -> Result<BatchReport> {
    stage::ensure_dir(&config.resolve(&config.directories.receptors))?;
    let items = receptor_items(config)?;
    let job = Arc::new(ReceptorJob::new(executor, config));
    stage::runner(config, stage::tool_workers(config)).run(items, job).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::fake::{flag_value, relative_to_cwd, tool_path, ScriptedExecutor};

    #[tokio::test]
    async fn test_prepare_writes_into_receptor_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.workspace.root = dir.path().to_path_buf();
        std::fs::write(dir.path().join("abc_protein_Repair.pdb"), "ATOM\n").unwrap();
        std::fs::write(dir.path().join("abc_protein.pdb"), "ATOM\n").unwrap();

        let executor = Arc::new(ScriptedExecutor::new(|inv| {
            let out = flag_value(inv, "-o").unwrap();
            std::fs::write(out, "REMARK\n").unwrap();
            Ok(())
        }));

        let report = run_prepare_receptors(&config, executor.clone()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(executor.call_count(), 1);

        let expected = dir.path().join("input_protein_pdbqt").join("abc_protein.pdbqt");
        assert!(expected.exists());
        let call = &executor.calls.lock().unwrap()[0];
        assert_eq!(call.args[4..], ["-A".to_string(), "bonds_hydrogens".to_string()]);
    }

    #[tokio::test]
    async fn test_relative_root_is_not_applied_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.workspace.root = relative_to_cwd(dir.path());
        assert!(config.workspace.root.is_relative());
        std::fs::write(dir.path().join("abc_protein_Repair.pdb"), "ATOM\n").unwrap();

        let executor = Arc::new(ScriptedExecutor::new(|inv| {
            let out = tool_path(inv, flag_value(inv, "-o").unwrap());
            std::fs::create_dir_all(out.parent().unwrap()).unwrap();
            std::fs::write(out, "REMARK\n").unwrap();
            Ok(())
        }));

        let report = run_prepare_receptors(&config, executor).await.unwrap();
        assert_eq!(report.succeeded.len(), 1, "{:?}", report.failed);
        assert!(dir.path().join("input_protein_pdbqt").join("abc_protein.pdbqt").exists());
    }
}
