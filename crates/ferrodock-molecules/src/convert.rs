//! Chemical format conversion of the selected poses with Open Babel.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use ferrodock_common::error::Result;
use ferrodock_common::naming::{file_name, file_stem, PDBQT_EXT};
use ferrodock_common::PipelineConfig;
use ferrodock_runner::work::discover;
use ferrodock_runner::{BatchJob, BatchReport, ItemSuccess, ToolExecutor, ToolInvocation, WorkItem};

use crate::stage;

pub struct ConvertJob {
    executor: Arc<dyn ToolExecutor>,
    program: String,
    extra_args: Vec<String>,
    workdir: PathBuf,
}

impl ConvertJob {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: &PipelineConfig) -> Self {
        Self {
            executor,
            program: config.tools.obabel.clone(),
            extra_args: config.conversion.extra_args.clone(),
            workdir: config.root_dir(),
        }
    }
}

#[async_trait]
impl BatchJob for ConvertJob {
    fn name(&self) -> &str {
        "convert"
    }

    async fn run(&self, item: &WorkItem) -> Result<ItemSuccess> {
        stage::expect_inputs(item)?;
        // The output extension selects the format.
        let invocation = ToolInvocation::new(&self.program)
            .path_arg(item.primary_input())
            .arg("-O")
            .path_arg(stage::primary_output(item)?)
            .args(self.extra_args.iter().cloned())
            .current_dir(&self.workdir);
        self.executor.execute(&invocation).await?;
        stage::expect_outputs(item).map(ItemSuccess::produced)
    }
}

/// One item per (best pose, format): `<pose>.pdbqt` → `output_best_<fmt>/<pose>.<fmt>`.
pub fn convert_items(config: &PipelineConfig) -> Result<Vec<WorkItem>> {
    let poses = discover(&config.resolve(&config.directories.best_poses), PDBQT_EXT)?;
    let mut items = Vec::with_capacity(poses.len() * config.conversion.formats.len());
    for pose in poses {
        for format in &config.conversion.formats {
            let out_dir = config.resolve(&config.conversion.output_dir(format));
            let output = out_dir.join(format!("{}.{format}", file_stem(&pose)));
            let id = format!("{}:{format}", file_name(&pose));
            items.push(WorkItem::single(pose.clone(), vec![output]).with_id(id));
        }
    }
    Ok(items)
}

#[instrument(skip_all)]
pub async fn run_convert(config: &PipelineConfig, executor: Arc<dyn ToolExecutor>) -> Result<BatchReport> {
    for format in &config.conversion.formats {
        stage::ensure_dir(&config.resolve(&config.conversion.output_dir(format)))?;
    }
    let items = convert_items(config)?;
    let job = Arc::new(ConvertJob::new(executor, config));
    stage::runner(config, stage::tool_workers(config)).run(items, job).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::fake::{flag_value, ScriptedExecutor};

    #[tokio::test]
    async fn test_each_pose_converted_to_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.workspace.root = dir.path().to_path_buf();
        config.conversion.extra_args = vec!["-h".to_string()];
        let best = dir.path().join("output_best_pdbqt");
        std::fs::create_dir_all(&best).unwrap();
        std::fs::write(best.join("rec-lig_best_01.pdbqt"), "MODEL 1\n").unwrap();

        let executor = Arc::new(ScriptedExecutor::new(|inv| {
            std::fs::write(flag_value(inv, "-O").unwrap(), "mol").unwrap();
            Ok(())
        }));

        let report = run_convert(&config, executor.clone()).await.unwrap();
        assert_eq!(report.total, 2);
        assert!(report.is_clean());
        assert!(dir.path().join("output_best_mol/rec-lig_best_01.mol").exists());
        assert!(dir.path().join("output_best_mol2/rec-lig_best_01.mol2").exists());
        assert!(executor.displays().iter().all(|line| line.ends_with(" -h")));
        assert_eq!(report.succeeded[0].item_id, "rec-lig_best_01.pdbqt:mol");
    }
}
