//! Structure repair with FoldX.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use ferrodock_common::error::Result;
use ferrodock_common::naming::{file_name, replace_suffix, PROTEIN_PDB, REPAIRED_PDB};
use ferrodock_common::PipelineConfig;
use ferrodock_runner::work::discover;
use ferrodock_runner::{BatchJob, BatchReport, ItemSuccess, ToolExecutor, ToolInvocation, WorkItem};

use crate::stage;

/// Runs `RepairPDB` on one `*_protein.pdb` in the working directory.
pub struct RepairJob {
    executor: Arc<dyn ToolExecutor>,
    program: String,
    workdir: PathBuf,
}

impl RepairJob {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: &PipelineConfig) -> Self {
        Self {
            executor,
            program: config.tools.foldx.clone(),
            workdir: config.root_dir(),
        }
    }
}

#[async_trait]
impl BatchJob for RepairJob {
    fn name(&self) -> &str {
        "repair"
    }

    async fn run(&self, item: &WorkItem) -> Result<ItemSuccess> {
        stage::expect_inputs(item)?;
        // FoldX resolves --pdb against its working directory.
        let invocation = ToolInvocation::new(&self.program)
            .arg("--command=RepairPDB")
            .arg(format!("--pdb={}", file_name(item.primary_input())))
            .current_dir(&self.workdir);
        let outcome = self.executor.execute(&invocation).await?;
        debug!("{} repaired in {:?}", item.id, outcome.elapsed);
        stage::expect_outputs(item).map(ItemSuccess::produced)
    }
}

/// One item per `*_protein.pdb`, expecting `*_protein_Repair.pdb` beside it.
pub fn repair_items(config: &PipelineConfig) -> Result<Vec<WorkItem>> {
    let root = &config.root_dir();
    let items = discover(root, PROTEIN_PDB)?
        .into_iter()
        .filter_map(|input| {
            let output = replace_suffix(&file_name(&input), PROTEIN_PDB, REPAIRED_PDB)?;
            Some(WorkItem::single(input, vec![root.join(output)]))
        })
        .collect();
    Ok(items)
}

#[instrument(skip_all)]
pub async fn run_repair(config: &PipelineConfig, executor: Arc<dyn ToolExecutor>) -> Result<BatchReport> {
    let items = repair_items(config)?;
    let job = Arc::new(RepairJob::new(executor, config));
    stage::runner(config, stage::tool_workers(config)).run(items, job).await
}
