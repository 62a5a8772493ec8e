//! Affinity-map generation with AGFR.
//!
//! Each receptor is paired with the reference ligand of the same protein
//! (`<name>_ligand.pdbqt`), which defines the docking box.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use ferrodock_common::error::Result;
use ferrodock_common::naming::{protein_name, LIGAND_PDBQT, PDBQT_EXT, TARGET_EXT};
use ferrodock_common::PipelineConfig;
use ferrodock_runner::work::discover;
use ferrodock_runner::{BatchJob, BatchReport, ItemSuccess, ToolExecutor, ToolInvocation, WorkInput, WorkItem};

use crate::stage;

pub struct AffinityMapJob {
    executor: Arc<dyn ToolExecutor>,
    program: String,
    workdir: PathBuf,
}

impl AffinityMapJob {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: &PipelineConfig) -> Self {
        Self {
            executor,
            program: config.tools.agfr.clone(),
            workdir: config.root_dir(),
        }
    }
}

#[async_trait]
impl BatchJob for AffinityMapJob {
    fn name(&self) -> &str {
        "affinity-maps"
    }

    async fn run(&self, item: &WorkItem) -> Result<ItemSuccess> {
        // A receptor without its reference ligand fails here as InputNotFound.
        stage::expect_inputs(item)?;
        let WorkInput::Pair { first: receptor, second: ligand } = &item.input else {
            return Err(anyhow::anyhow!("{} is not a receptor/ligand pair", item.id).into());
        };
        let invocation = ToolInvocation::new(&self.program)
            .arg("-r")
            .path_arg(receptor)
            .arg("-l")
            .path_arg(ligand)
            .arg("-o")
            .path_arg(stage::primary_output(item)?)
            .current_dir(&self.workdir);
        self.executor.execute(&invocation).await?;
        stage::expect_outputs(item).map(ItemSuccess::produced)
    }
}

/// One item per receptor: `(receptor, <ligands>/<name>_ligand.pdbqt)` →
/// `<maps>/<name>.trg`.
pub fn affinity_items(config: &PipelineConfig) -> Result<Vec<WorkItem>> {
    let ligand_dir = config.resolve(&config.directories.ligands);
    let map_dir = config.resolve(&config.directories.affinity_maps);

    let items = discover(&config.resolve(&config.directories.receptors), PDBQT_EXT)?
        .into_iter()
        .map(|receptor| {
            let name = protein_name(&receptor);
            let ligand = ligand_dir.join(format!("{name}{LIGAND_PDBQT}"));
            let map = map_dir.join(format!("{name}{TARGET_EXT}"));
            WorkItem::pair(name, receptor, ligand, vec![map])
        })
        .collect();
    Ok(items)
}

#[instrument(skip_all)]
pub async fn run_affinity_maps(
    config: &PipelineConfig,
    executor: Arc<dyn ToolExecutor>,
) -> Result<BatchReport> {
    stage::ensure_dir(&config.resolve(&config.directories.affinity_maps))?;
    let items = affinity_items(config)?;
    let job = Arc::new(AffinityMapJob::new(executor, config));
    stage::runner(config, stage::tool_workers(config)).run(items, job).await
}
