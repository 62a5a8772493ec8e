//! Cross-product docking with ADFR.
//!
//! Every ligand is docked against every affinity map. The engine writes its
//! artifacts next to an output prefix in the results directory; the pose
//! file and docking object are then moved to their own directories while
//! the summary log stays behind for ranking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use ferrodock_common::config::DockingParams;
use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::naming::{
    file_stem, ligand_short, pair_prefix, DOCKING_OBJECT_EXT, DOCK_LIGAND_PDBQT, POSE_SUFFIX,
    SUMMARY_LOG_SUFFIX, TARGET_EXT,
};
use ferrodock_common::PipelineConfig;
use ferrodock_runner::work::{cross_product, discover};
use ferrodock_runner::{BatchJob, BatchReport, ItemSuccess, ToolExecutor, ToolInvocation, WorkInput, WorkItem};

use crate::stage;

/// Where one docking pair's artifacts are produced and where they end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockingLayout {
    /// `<results>/<map>-<ligand_stem>`
    pub prefix: PathBuf,
    /// `<poses>/<map>-<ligand_short>_out.pdbqt`
    pub pose: PathBuf,
    /// `<results>/<objects>/<map>-<ligand_short>.dro`
    pub docking_object: PathBuf,
    /// `<prefix>_summary.dlg`, left in place
    pub summary_log: PathBuf,
}

impl DockingLayout {
    pub fn new(config: &PipelineConfig, ligand: &Path, map: &Path) -> Self {
        let map_name = file_stem(map);
        let ligand_stem = file_stem(ligand);
        let short = pair_prefix(&map_name, &ligand_short(&ligand_stem));
        let prefix = config
            .resolve(&config.directories.docking_results)
            .join(pair_prefix(&map_name, &ligand_stem));
        let summary_log = with_suffix(&prefix, SUMMARY_LOG_SUFFIX);

        Self {
            pose: config.resolve(&config.directories.poses).join(format!("{short}{POSE_SUFFIX}")),
            docking_object: config
                .docking_objects_dir()
                .join(format!("{short}{DOCKING_OBJECT_EXT}")),
            summary_log,
            prefix,
        }
    }

    /// Expected outputs, in relocation order.
    pub fn outputs(&self) -> Vec<PathBuf> {
        vec![self.pose.clone(), self.docking_object.clone(), self.summary_log.clone()]
    }
}

/// `prefix` with `suffix` appended to its final component.
fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut raw = prefix.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Engine command line for one ligand/map pair.
pub fn docking_invocation(
    program: &str,
    params: &DockingParams,
    ligand: &Path,
    map: &Path,
    prefix: &Path,
) -> ToolInvocation {
    ToolInvocation::new(program)
        .arg("-l")
        .path_arg(ligand)
        .arg("-t")
        .path_arg(map)
        .arg("-o")
        .path_arg(prefix)
        .arg("--nbRuns")
        .arg(params.nb_runs.to_string())
        .arg("--maxEvals")
        .arg(params.max_evals.to_string())
        .arg("--noImproveStop")
        .arg(params.no_improve_stop.to_string())
        .arg("--maxGens")
        .arg(params.max_gens.to_string())
        .arg("--seed")
        .arg(params.seed.to_string())
        .args(params.option_args())
}

pub struct DockingJob {
    executor: Arc<dyn ToolExecutor>,
    program: String,
    params: DockingParams,
    workdir: PathBuf,
    config: PipelineConfig,
}

impl DockingJob {
    pub fn new(executor: Arc<dyn ToolExecutor>, config: &PipelineConfig) -> Self {
        Self {
            executor,
            program: config.tools.adfr.clone(),
            params: config.docking.clone(),
            workdir: config.root_dir(),
            config: config.clone(),
        }
    }
}

#[async_trait]
impl BatchJob for DockingJob {
    fn name(&self) -> &str {
        "dock"
    }

    async fn run(&self, item: &WorkItem) -> Result<ItemSuccess> {
        stage::expect_inputs(item)?;
        let WorkInput::Pair { first: ligand, second: map } = &item.input else {
            return Err(anyhow::anyhow!("{} is not a ligand/map pair", item.id).into());
        };
        let layout = DockingLayout::new(&self.config, ligand, map);

        let invocation =
            docking_invocation(&self.program, &self.params, ligand, map, &layout.prefix)
                .current_dir(&self.workdir);
        let outcome = self.executor.execute(&invocation).await?;
        debug!("{} docked in {:?}", item.id, outcome.elapsed);

        // Each artifact is accounted for on its own.
        let mut success = ItemSuccess::default();
        let pose = stage::relocate(&with_suffix(&layout.prefix, POSE_SUFFIX), &layout.pose);
        let object = stage::relocate(&with_suffix(&layout.prefix, DOCKING_OBJECT_EXT), &layout.docking_object);
        let summary = if layout.summary_log.exists() {
            Ok(layout.summary_log.clone())
        } else {
            Err(PipelineError::OutputArtifactMissing { path: layout.summary_log.clone() })
        };
        for outcome in [pose, object, summary] {
            match outcome {
                Ok(path) => success.produced.push(path),
                Err(e) => success.problems.push(e),
            }
        }

        if success.produced.is_empty() {
            return Err(success.problems.remove(0));
        }
        Ok(success)
    }
}

/// Every `*_dock.pdbqt` ligand × every `*.trg` map, ligand outer.
pub fn docking_items(config: &PipelineConfig) -> Result<Vec<WorkItem>> {
    let ligand_dir = config.resolve(&config.directories.dock_ligands);
    let map_dir = config.resolve(&config.directories.affinity_maps);
    let ligands = discover(&ligand_dir, DOCK_LIGAND_PDBQT)?;
    let maps = discover(&map_dir, TARGET_EXT)?;
    if ligands.is_empty() {
        return Err(PipelineError::InputNotFound { path: ligand_dir.join(format!("*{DOCK_LIGAND_PDBQT}")) });
    }
    if maps.is_empty() {
        return Err(PipelineError::InputNotFound { path: map_dir.join(format!("*{TARGET_EXT}")) });
    }

    let items = cross_product(&ligands, &maps)
        .into_iter()
        .map(|(ligand, map)| {
            let layout = DockingLayout::new(config, &ligand, &map);
            let id = pair_prefix(&file_stem(&map), &file_stem(&ligand));
            WorkItem::pair(id, ligand, map, layout.outputs())
        })
        .collect();
    Ok(items)
}

/// Dock every ligand against every map on half the tool budget.
#[instrument(skip_all)]
pub async fn run_docking(config: &PipelineConfig, executor: Arc<dyn ToolExecutor>) -> Result<BatchReport> {
    let items = docking_items(config)?;
    for dir in [
        config.resolve(&config.directories.docking_results),
        config.resolve(&config.directories.poses),
        config.docking_objects_dir(),
    ] {
        stage::ensure_dir(&dir)?;
    }
    let workers = stage::docking_workers(config);
    info!("Docking {} pairs on {} workers", items.len(), workers);
    let job = Arc::new(DockingJob::new(executor, config));
    stage::runner(config, workers).run(items, job).await
}
