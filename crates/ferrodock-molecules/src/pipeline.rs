//! Sequencing of the tool stages.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use ferrodock_common::error::Result;
use ferrodock_common::PipelineConfig;
use ferrodock_runner::{BatchReport, ToolExecutor};

use crate::{affinity, convert, docking, receptor, repair};

/// A batch stage driven by an external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStage {
    Repair,
    PrepareReceptor,
    AffinityMaps,
    Dock,
    Convert,
}

impl ToolStage {
    /// Stages from structure repair through docking, in dependency order.
    pub const DOCKING_CHAIN: [ToolStage; 4] = [
        ToolStage::Repair,
        ToolStage::PrepareReceptor,
        ToolStage::AffinityMaps,
        ToolStage::Dock,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolStage::Repair => "repair",
            ToolStage::PrepareReceptor => "prepare-receptor",
            ToolStage::AffinityMaps => "affinity-maps",
            ToolStage::Dock => "dock",
            ToolStage::Convert => "convert",
        }
    }
}

impl fmt::Display for ToolStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs tool stages against one workspace.
pub struct DockingPipeline {
    config: PipelineConfig,
    executor: Arc<dyn ToolExecutor>,
}

impl DockingPipeline {
    pub fn new(config: PipelineConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_stage(&self, stage: ToolStage) -> Result<BatchReport> {
        let executor = Arc::clone(&self.executor);
        match stage {
            ToolStage::Repair => repair::run_repair(&self.config, executor).await,
            ToolStage::PrepareReceptor => receptor::run_prepare_receptors(&self.config, executor).await,
            ToolStage::AffinityMaps => affinity::run_affinity_maps(&self.config, executor).await,
            ToolStage::Dock => docking::run_docking(&self.config, executor).await,
            ToolStage::Convert => convert::run_convert(&self.config, executor).await,
        }
    }

    /// Repair → receptor preparation → affinity maps → docking.
    ///
    /// Stops after a stage in which every item failed, since the next stage
    /// would find nothing to consume.
    pub async fn run_docking_chain(&self) -> Result<Vec<BatchReport>> {
        let mut reports = Vec::with_capacity(ToolStage::DOCKING_CHAIN.len());
        for stage in ToolStage::DOCKING_CHAIN {
            info!("Starting stage {}", stage);
            let report = self.run_stage(stage).await?;
            let halt = report.all_failed();
            reports.push(report);
            if halt {
                warn!("Stage {} failed for every item; stopping", stage);
                break;
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::fake::{flag_value, ScriptedExecutor};
    use ferrodock_common::naming::{DOCKING_OBJECT_EXT, POSE_SUFFIX, SUMMARY_LOG_SUFFIX};

    /// Emulates each tool by writing the file it would produce.
    fn emulate(root: std::path::PathBuf) -> ScriptedExecutor {
        ScriptedExecutor::new(move |inv| {
            match inv.program.as_str() {
                "foldx" => {
                    let pdb = inv.args[1].trim_start_matches("--pdb=");
                    let repaired = pdb.replace("_protein.pdb", "_protein_Repair.pdb");
                    std::fs::write(root.join(repaired), "ATOM\n").unwrap();
                }
                "prepare_receptor" | "agfr" => {
                    std::fs::write(flag_value(inv, "-o").unwrap(), "x").unwrap();
                }
                "adfr" => {
                    let prefix = flag_value(inv, "-o").unwrap();
                    for suffix in [POSE_SUFFIX, DOCKING_OBJECT_EXT, SUMMARY_LOG_SUFFIX] {
                        std::fs::write(format!("{prefix}{suffix}"), "x").unwrap();
                    }
                }
                other => panic!("unexpected tool {other}"),
            }
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_docking_chain_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut config = PipelineConfig::default();
        config.workspace.root = root.clone();

        std::fs::write(root.join("abc_protein.pdb"), "ATOM\n").unwrap();
        std::fs::create_dir_all(root.join("input_ligand_pdbqt")).unwrap();
        std::fs::write(root.join("input_ligand_pdbqt/abc_ligand.pdbqt"), "").unwrap();
        std::fs::create_dir_all(root.join("input_dock_pdbqt")).unwrap();
        std::fs::write(root.join("input_dock_pdbqt/zinc1_dock.pdbqt"), "").unwrap();

        let pipeline = DockingPipeline::new(config, Arc::new(emulate(root.clone())));
        let reports = pipeline.run_docking_chain().await.unwrap();

        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|r| r.is_clean() && r.total == 1));
        assert!(root.join("output_dock_pdbqt/abc-zinc1_out.pdbqt").exists());
        assert!(root.join("docking_results/abc-zinc1_dock_summary.dlg").exists());
    }

    #[tokio::test]
    async fn test_chain_stops_after_total_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.workspace.root = dir.path().to_path_buf();
        std::fs::write(dir.path().join("abc_protein.pdb"), "ATOM\n").unwrap();

        // Repair never produces its output.
        let executor = Arc::new(ScriptedExecutor::new(|_| Ok(())));
        let pipeline = DockingPipeline::new(config, executor.clone());
        let reports = pipeline.run_docking_chain().await.unwrap();

        assert_eq!(reports.len(), 1);
        assert!(reports[0].all_failed());
        assert_eq!(executor.call_count(), 1);
    }
}
