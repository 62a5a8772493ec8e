//! Materialise a ranked selection as standalone pose files.
//!
//! For rank `NN` of label `L` and a record `(rec, lig)`:
//!
//! - `<label dir>/<rec>-<lig>_L_NN.pdbqt`: the selected model only
//! - `<top receptors>/<rec>-<lig>_L_NN.pdbqt`: the full pose file
//! - `<top receptors>/<rec>_L_NN.pdbqt`: the receptor
//!
//! where `lig` has its `_dock` tag removed.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::naming::{ligand_short, pair_prefix, rank_tag, POSE_SUFFIX, PROTEIN_PDBQT};

use crate::model_block::write_model_block;
use crate::rank::RankedSelection;

/// Directories a selection reads from and writes into.
#[derive(Debug, Clone)]
pub struct SelectionDirs {
    /// Multi-model pose files, `<rec>-<lig>_out.pdbqt`
    pub poses: PathBuf,
    /// Prepared receptors, `<rec>_protein.pdbqt`
    pub receptors: PathBuf,
    /// Output for the extracted models of this label
    pub output: PathBuf,
    pub top_receptors: PathBuf,
}

#[derive(Debug, Default)]
pub struct SelectionReport {
    pub label: String,
    /// Extracted single-model files, in rank order
    pub models: Vec<PathBuf>,
    /// Pose-file and receptor copies in the top-receptor directory
    pub companions: Vec<PathBuf>,
    /// `(rank tag, error)` for every file that could not be written
    pub failures: Vec<(String, PipelineError)>,
}

fn copy_file(source: &Path, destination: &Path) -> Result<PathBuf> {
    if !source.exists() {
        return Err(PipelineError::InputNotFound { path: source.to_path_buf() });
    }
    std::fs::copy(source, destination).map_err(|e| PipelineError::io(source, e))?;
    Ok(destination.to_path_buf())
}

/// Write every entry of `selection`. Per-entry failures are collected and
/// logged; only failing to create the output directories is an error.
pub fn materialise_selection(selection: &RankedSelection, dirs: &SelectionDirs) -> Result<SelectionReport> {
    for dir in [&dirs.output, &dirs.top_receptors] {
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    }

    let label = selection.direction.label();
    let mut report = SelectionReport { label: label.to_string(), ..Default::default() };

    for (position, record) in selection.entries.iter().enumerate() {
        let tag = rank_tag(label, position + 1);
        let pair = pair_prefix(&record.receptor, &ligand_short(&record.ligand));
        let pose_file = dirs.poses.join(format!("{pair}{POSE_SUFFIX}"));
        let selected_name = format!("{pair}_{tag}.pdbqt");

        let model = dirs.output.join(&selected_name);
        match write_model_block(&pose_file, record.mode, &model) {
            Ok(_) => {
                info!(
                    "{} {}: {} affinity {:.2}, model {} -> {}",
                    label,
                    position + 1,
                    pair,
                    record.affinity,
                    record.mode,
                    model.display()
                );
                report.models.push(model);
            }
            Err(e) => {
                warn!("{}: {}", tag, e);
                report.failures.push((tag.clone(), e));
            }
        }

        let receptor = dirs.receptors.join(format!("{}{PROTEIN_PDBQT}", record.receptor));
        let companions = [
            (pose_file, dirs.top_receptors.join(&selected_name)),
            (receptor, dirs.top_receptors.join(format!("{}_{tag}.pdbqt", record.receptor))),
        ];
        for (source, destination) in companions {
            match copy_file(&source, &destination) {
                Ok(path) => report.companions.push(path),
                Err(e) => {
                    warn!("{}: {}", tag, e);
                    report.failures.push((tag.clone(), e));
                }
            }
        }
    }

    info!(
        "Selected {} {} models ({} companions, {} failures)",
        report.models.len(),
        label,
        report.companions.len(),
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::{rank, Direction};
    use crate::table::record;

    const POSES: &str = "MODEL 1\nATOM a\nENDMDL\nMODEL 2\nATOM b\nENDMDL\n";

    fn dirs(root: &Path) -> SelectionDirs {
        SelectionDirs {
            poses: root.join("output_dock_pdbqt"),
            receptors: root.join("input_protein_pdbqt"),
            output: root.join("output_best_pdbqt"),
            top_receptors: root.join("top_receptor"),
        }
    }

    #[test]
    fn test_materialise_writes_models_and_companions() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = dirs(dir.path());
        std::fs::create_dir_all(&dirs.poses).unwrap();
        std::fs::create_dir_all(&dirs.receptors).unwrap();
        std::fs::write(dirs.poses.join("rec-lig_out.pdbqt"), POSES).unwrap();
        std::fs::write(dirs.receptors.join("rec_protein.pdbqt"), "RECEPTOR\n").unwrap();

        let records = vec![record("rec", "lig_dock", 1, -7.1), record("rec", "lig_dock", 2, -8.5)];
        let selection = rank(&records, Direction::Best, 10);
        let report = materialise_selection(&selection, &dirs).unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(
            std::fs::read_to_string(dirs.output.join("rec-lig_best_01.pdbqt")).unwrap(),
            "MODEL 2\nATOM b\nENDMDL\n"
        );
        assert_eq!(
            std::fs::read_to_string(dirs.output.join("rec-lig_best_02.pdbqt")).unwrap(),
            "MODEL 1\nATOM a\nENDMDL\n"
        );
        assert_eq!(
            std::fs::read_to_string(dirs.top_receptors.join("rec-lig_best_01.pdbqt")).unwrap(),
            POSES
        );
        assert_eq!(
            std::fs::read_to_string(dirs.top_receptors.join("rec_best_02.pdbqt")).unwrap(),
            "RECEPTOR\n"
        );
        assert_eq!(report.companions.len(), 4);
    }

    #[test]
    fn test_missing_receptor_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = dirs(dir.path());
        std::fs::create_dir_all(&dirs.poses).unwrap();
        std::fs::write(dirs.poses.join("rec-lig_out.pdbqt"), POSES).unwrap();

        let selection = rank(&[record("rec", "lig", 2, -8.0)], Direction::Worst, 10);
        let mut dirs = dirs;
        dirs.output = dir.path().join("output_worst_pdbqt");
        let report = materialise_selection(&selection, &dirs).unwrap();

        assert_eq!(report.models.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "worst_01");
        assert!(matches!(report.failures[0].1, PipelineError::InputNotFound { .. }));
    }

    #[test]
    fn test_missing_model_index_collected() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = dirs(dir.path());
        std::fs::create_dir_all(&dirs.poses).unwrap();
        std::fs::create_dir_all(&dirs.receptors).unwrap();
        std::fs::write(dirs.poses.join("rec-lig_out.pdbqt"), POSES).unwrap();
        std::fs::write(dirs.receptors.join("rec_protein.pdbqt"), "R\n").unwrap();

        let selection = rank(&[record("rec", "lig", 9, -8.0)], Direction::Best, 1);
        let report = materialise_selection(&selection, &dirs).unwrap();
        assert!(report.models.is_empty());
        assert!(matches!(report.failures[0].1, PipelineError::ModelIndexNotFound { index: 9, .. }));
        assert_eq!(report.companions.len(), 2);
    }
}
