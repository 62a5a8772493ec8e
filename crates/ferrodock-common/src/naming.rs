//! File-naming conventions linking the stages.
//!
//! The directory tree is the inter-stage protocol: each stage discovers its
//! inputs by suffix and names its outputs so the next stage can find them.
//! A suffix mismatch yields an empty work set, never an error.

use std::path::Path;

pub const PROTEIN_PDB: &str = "_protein.pdb";
pub const REPAIRED_PDB: &str = "_protein_Repair.pdb";
pub const PROTEIN_PDBQT: &str = "_protein.pdbqt";
pub const PROTEIN_TAG: &str = "_protein";
pub const LIGAND_PDBQT: &str = "_ligand.pdbqt";
pub const DOCK_LIGAND_PDBQT: &str = "_dock.pdbqt";
pub const DOCK_TAG: &str = "_dock";
pub const TARGET_EXT: &str = ".trg";
pub const PDBQT_EXT: &str = ".pdbqt";
pub const DLG_EXT: &str = ".dlg";

/// Files emitted by the docking engine for an output prefix.
pub const POSE_SUFFIX: &str = "_out.pdbqt";
pub const SUMMARY_LOG_SUFFIX: &str = "_summary.dlg";
pub const DOCKING_OBJECT_EXT: &str = ".dro";

pub const BEST_LABEL: &str = "best";
pub const WORST_LABEL: &str = "worst";

/// Replace `suffix` at the end of `name`, or `None` if it does not end with it.
pub fn replace_suffix(name: &str, suffix: &str, replacement: &str) -> Option<String> {
    name.strip_suffix(suffix)
        .map(|stem| format!("{stem}{replacement}"))
}

/// File name as UTF-8, lossy.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Name with the final extension removed (`a.b.pdbqt` → `a.b`).
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Protein name of a receptor file: stem with every `_protein` tag removed.
pub fn protein_name(receptor: &Path) -> String {
    file_stem(receptor).replace(PROTEIN_TAG, "")
}

/// Ligand name without the `_dock` tag.
pub fn ligand_short(ligand: &str) -> String {
    ligand.replace(DOCK_TAG, "")
}

/// `<receptor>-<ligand>`; the pairing key used by docking outputs.
pub fn pair_prefix(receptor: &str, ligand: &str) -> String {
    format!("{receptor}-{ligand}")
}

/// 1-based rank, zero-padded to two digits.
pub fn rank_tag(label: &str, rank: usize) -> String {
    format!("{label}_{rank:02}")
}
