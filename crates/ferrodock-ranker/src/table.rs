//! The tab-separated binding-score table.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ferrodock_common::error::{PipelineError, Result};

/// One row of a docking results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub receptor: String,
    pub ligand: String,
    /// 1-based pose index within the pose file
    pub mode: u32,
    /// Binding energy in kcal/mol; lower is better
    #[serde(rename = "affinity_(kcal/mol)")]
    pub affinity: f64,
    pub clust_rmsd: f64,
    /// Absent (`NA`) when docking ran without a reference pose
    #[serde(with = "na_float")]
    pub ref_rmsd: Option<f64>,
    pub clust_size: u32,
    pub rmsd_stdv: f64,
    pub energy_stdv: f64,
    pub best_run: u32,
}

/// Column order of the persisted table.
pub const COLUMNS: [&str; 10] = [
    "receptor",
    "ligand",
    "mode",
    "affinity_(kcal/mol)",
    "clust_rmsd",
    "ref_rmsd",
    "clust_size",
    "rmsd_stdv",
    "energy_stdv",
    "best_run",
];

mod na_float {
    use serde::{Deserialize, Deserializer, Serializer};

    const NA: &str = "NA";

    pub fn serialize<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_f64(*v),
            None => serializer.serialize_str(NA),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        if raw.is_empty() || raw == NA {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

fn csv_error(path: &Path, e: csv::Error) -> PipelineError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => PipelineError::io(path, io),
        other => PipelineError::parse(path.display().to_string(), format!("{other:?}")),
    }
}

/// Write records with a header row, tab-separated.
pub fn write_table(path: &Path, records: &[ScoredRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;
    // Written by hand so an empty table still carries its header.
    writer.write_record(COLUMNS).map_err(|e| csv_error(path, e))?;
    for record in records {
        writer.serialize(record).map_err(|e| csv_error(path, e))?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

/// Read a table written by [`write_table`].
pub fn read_table(path: &Path) -> Result<Vec<ScoredRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;
    reader
        .deserialize()
        .map(|row| row.map_err(|e| csv_error(path, e)))
        .collect()
}

#[cfg(test)]
pub(crate) fn record(receptor: &str, ligand: &str, mode: u32, affinity: f64) -> ScoredRecord {
    ScoredRecord {
        receptor: receptor.to_string(),
        ligand: ligand.to_string(),
        mode,
        affinity,
        clust_rmsd: 0.5,
        ref_rmsd: Some(0.3),
        clust_size: 10,
        rmsd_stdv: 0.1,
        energy_stdv: 0.2,
        best_run: 1,
    }
}
