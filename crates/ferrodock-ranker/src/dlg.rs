//! Docking-log (`.dlg`) results-table parser.
//!
//! A log names its receptor on the `Unpacking maps` line and its ligand on
//! the `reading ligand` line, then prints a table under a `mode |  affinity`
//! header. Every following line that starts with a digit is a candidate row.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::naming::{file_name, DLG_EXT};

use crate::table::ScoredRecord;

const RECEPTOR_MARKER: &str = "Unpacking maps";
const LIGAND_MARKER: &str = "reading ligand";
const TABLE_HEADER: &str = "mode |  affinity";
const MIN_FIELDS: usize = 8;

/// Outcome of one candidate table row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Ok(ScoredRecord),
    Skipped(String),
}

/// Records and skipped rows of one log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogParse {
    pub records: Vec<ScoredRecord>,
    /// Reason for every candidate row that was not turned into a record
    pub skipped: Vec<String>,
}

/// Name carried after `marker` on its line: the last token, last path
/// segment, up to the first dot (`/maps/rec.trg` → `rec`).
fn marker_name(line: &str, marker: &str) -> Option<String> {
    let (_, rest) = line.split_once(marker)?;
    let token = rest.split_whitespace().last()?;
    let segment = token.rsplit('/').next().unwrap_or(token);
    let name = segment.split('.').next().unwrap_or(segment);
    (!name.is_empty()).then(|| name.to_string())
}

fn starts_with_digit(line: &str) -> bool {
    line.trim_start().chars().next().is_some_and(|c| c.is_ascii_digit())
}

fn field<T: std::str::FromStr>(fields: &[&str], index: usize, column: &str) -> std::result::Result<T, String> {
    fields[index]
        .parse()
        .map_err(|_| format!("{column} {:?} is not a number", fields[index]))
}

fn build_record(receptor: &str, ligand: &str, fields: &[&str]) -> std::result::Result<ScoredRecord, String> {
    Ok(ScoredRecord {
        receptor: receptor.to_string(),
        ligand: ligand.to_string(),
        mode: field(fields, 0, "mode")?,
        affinity: field(fields, 1, "affinity")?,
        clust_rmsd: field(fields, 2, "clust_rmsd")?,
        ref_rmsd: fields[3].parse().ok(),
        clust_size: field(fields, 4, "clust_size")?,
        rmsd_stdv: field(fields, 5, "rmsd_stdv")?,
        energy_stdv: field(fields, 6, "energy_stdv")?,
        best_run: field(fields, 7, "best_run")?,
    })
}

/// Turn one candidate row into a record.
pub fn parse_row(receptor: &str, ligand: &str, line: &str) -> RowOutcome {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < MIN_FIELDS {
        return RowOutcome::Skipped(format!(
            "{} fields, need {}: {:?}",
            fields.len(),
            MIN_FIELDS,
            line.trim()
        ));
    }
    match build_record(receptor, ligand, &fields) {
        Ok(record) if !record.affinity.is_finite() => {
            RowOutcome::Skipped(format!("affinity {:?} is not finite", fields[1]))
        }
        Ok(record) => RowOutcome::Ok(record),
        Err(reason) => RowOutcome::Skipped(reason),
    }
}

/// Parse a whole log. A log lacking the table header or either marker
/// yields a `ParseFormat` error and no records.
pub fn parse_log(source_name: &str, text: &str) -> Result<LogParse> {
    let lines: Vec<&str> = text.lines().collect();
    let mut receptor = None;
    let mut ligand = None;
    let mut header = None;

    for (i, line) in lines.iter().enumerate() {
        if line.contains(RECEPTOR_MARKER) {
            receptor = marker_name(line, RECEPTOR_MARKER);
        } else if line.contains(LIGAND_MARKER) {
            ligand = marker_name(line, LIGAND_MARKER);
        } else if line.contains(TABLE_HEADER) {
            header = Some(i);
            break;
        }
    }

    let (Some(receptor), Some(ligand), Some(header)) = (receptor, ligand, header) else {
        return Err(PipelineError::parse(
            source_name,
            "missing results header or receptor/ligand marker",
        ));
    };

    let mut parse = LogParse::default();
    for line in lines[header + 1..].iter().filter(|l| starts_with_digit(l)) {
        match parse_row(&receptor, &ligand, line) {
            RowOutcome::Ok(record) => parse.records.push(record),
            RowOutcome::Skipped(reason) => {
                debug!("{}: skipped row: {}", source_name, reason);
                parse.skipped.push(reason);
            }
        }
    }
    Ok(parse)
}

/// Records of every log in a directory.
#[derive(Debug, Default)]
pub struct DirectoryParse {
    pub records: Vec<ScoredRecord>,
    pub logs_parsed: usize,
    pub skipped_rows: usize,
    pub skipped_logs: Vec<(PathBuf, PipelineError)>,
}

/// Parse every `.dlg` in `dir`, in file-name order.
pub fn collect_directory(dir: &Path) -> Result<DirectoryParse> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && file_name(p).ends_with(DLG_EXT))
        .collect();
    logs.sort();

    let mut out = DirectoryParse::default();
    for log in logs {
        let parsed = std::fs::read(&log)
            .map_err(|e| PipelineError::io(&log, e))
            .and_then(|bytes| parse_log(&file_name(&log), &String::from_utf8_lossy(&bytes)));
        match parsed {
            Ok(parse) => {
                out.logs_parsed += 1;
                out.skipped_rows += parse.skipped.len();
                out.records.extend(parse.records);
            }
            Err(e) => {
                warn!("Skipping {}: {}", file_name(&log), e);
                out.skipped_logs.push((log, e));
            }
        }
    }

    info!(
        "Collected {} records from {} logs ({} rows skipped, {} logs skipped)",
        out.records.len(),
        out.logs_parsed,
        out.skipped_rows,
        out.skipped_logs.len()
    );
    Ok(out)
}
