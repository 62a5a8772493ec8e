//! Ranking stages: `summarize` builds the score tables, `select` cuts the
//! top poses out of the docking output.

use std::path::PathBuf;

use tracing::{info, instrument};

use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::PipelineConfig;

use crate::dlg::collect_directory;
use crate::rank::{rank, Direction};
use crate::select::{materialise_selection, SelectionDirs, SelectionReport};
use crate::table::{read_table, write_table};

#[derive(Debug)]
pub struct SummaryReport {
    pub records: usize,
    pub logs_parsed: usize,
    pub skipped_rows: usize,
    pub skipped_logs: Vec<(PathBuf, PipelineError)>,
    pub summary_file: PathBuf,
    pub best_file: PathBuf,
    pub worst_file: PathBuf,
}

impl SummaryReport {
    pub fn summary(&self) -> String {
        format!(
            "summarize: {} records from {} logs, {} rows skipped, {} logs skipped",
            self.records,
            self.logs_parsed,
            self.skipped_rows,
            self.skipped_logs.len()
        )
    }
}

/// Parse every docking log and write the summary, best-K and worst-K tables.
#[instrument(skip_all)]
pub fn run_summarize(config: &PipelineConfig) -> Result<SummaryReport> {
    let results = config.resolve(&config.directories.docking_results);
    let parsed = collect_directory(&results)?;

    let ranking = &config.ranking;
    let summary_file = config.resolve(&ranking.summary_file);
    let best_file = config.resolve(&ranking.best_file);
    let worst_file = config.resolve(&ranking.worst_file);

    write_table(&summary_file, &parsed.records)?;
    write_table(&best_file, &rank(&parsed.records, Direction::Best, ranking.top_n).entries)?;
    write_table(&worst_file, &rank(&parsed.records, Direction::Worst, ranking.top_n).entries)?;
    info!("Wrote {}", summary_file.display());

    Ok(SummaryReport {
        records: parsed.records.len(),
        logs_parsed: parsed.logs_parsed,
        skipped_rows: parsed.skipped_rows,
        skipped_logs: parsed.skipped_logs,
        summary_file,
        best_file,
        worst_file,
    })
}

/// Re-rank the summary table and materialise both selections.
#[instrument(skip_all)]
pub fn run_select(config: &PipelineConfig) -> Result<Vec<SelectionReport>> {
    let records = read_table(&config.resolve(&config.ranking.summary_file))?;
    let d = &config.directories;

    [(Direction::Best, &d.best_poses), (Direction::Worst, &d.worst_poses)]
        .into_iter()
        .map(|(direction, output)| {
            let dirs = SelectionDirs {
                poses: config.resolve(&d.poses),
                receptors: config.resolve(&d.receptors),
                output: config.resolve(output),
                top_receptors: config.resolve(&d.top_receptors),
            };
            materialise_selection(&rank(&records, direction, config.ranking.top_n), &dirs)
        })
        .collect()
}
