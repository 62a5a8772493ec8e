//! Command dispatch.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};

use ferrodock_common::PipelineConfig;
use ferrodock_molecules::modeller::{self, ModelingJob};
use ferrodock_molecules::pipeline::{DockingPipeline, ToolStage};
use ferrodock_molecules::alignment;
use ferrodock_ranker::stage::{run_select, run_summarize};
use ferrodock_runner::{BatchReport, ProcessExecutor, ToolExecutor};

use crate::cli::{Cli, Command};

/// How a command finished, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A stage ran but none of its items succeeded
    StageFailed(String),
}

/// Load, override and validate the configuration.
pub fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.workdir {
        config.workspace.root = dir.clone();
    }
    config.validate().context("invalid configuration")?;
    config
        .anchor_root()
        .with_context(|| format!("workspace {}", config.workspace.root.display()))?;
    Ok(config)
}

fn stage_outcome(report: &BatchReport) -> Outcome {
    println!("{}", report.summary());
    for (kind, count) in report.failures_by_kind() {
        println!("  {kind}: {count}");
    }
    if report.all_failed() {
        Outcome::StageFailed(report.stage.clone())
    } else {
        Outcome::Success
    }
}

fn generate_config(output: &Path, force: bool) -> anyhow::Result<Outcome> {
    if output.exists() && !force {
        bail!("{} already exists; pass --force to replace it", output.display());
    }
    PipelineConfig::default().save(output)?;
    info!("Wrote default configuration to {}", output.display());
    Ok(Outcome::Success)
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<Outcome> {
    if let Command::GenerateConfig { output, force } = &cli.command {
        return generate_config(output, *force);
    }

    let config = load_config(&cli)?;
    let executor: Arc<dyn ToolExecutor> = if cli.lenient_exit {
        Arc::new(ProcessExecutor::lenient())
    } else {
        Arc::new(ProcessExecutor::new())
    };
    let root = config.workspace.root.clone();

    match cli.command {
        Command::GenerateConfig { .. } => Ok(Outcome::Success),
        Command::Validate => {
            println!("Configuration OK (workspace {})", root.display());
            Ok(Outcome::Success)
        }
        Command::Model { alignment } => {
            let mut job = ModelingJob::from_config(&config)?;
            if let Some(path) = alignment {
                job.alignment = path;
            }
            let report = modeller::run_modeling(&config, executor.as_ref(), &job).await?;
            println!(
                "model: {} candidates, best {} (DOPE {:.3}) -> {}",
                report.candidates.len(),
                report.best.name,
                report.best.dope,
                report.best_model.display()
            );
            Ok(Outcome::Success)
        }
        Command::Align { overwrite } => {
            let templates = if config.modeling.auto_detect_templates {
                alignment::detect_templates(&root)?
            } else {
                config.modeling.templates.clone()
            };
            let path = modeller::run_alignment(&config, executor.as_ref(), templates, overwrite).await?;
            println!("align: wrote {}", path.display());
            Ok(Outcome::Success)
        }
        Command::AddLigandBlock { input, output, overwrite } => {
            alignment::add_ligand_block(&root.join(input), &root.join(output), overwrite)?;
            Ok(Outcome::Success)
        }
        Command::StripFit { input, output, overwrite } => {
            alignment::strip_fit_suffix(&root.join(input), &root.join(output), overwrite)?;
            Ok(Outcome::Success)
        }
        Command::Repair => run_tool_stage(config, executor, ToolStage::Repair).await,
        Command::PrepareReceptor => run_tool_stage(config, executor, ToolStage::PrepareReceptor).await,
        Command::AffinityMaps => run_tool_stage(config, executor, ToolStage::AffinityMaps).await,
        Command::Dock => run_tool_stage(config, executor, ToolStage::Dock).await,
        Command::Convert => run_tool_stage(config, executor, ToolStage::Convert).await,
        Command::Summarize => summarize(&config),
        Command::Select => select(&config),
        Command::Run => run_all(config, executor).await,
    }
}

async fn run_tool_stage(
    config: PipelineConfig,
    executor: Arc<dyn ToolExecutor>,
    stage: ToolStage,
) -> anyhow::Result<Outcome> {
    let pipeline = DockingPipeline::new(config, executor);
    let report = pipeline
        .run_stage(stage)
        .await
        .with_context(|| format!("stage {stage}"))?;
    Ok(stage_outcome(&report))
}

fn summarize(config: &PipelineConfig) -> anyhow::Result<Outcome> {
    let report = run_summarize(config).context("summarizing docking logs")?;
    println!("{}", report.summary());
    if report.records == 0 {
        warn!("No scored poses found");
        return Ok(Outcome::StageFailed("summarize".to_string()));
    }
    Ok(Outcome::Success)
}

fn select(config: &PipelineConfig) -> anyhow::Result<Outcome> {
    let reports = run_select(config).context("selecting poses")?;
    let mut written = 0;
    for report in &reports {
        println!(
            "select {}: {} models, {} companions, {} failures",
            report.label,
            report.models.len(),
            report.companions.len(),
            report.failures.len()
        );
        written += report.models.len();
    }
    if written == 0 {
        return Ok(Outcome::StageFailed("select".to_string()));
    }
    Ok(Outcome::Success)
}

/// Repair → receptors → maps → docking → summarize → select → convert,
/// stopping at the first stage that produced nothing.
async fn run_all(config: PipelineConfig, executor: Arc<dyn ToolExecutor>) -> anyhow::Result<Outcome> {
    let pipeline = DockingPipeline::new(config.clone(), executor);
    for report in pipeline.run_docking_chain().await? {
        if let Outcome::StageFailed(stage) = stage_outcome(&report) {
            return Ok(Outcome::StageFailed(stage));
        }
    }

    let steps: [fn(&PipelineConfig) -> anyhow::Result<Outcome>; 2] = [summarize, select];
    for step in steps {
        let outcome = step(&config)?;
        if outcome != Outcome::Success {
            return Ok(outcome);
        }
    }

    let report = pipeline.run_stage(ToolStage::Convert).await?;
    Ok(stage_outcome(&report))
}
