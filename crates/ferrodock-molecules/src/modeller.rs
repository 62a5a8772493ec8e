//! Homology modelling through the MODELLER Python API.
//!
//! MODELLER is only reachable from Python, so each run renders a small
//! driver script, executes it with the configured interpreter, and reads
//! back the per-model scores the script writes as CSV.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, instrument, warn};

use ferrodock_common::config::{ModelRange, TemplateSpec};
use ferrodock_common::cpu;
use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::PipelineConfig;
use ferrodock_runner::{ToolExecutor, ToolInvocation};

use crate::alignment;

/// A homology-modelling run against one alignment.
#[derive(Debug, Clone)]
pub struct ModelingJob {
    /// PIR alignment, relative to the working directory
    pub alignment: PathBuf,
    pub templates: Vec<TemplateSpec>,
    /// Target sequence code in the alignment
    pub target: String,
    pub models: ModelRange,
    pub loop_models: Option<ModelRange>,
    pub include_hetatm: bool,
    pub atom_files_directories: Vec<String>,
    /// MODELLER local workers
    pub workers: usize,
}

/// One generated model and its assessment scores.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelCandidate {
    pub name: String,
    pub dope: f64,
    #[serde(default)]
    pub ga341: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ModelingReport {
    pub candidates: Vec<ModelCandidate>,
    pub best: ModelCandidate,
    /// Copy of the best model, `best_<tag>_model.pdb`
    pub best_model: PathBuf,
}

/// Quote a value as a single-quoted Python string literal.
fn py_str(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn py_tuple(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| py_str(v)).collect();
    match quoted.len() {
        1 => format!("({},)", quoted[0]),
        _ => format!("({})", quoted.join(", ")),
    }
}

fn py_list(values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| py_str(v)).collect();
    format!("[{}]", quoted.join(", "))
}

const SCRIPT_HEADER: &str = "\
import csv
from modeller import *
from modeller.automodel import *
from modeller.parallel import Job, LocalWorker
";

const WRITE_SUMMARY: &str = "
def write_summary(outputs, path):
    with open(path, 'w', newline='') as fh:
        writer = csv.writer(fh)
        writer.writerow(['name', 'dope', 'ga341'])
        for m in outputs:
            if m.get('failure') is not None:
                continue
            ga341 = (m.get('GA341 score') or [None])[0]
            writer.writerow([m['name'], m['DOPE score'], '' if ga341 is None else ga341])
";

impl ModelingJob {
    /// Build a job from the modelling section of the configuration.
    ///
    /// Templates come from the config, or from the `.pdb` files in the
    /// working directory when `auto_detect_templates` is set.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let m = &config.modeling;
        let root = &config.root_dir();

        let templates = if m.auto_detect_templates {
            alignment::detect_templates(root)?
        } else {
            m.templates.clone()
        };
        if templates.is_empty() {
            return Err(PipelineError::Config(
                "modeling needs at least one template (modeling.templates or auto_detect_templates)"
                    .to_string(),
            ));
        }

        let alignment = match (&m.alignment, templates.as_slice()) {
            (Some(path), _) => path.clone(),
            (None, [template]) => Align2dJob::new(template, &m.target, m.include_hetatm).final_alignment(),
            (None, _) => SalignJob::from_config(config, templates.clone()).final_alignment(),
        };

        let workers = cpu::bounded_workers(
            config.execution.max_workers,
            cpu::cpu_count(),
            config.execution.modeling_cpu_fraction,
        );

        Ok(Self {
            alignment,
            templates,
            target: m.target.clone(),
            models: m.models,
            loop_models: m.loop_models,
            include_hetatm: m.include_hetatm,
            atom_files_directories: m.atom_files_directories.clone(),
            workers,
        })
    }

    /// `single` for one template, `mult` otherwise.
    pub fn tag(&self) -> &'static str {
        if self.templates.len() == 1 { "single" } else { "mult" }
    }

    pub fn script_name(&self) -> String {
        format!("model_{}.py", self.tag())
    }

    pub fn summary_file(&self) -> String {
        format!("summary_{}_model.csv", self.tag())
    }

    pub fn loop_summary_file(&self) -> String {
        format!("summary_loop_{}_model.csv", self.tag())
    }

    pub fn best_model_file(&self) -> String {
        format!("best_{}_model.pdb", self.tag())
    }

    /// Render the MODELLER driver script.
    pub fn render_script(&self) -> String {
        let knowns: Vec<String> = self.templates.iter().map(TemplateSpec::align_code).collect();
        let class = if self.loop_models.is_some() { "LoopModel" } else { "AutoModel" };
        let indent = " ".repeat(class.len() + 5);

        let mut s = String::from(SCRIPT_HEADER);
        s.push_str("\nj = Job()\n");
        s.push_str(&format!("for _ in range({}):\n    j.append(LocalWorker())\n", self.workers.max(1)));

        s.push_str("\nenv = Environ()\n");
        s.push_str(&format!(
            "env.io.atom_files_directory = {}\n",
            py_list(&self.atom_files_directories)
        ));
        if self.include_hetatm {
            s.push_str("env.io.hetatm = True\n");
        }

        s.push_str(&format!("\na = {class}(env,\n"));
        s.push_str(&format!("{indent}alnfile={},\n", py_str(&self.alignment.to_string_lossy())));
        s.push_str(&format!("{indent}knowns={},\n", py_tuple(&knowns)));
        s.push_str(&format!("{indent}sequence={},\n", py_str(&self.target)));
        if self.loop_models.is_some() {
            s.push_str(&format!("{indent}assess_methods=(assess.DOPE, assess.GA341),\n"));
            s.push_str(&format!("{indent}loop_assess_methods=(assess.DOPE, assess.GA341))\n"));
        } else {
            s.push_str(&format!("{indent}assess_methods=(assess.DOPE, assess.GA341))\n"));
        }
        s.push_str(&format!("a.starting_model = {}\n", self.models.start));
        s.push_str(&format!("a.ending_model = {}\n", self.models.end));
        if let Some(loops) = self.loop_models {
            s.push_str(&format!("a.loop.starting_model = {}\n", loops.start));
            s.push_str(&format!("a.loop.ending_model = {}\n", loops.end));
        }
        s.push_str(
            "a.use_parallel_job(j)\n\
             a.md_level = refine.slow\n\
             a.library_schedule = autosched.slow\n\
             a.max_var_iterations = 300\n\
             a.repeat_optimization = 3\n\
             a.max_molpdf = 1e6\n\
             a.make()\n",
        );

        s.push_str(WRITE_SUMMARY);
        s.push('\n');
        s.push_str(&format!("write_summary(a.outputs, {})\n", py_str(&self.summary_file())));
        if self.loop_models.is_some() {
            s.push_str(&format!(
                "write_summary(a.loop.outputs, {})\n",
                py_str(&self.loop_summary_file())
            ));
        }
        s
    }
}

/// Read a `name,dope,ga341` summary written by the driver script.
pub fn read_candidates(path: &Path) -> Result<Vec<ModelCandidate>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
    let mut candidates = Vec::new();
    for row in reader.deserialize() {
        let candidate: ModelCandidate = row.map_err(|e| csv_error(path, e))?;
        candidates.push(candidate);
    }
    Ok(candidates)
}

fn csv_error(path: &Path, e: csv::Error) -> PipelineError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => PipelineError::io(path, io),
        other => PipelineError::parse(path.display().to_string(), format!("{other:?}")),
    }
}

/// Lowest DOPE score; the first one wins a tie.
pub fn best_candidate(candidates: &[ModelCandidate]) -> Option<&ModelCandidate> {
    candidates.iter().reduce(|best, c| if c.dope.total_cmp(&best.dope).is_lt() { c } else { best })
}

/// Render the script, run it, and keep the best-scoring model.
#[instrument(skip_all, fields(tag = job.tag()))]
pub async fn run_modeling(
    config: &PipelineConfig,
    executor: &dyn ToolExecutor,
    job: &ModelingJob,
) -> Result<ModelingReport> {
    let root = &config.root_dir();
    let alignment = root.join(&job.alignment);
    if !alignment.exists() {
        return Err(PipelineError::InputNotFound { path: alignment });
    }

    let script = root.join(job.script_name());
    std::fs::write(&script, job.render_script()).map_err(|e| PipelineError::io(&script, e))?;
    info!(
        "Modelling {} from {} template(s), models {}..={}, {} workers",
        job.target,
        job.templates.len(),
        job.models.start,
        job.models.end,
        job.workers
    );

    let invocation = ToolInvocation::new(&config.tools.python)
        .arg(job.script_name())
        .current_dir(root);
    executor.execute(&invocation).await?;

    let summary = root.join(job.summary_file());
    if !summary.exists() {
        return Err(PipelineError::OutputArtifactMissing { path: summary });
    }
    let mut candidates = read_candidates(&summary)?;
    if job.loop_models.is_some() {
        let loop_summary = root.join(job.loop_summary_file());
        match read_candidates(&loop_summary) {
            Ok(loops) => candidates.extend(loops),
            Err(e) => warn!("No loop-model scores: {}", e),
        }
    }

    let best = best_candidate(&candidates)
        .cloned()
        .ok_or_else(|| PipelineError::parse(job.summary_file(), "no successful models"))?;

    let source = root.join(&best.name);
    let best_model = root.join(job.best_model_file());
    std::fs::copy(&source, &best_model).map_err(|e| PipelineError::io(&source, e))?;
    info!("Best model {} (DOPE {:.3}) -> {}", best.name, best.dope, best_model.display());

    Ok(ModelingReport { candidates, best, best_model })
}

// ── Template alignment ───────────────────────────────────────────────────────

/// Automatic target-template alignment for single-template modelling.
#[derive(Debug, Clone)]
pub struct Align2dJob {
    pub template: TemplateSpec,
    pub target: String,
    /// Target sequence file, `<target>.ali`
    pub sequence_file: PathBuf,
    /// Also write the ligand-block variant of the alignment
    pub include_hetatm: bool,
}

impl Align2dJob {
    pub fn new(template: &TemplateSpec, target: &str, include_hetatm: bool) -> Self {
        Self {
            template: template.clone(),
            target: target.to_string(),
            sequence_file: PathBuf::from(format!("{target}.ali")),
            include_hetatm,
        }
    }

    fn base_name(&self) -> String {
        format!("{}_{}", self.target, self.template.align_code())
    }

    pub fn alignment_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.ali", self.base_name()))
    }

    pub fn pap_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.pap", self.base_name()))
    }

    pub fn ligand_alignment_file(&self) -> PathBuf {
        PathBuf::from(format!("{}_ligand.ali", self.base_name()))
    }

    /// The alignment modelling should consume.
    pub fn final_alignment(&self) -> PathBuf {
        if self.include_hetatm {
            self.ligand_alignment_file()
        } else {
            self.alignment_file()
        }
    }

    pub fn render_script(&self) -> String {
        let code = &self.template.code;
        let chain = &self.template.chain;
        let mut s = String::from("from modeller import *\n\nenv = Environ()\naln = Alignment(env)\n");
        s.push_str(&format!(
            "mdl = Model(env, file={}, model_segment=({}, {}))\n",
            py_str(code),
            py_str(&format!("FIRST:{chain}")),
            py_str(&format!("LAST:{chain}"))
        ));
        s.push_str(&format!(
            "aln.append_model(mdl, align_codes={}, atom_files={})\n",
            py_str(&self.template.align_code()),
            py_str(&format!("{code}.pdb"))
        ));
        s.push_str(&format!(
            "aln.append(file={}, align_codes={})\n",
            py_str(&self.sequence_file.to_string_lossy()),
            py_str(&self.target)
        ));
        s.push_str("aln.align2d(max_gap_length=50)\n");
        s.push_str(&format!(
            "aln.write(file={}, alignment_format='PIR')\n",
            py_str(&self.alignment_file().to_string_lossy())
        ));
        s.push_str(&format!(
            "aln.write(file={}, alignment_format='PAP', alignment_features='INDICES HELIX BETA')\n",
            py_str(&self.pap_file().to_string_lossy())
        ));
        s
    }
}

/// Align the target sequence against one template, then add the ligand
/// block when HETATM records are kept. Returns the alignment to model from.
#[instrument(skip_all, fields(template = %job.template.align_code()))]
pub async fn run_align2d(
    config: &PipelineConfig,
    executor: &dyn ToolExecutor,
    job: &Align2dJob,
    overwrite: bool,
) -> Result<PathBuf> {
    let root = &config.root_dir();
    let sequence = root.join(&job.sequence_file);
    if !sequence.exists() {
        return Err(PipelineError::InputNotFound { path: sequence });
    }

    let script = root.join("align2d.py");
    std::fs::write(&script, job.render_script()).map_err(|e| PipelineError::io(&script, e))?;
    let invocation = ToolInvocation::new(&config.tools.python)
        .arg("align2d.py")
        .current_dir(root);
    executor.execute(&invocation).await?;

    let alignment = root.join(job.alignment_file());
    if !alignment.exists() {
        return Err(PipelineError::OutputArtifactMissing { path: alignment });
    }
    if job.include_hetatm {
        let ligand = root.join(job.ligand_alignment_file());
        alignment::add_ligand_block(&alignment, &ligand, overwrite)
    } else {
        Ok(alignment)
    }
}

/// Base name of the superposed-template alignment.
const STRUCTURE_ALIGNMENT: &str = "fm00495";

const SALIGN_TEMPLATES_SCRIPT: &str = "salign_templates.py";
const SALIGN_TARGET_SCRIPT: &str = "salign_target.py";

/// Multi-template alignment: the templates are superposed structurally,
/// then the target sequence is aligned against the superposed block.
#[derive(Debug, Clone)]
pub struct SalignJob {
    pub templates: Vec<TemplateSpec>,
    pub target: String,
    /// Target sequence file, `<target>.ali`
    pub sequence_file: PathBuf,
    pub include_hetatm: bool,
    pub atom_files_directories: Vec<String>,
}

impl SalignJob {
    pub fn from_config(config: &PipelineConfig, templates: Vec<TemplateSpec>) -> Self {
        let m = &config.modeling;
        Self {
            templates,
            target: m.target.clone(),
            sequence_file: PathBuf::from(format!("{}.ali", m.target)),
            include_hetatm: m.include_hetatm,
            atom_files_directories: m.atom_files_directories.clone(),
        }
    }

    pub fn structure_alignment_file(&self) -> PathBuf {
        PathBuf::from(format!("{STRUCTURE_ALIGNMENT}.ali"))
    }

    /// Structure alignment with `_fit.pdb` names pointed back at the originals.
    pub fn edited_structure_file(&self) -> PathBuf {
        PathBuf::from(format!("{STRUCTURE_ALIGNMENT}_edited.ali"))
    }

    pub fn alignment_file(&self) -> PathBuf {
        PathBuf::from(format!("{}_mult.ali", self.target))
    }

    pub fn pap_file(&self) -> PathBuf {
        PathBuf::from(format!("{}_mult.pap", self.target))
    }

    pub fn ligand_alignment_file(&self) -> PathBuf {
        PathBuf::from(format!("{}_mult_ligand.ali", self.target))
    }

    pub fn final_alignment(&self) -> PathBuf {
        if self.include_hetatm {
            self.ligand_alignment_file()
        } else {
            self.alignment_file()
        }
    }

    fn template_list(&self) -> String {
        let pairs: Vec<String> = self
            .templates
            .iter()
            .map(|t| format!("({}, {})", py_str(&t.code), py_str(&t.chain)))
            .collect();
        format!("[{}]", pairs.join(", "))
    }

    /// Iterative structure superposition of the templates.
    pub fn render_templates_script(&self) -> String {
        format!(
            "\
from modeller import *

env = Environ()
env.io.atom_files_directory = {atom_dirs}
aln = Alignment(env)
for (code, chain) in {templates}:
    m = Model(env, file=code, model_segment=('FIRST:' + chain, 'LAST:' + chain))
    aln.append_model(m, align_codes=code + chain, atom_files=code)

for (weights, write_fit, whole) in (((1., 0., 0., 0., 1., 0.), False, True),
                                    ((1., 0.5, 1., 1., 1., 0.), False, True),
                                    ((1., 1., 1., 1., 1., 0.), True, False)):
    aln.salign(rms_cutoff=3.5, normalize_pp_scores=False,
               rr_file='$(LIB)/as1.sim.mat', overhang=30,
               gap_penalties_1d=(-450, -50), gap_penalties_3d=(0, 3),
               gap_gap_score=0, gap_residue_score=0,
               dendrogram_file='{base}.tree', alignment_type='tree',
               feature_weights=weights, improve_alignment=True,
               fit=True, write_fit=write_fit, write_whole_pdb=whole,
               output='ALIGNMENT QUALITY')

aln.write(file='{base}.pap', alignment_format='PAP')
aln.write(file='{base}.ali', alignment_format='PIR')

aln.salign(rms_cutoff=1.0, normalize_pp_scores=False,
           rr_file='$(LIB)/as1.sim.mat', overhang=30,
           gap_penalties_1d=(-450, -50), gap_penalties_3d=(0, 3),
           gap_gap_score=0, gap_residue_score=0,
           dendrogram_file='{base}_quality.tree', alignment_type='progressive',
           feature_weights=[0] * 6, improve_alignment=False,
           fit=False, write_fit=True, write_whole_pdb=False, output='QUALITY')
",
            atom_dirs = py_list(&self.atom_files_directories),
            templates = self.template_list(),
            base = STRUCTURE_ALIGNMENT,
        )
    }

    /// Pairwise alignment of the target against the superposed block, with
    /// structure-dependent gap penalties.
    pub fn render_target_script(&self) -> String {
        format!(
            "\
from modeller import *

env = Environ()
env.io.atom_files_directory = {atom_dirs}
env.libs.topology.read(file='$(LIB)/top_heav.lib')
aln = Alignment(env)
aln.append(file={structures}, align_codes='all')
aln_block = len(aln)
aln.append(file={sequence}, align_codes={target})
aln.salign(output='', max_gap_length=20, gap_function=True,
           alignment_type='PAIRWISE', align_block=aln_block,
           feature_weights=(1., 0., 0., 0., 0., 0.), overhang=0,
           gap_penalties_1d=(-450, 0),
           gap_penalties_2d=(0.35, 1.2, 0.9, 1.2, 0.6, 8.6, 1.2, 0., 0.),
           similarity_flag=True)
aln.write(file={ali}, alignment_format='PIR')
aln.write(file={pap}, alignment_format='PAP', alignment_features='INDICES HELIX BETA')
",
            atom_dirs = py_list(&self.atom_files_directories),
            structures = py_str(&self.edited_structure_file().to_string_lossy()),
            sequence = py_str(&self.sequence_file.to_string_lossy()),
            target = py_str(&self.target),
            ali = py_str(&self.alignment_file().to_string_lossy()),
            pap = py_str(&self.pap_file().to_string_lossy()),
        )
    }
}

async fn run_script(
    config: &PipelineConfig,
    executor: &dyn ToolExecutor,
    root: &Path,
    name: &str,
    script: String,
) -> Result<()> {
    let path = root.join(name);
    std::fs::write(&path, script).map_err(|e| PipelineError::io(&path, e))?;
    let invocation = ToolInvocation::new(&config.tools.python).arg(name).current_dir(root);
    executor.execute(&invocation).await?;
    Ok(())
}

fn produced(root: &Path, file: &Path) -> Result<PathBuf> {
    let path = root.join(file);
    if path.exists() {
        Ok(path)
    } else {
        Err(PipelineError::OutputArtifactMissing { path })
    }
}

/// Superpose the templates, repoint the fitted structures at the original
/// files, align the target against them, and add the ligand block when
/// HETATM records are kept. Returns the alignment to model from.
#[instrument(skip_all, fields(templates = job.templates.len()))]
pub async fn run_salign(
    config: &PipelineConfig,
    executor: &dyn ToolExecutor,
    job: &SalignJob,
    overwrite: bool,
) -> Result<PathBuf> {
    if job.templates.len() < 2 {
        return Err(PipelineError::Config(format!(
            "structure alignment needs at least two templates, found {}",
            job.templates.len()
        )));
    }
    let root = &config.root_dir();
    let sequence = root.join(&job.sequence_file);
    if !sequence.exists() {
        return Err(PipelineError::InputNotFound { path: sequence });
    }

    info!("Superposing {} templates", job.templates.len());
    run_script(config, executor, root, SALIGN_TEMPLATES_SCRIPT, job.render_templates_script()).await?;
    let structures = produced(root, &job.structure_alignment_file())?;
    alignment::strip_fit_suffix(&structures, &root.join(job.edited_structure_file()), true)?;

    run_script(config, executor, root, SALIGN_TARGET_SCRIPT, job.render_target_script()).await?;
    let alignment = produced(root, &job.alignment_file())?;
    if job.include_hetatm {
        alignment::add_ligand_block(&alignment, &root.join(job.ligand_alignment_file()), overwrite)
    } else {
        Ok(alignment)
    }
}

/// Align the target against the configured templates: `align2d` for one,
/// structure superposition for several.
pub async fn run_alignment(
    config: &PipelineConfig,
    executor: &dyn ToolExecutor,
    templates: Vec<TemplateSpec>,
    overwrite: bool,
) -> Result<PathBuf> {
    let m = &config.modeling;
    match templates.as_slice() {
        [] => Err(PipelineError::Config(
            "alignment needs at least one template (modeling.templates or auto_detect_templates)"
                .to_string(),
        )),
        [template] => {
            let job = Align2dJob::new(template, &m.target, m.include_hetatm);
            run_align2d(config, executor, &job, overwrite).await
        }
        _ => {
            let job = SalignJob::from_config(config, templates);
            run_salign(config, executor, &job, overwrite).await
        }
    }
}
