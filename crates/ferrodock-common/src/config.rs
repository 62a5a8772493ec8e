//! Pipeline configuration.
//!
//! Loaded from `ferrodock.toml` (or YAML) and passed explicitly into every
//! stage. Defaults reproduce the directory names, tool binaries and numeric
//! parameters the pipeline has always used.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cpu::validate_fraction;
use crate::error::{PipelineError, Result};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "ferrodock.toml";

/// Env var overriding the config path.
pub const CONFIG_ENV_VAR: &str = "FERRODOCK_CONFIG";

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub directories: DirectoryConfig,

    #[serde(default)]
    pub tools: ToolConfig,

    #[serde(default)]
    pub docking: DockingParams,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub modeling: ModelingConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,
}

// ── Workspace ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Working directory all relative paths resolve against
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

fn default_root() -> PathBuf { PathBuf::from(".") }

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self { root: default_root() }
    }
}

// ── Execution ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Fraction of CPUs claimed by tool stages
    #[serde(default = "default_cpu_fraction")]
    pub cpu_fraction: f64,

    /// Fraction of CPUs handed to the modelling toolkit's own workers
    #[serde(default = "default_modeling_cpu_fraction")]
    pub modeling_cpu_fraction: f64,

    /// Optional hard cap on workers, below the CPU budget
    #[serde(default)]
    pub max_workers: Option<usize>,

    /// Attempts per item for failed tool invocations (1 = no retry)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step between attempts
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_cpu_fraction() -> f64 { 0.9 }
fn default_modeling_cpu_fraction() -> f64 { 0.95 }
fn default_max_attempts() -> u32 { 1 }
fn default_retry_backoff_ms() -> u64 { 2_000 }

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            cpu_fraction: default_cpu_fraction(),
            modeling_cpu_fraction: default_modeling_cpu_fraction(),
            max_workers: None,
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

// ── Directories ──────────────────────────────────────────────────────────────

/// Stage directories, relative to the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_receptor_dir")]
    pub receptors: PathBuf,
    #[serde(default = "default_ligand_dir")]
    pub ligands: PathBuf,
    #[serde(default = "default_dock_ligand_dir")]
    pub dock_ligands: PathBuf,
    #[serde(default = "default_affinity_map_dir")]
    pub affinity_maps: PathBuf,
    #[serde(default = "default_docking_results_dir")]
    pub docking_results: PathBuf,
    #[serde(default = "default_poses_dir")]
    pub poses: PathBuf,
    /// Sub-directory of `docking_results` holding `.dro` files
    #[serde(default = "default_docking_objects_dir")]
    pub docking_objects: PathBuf,
    #[serde(default = "default_best_dir")]
    pub best_poses: PathBuf,
    #[serde(default = "default_worst_dir")]
    pub worst_poses: PathBuf,
    #[serde(default = "default_top_receptor_dir")]
    pub top_receptors: PathBuf,
}

fn default_receptor_dir() -> PathBuf { PathBuf::from("input_protein_pdbqt") }
fn default_ligand_dir() -> PathBuf { PathBuf::from("input_ligand_pdbqt") }
fn default_dock_ligand_dir() -> PathBuf { PathBuf::from("input_dock_pdbqt") }
fn default_affinity_map_dir() -> PathBuf { PathBuf::from("affinity_maps") }
fn default_docking_results_dir() -> PathBuf { PathBuf::from("docking_results") }
fn default_poses_dir() -> PathBuf { PathBuf::from("output_dock_pdbqt") }
fn default_docking_objects_dir() -> PathBuf { PathBuf::from("docking_objects") }
fn default_best_dir() -> PathBuf { PathBuf::from("output_best_pdbqt") }
fn default_worst_dir() -> PathBuf { PathBuf::from("output_worst_pdbqt") }
fn default_top_receptor_dir() -> PathBuf { PathBuf::from("top_receptor") }

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            receptors: default_receptor_dir(),
            ligands: default_ligand_dir(),
            dock_ligands: default_dock_ligand_dir(),
            affinity_maps: default_affinity_map_dir(),
            docking_results: default_docking_results_dir(),
            poses: default_poses_dir(),
            docking_objects: default_docking_objects_dir(),
            best_poses: default_best_dir(),
            worst_poses: default_worst_dir(),
            top_receptors: default_top_receptor_dir(),
        }
    }
}

// ── External tools ───────────────────────────────────────────────────────────

/// Executable names or absolute paths of the external tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(default = "default_foldx")]
    pub foldx: String,
    #[serde(default = "default_prepare_receptor")]
    pub prepare_receptor: String,
    #[serde(default = "default_agfr")]
    pub agfr: String,
    #[serde(default = "default_adfr")]
    pub adfr: String,
    #[serde(default = "default_obabel")]
    pub obabel: String,
    /// Interpreter with the modelling toolkit importable
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_foldx() -> String { "foldx".to_string() }
fn default_prepare_receptor() -> String { "prepare_receptor".to_string() }
fn default_agfr() -> String { "agfr".to_string() }
fn default_adfr() -> String { "adfr".to_string() }
fn default_obabel() -> String { "obabel".to_string() }
fn default_python() -> String { "python3".to_string() }

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            foldx: default_foldx(),
            prepare_receptor: default_prepare_receptor(),
            agfr: default_agfr(),
            adfr: default_adfr(),
            obabel: default_obabel(),
            python: default_python(),
        }
    }
}

// ── Docking engine parameters ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockingParams {
    #[serde(default = "default_nb_runs")]
    pub nb_runs: u32,
    #[serde(default = "default_max_evals")]
    pub max_evals: u64,
    #[serde(default = "default_no_improve_stop")]
    pub no_improve_stop: u32,
    #[serde(default = "default_max_gens")]
    pub max_gens: u64,
    #[serde(default = "default_seed")]
    pub seed: i64,
    /// Passed through to the engine, whitespace-separated
    #[serde(default = "default_docking_options")]
    pub options: String,
}

fn default_nb_runs() -> u32 { 50 }
fn default_max_evals() -> u64 { 2_500_000 }
fn default_no_improve_stop() -> u32 { 5 }
fn default_max_gens() -> u64 { 10_000_000 }
fn default_seed() -> i64 { 8 }
fn default_docking_options() -> String { "--maxCores 2 --overwriteFiles".to_string() }

impl Default for DockingParams {
    fn default() -> Self {
        Self {
            nb_runs: default_nb_runs(),
            max_evals: default_max_evals(),
            no_improve_stop: default_no_improve_stop(),
            max_gens: default_max_gens(),
            seed: default_seed(),
            options: default_docking_options(),
        }
    }
}

impl DockingParams {
    pub fn option_args(&self) -> Vec<String> {
        self.options.split_whitespace().map(str::to_string).collect()
    }
}

// ── Ranking ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// K for the best/worst selections
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_summary_file")]
    pub summary_file: PathBuf,
    #[serde(default = "default_best_file")]
    pub best_file: PathBuf,
    #[serde(default = "default_worst_file")]
    pub worst_file: PathBuf,
}

fn default_top_n() -> usize { 10 }
fn default_summary_file() -> PathBuf { PathBuf::from("summary_binding_score.txt") }
fn default_best_file() -> PathBuf { PathBuf::from("top-10-best-score.txt") }
fn default_worst_file() -> PathBuf { PathBuf::from("top-10-worst-score.txt") }

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            summary_file: default_summary_file(),
            best_file: default_best_file(),
            worst_file: default_worst_file(),
        }
    }
}

// ── Homology modelling ───────────────────────────────────────────────────────

/// A template structure: PDB code plus chain id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub code: String,
    pub chain: String,
}

impl TemplateSpec {
    /// Alignment code, e.g. `4biwA`.
    pub fn align_code(&self) -> String {
        format!("{}{}", self.code, self.chain)
    }
}

/// Inclusive range of model indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelingConfig {
    /// Target sequence code in the alignment
    #[serde(default = "default_target")]
    pub target: String,
    /// Alignment (PIR) file; generated by `align` when absent
    #[serde(default)]
    pub alignment: Option<PathBuf>,
    #[serde(default)]
    pub templates: Vec<TemplateSpec>,
    /// Take templates from the `.pdb` files in the workspace
    #[serde(default)]
    pub auto_detect_templates: bool,
    #[serde(default = "default_models")]
    pub models: ModelRange,
    /// Enables loop refinement when set
    #[serde(default)]
    pub loop_models: Option<ModelRange>,
    /// Keep HETATM records (ligands) from the templates
    #[serde(default = "bool_true")]
    pub include_hetatm: bool,
    #[serde(default = "default_atom_dirs")]
    pub atom_files_directories: Vec<String>,
}

fn default_target() -> String { "target".to_string() }
fn default_models() -> ModelRange { ModelRange { start: 1, end: 100 } }
fn default_atom_dirs() -> Vec<String> { vec![".".to_string(), "../atom_files/".to_string()] }
fn bool_true() -> bool { true }

impl Default for ModelingConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            alignment: None,
            templates: vec![],
            auto_detect_templates: false,
            models: default_models(),
            loop_models: None,
            include_hetatm: true,
            atom_files_directories: default_atom_dirs(),
        }
    }
}

// ── Format conversion ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Target formats; each gets `output_best_<fmt>`
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    /// Extra converter flags appended after the output path
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_formats() -> Vec<String> { vec!["mol".to_string(), "mol2".to_string()] }

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            extra_args: vec![],
        }
    }
}

impl ConversionConfig {
    pub fn output_dir(&self, format: &str) -> PathBuf {
        PathBuf::from(format!("output_best_{format}"))
    }
}

// ── Loading & validation ─────────────────────────────────────────────────────

impl PipelineConfig {
    /// Resolve the config path: explicit path, then `FERRODOCK_CONFIG`, then
    /// `ferrodock.toml`. A missing default file yields the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.exists() {
            Self::from_file(default)
        } else {
            tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
            Ok(Self::default())
        }
    }

    /// Load from TOML, or YAML when the extension is `.yaml`/`.yml`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config = if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?
        } else {
            Self::from_toml_str(&content)?
        };
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Save as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?).map_err(|e| PipelineError::io(path, e))
    }

    /// Reject values the stages cannot run with.
    pub fn validate(&self) -> Result<()> {
        validate_fraction(self.execution.cpu_fraction)?;
        validate_fraction(self.execution.modeling_cpu_fraction)?;
        if self.execution.max_attempts == 0 {
            return Err(PipelineError::Config("execution.max_attempts must be >= 1".to_string()));
        }
        if self.execution.max_workers == Some(0) {
            return Err(PipelineError::Config("execution.max_workers must be >= 1".to_string()));
        }
        if self.ranking.top_n == 0 {
            return Err(PipelineError::Config("ranking.top_n must be >= 1".to_string()));
        }
        let d = &self.docking;
        if d.nb_runs == 0 || d.max_evals == 0 || d.max_gens == 0 {
            return Err(PipelineError::Config(
                "docking.nb_runs, max_evals and max_gens must be positive".to_string(),
            ));
        }
        let m = &self.modeling;
        if m.models.start == 0 || m.models.start > m.models.end {
            return Err(PipelineError::Config(format!(
                "modeling.models range {}..={} is invalid",
                m.models.start, m.models.end
            )));
        }
        if let Some(lm) = m.loop_models {
            if lm.start == 0 || lm.start > lm.end {
                return Err(PipelineError::Config(format!(
                    "modeling.loop_models range {}..={} is invalid",
                    lm.start, lm.end
                )));
            }
        }
        Ok(())
    }

    /// Workspace root as an absolute path.
    ///
    /// Tools run with the root as their working directory, so paths handed
    /// to them must not be relative to the process directory.
    pub fn root_dir(&self) -> PathBuf {
        let root = &self.workspace.root;
        if root.is_absolute() {
            return root.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(root).components().collect(),
            Err(e) => {
                tracing::warn!("Cannot read current directory: {}", e);
                root.clone()
            }
        }
    }

    /// Pin `workspace.root` to an absolute, canonical path.
    pub fn anchor_root(&mut self) -> Result<()> {
        let root = self.root_dir();
        self.workspace.root = std::fs::canonicalize(&root).map_err(|e| PipelineError::io(&root, e))?;
        Ok(())
    }

    /// Resolve a workspace-relative path.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root_dir().join(relative)
        }
    }

    pub fn docking_objects_dir(&self) -> PathBuf {
        self.resolve(&self.directories.docking_results)
            .join(&self.directories.docking_objects)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_constants() {
        let config = PipelineConfig::default();
        assert!((config.execution.cpu_fraction - 0.9).abs() < 1e-12);
        assert!((config.execution.modeling_cpu_fraction - 0.95).abs() < 1e-12);
        assert_eq!(config.docking.nb_runs, 50);
        assert_eq!(config.docking.max_evals, 2_500_000);
        assert_eq!(config.docking.seed, 8);
        assert_eq!(config.ranking.top_n, 10);
        assert_eq!(config.directories.poses, PathBuf::from("output_dock_pdbqt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.tools.adfr, "adfr");
        assert_eq!(config.conversion.formats, vec!["mol", "mol2"]);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [execution]
            cpu_fraction = 0.5

            [docking]
            seed = 42
            options = "--maxCores 4"
            "#,
        )
        .unwrap();
        assert!((config.execution.cpu_fraction - 0.5).abs() < 1e-12);
        assert_eq!(config.docking.seed, 42);
        assert_eq!(config.docking.nb_runs, 50);
        assert_eq!(config.docking.option_args(), vec!["--maxCores", "4"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.execution.cpu_fraction = 1.2;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.ranking.top_n = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.modeling.loop_models = Some(ModelRange { start: 5, end: 2 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = PipelineConfig::default();
        config.modeling.templates.push(TemplateSpec {
            code: "4biw".to_string(),
            chain: "A".to_string(),
        });
        let text = config.to_toml_string().unwrap();
        let parsed = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.modeling.templates[0].align_code(), "4biwA");
        assert_eq!(parsed.docking.options, config.docking.options);
    }

    #[test]
    fn test_yaml_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "ranking:\n  top_n: 3\n").unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.ranking.top_n, 3);
    }

    #[test]
    fn test_resolve_joins_workspace_root() {
        let mut config = PipelineConfig::default();
        config.workspace.root = PathBuf::from("/data/run1");
        assert_eq!(
            config.resolve(&config.directories.affinity_maps),
            PathBuf::from("/data/run1/affinity_maps")
        );
        assert_eq!(
            config.docking_objects_dir(),
            PathBuf::from("/data/run1/docking_results/docking_objects")
        );
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let mut config = PipelineConfig::default();
        config.workspace.root = PathBuf::from("run1");
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.root_dir(), cwd.join("run1"));
        assert_eq!(
            config.resolve(&config.directories.receptors),
            cwd.join("run1").join("input_protein_pdbqt")
        );

        config.workspace.root = PathBuf::from(".");
        assert_eq!(config.root_dir(), cwd);
    }

    #[test]
    fn test_anchor_root_canonicalizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("run1")).unwrap();
        let mut config = PipelineConfig::default();
        config.workspace.root = dir.path().join("run1").join("..").join("run1");
        config.anchor_root().unwrap();
        assert_eq!(config.workspace.root, std::fs::canonicalize(dir.path().join("run1")).unwrap());

        config.workspace.root = dir.path().join("missing");
        assert!(matches!(config.anchor_root(), Err(PipelineError::InputNotFound { .. })));
    }
}
