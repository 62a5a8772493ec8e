//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ferrodock")]
#[command(version)]
#[command(about = "Homology modelling and batched docking pipeline", long_about = None)]
pub struct Cli {
    /// Config file (default: $FERRODOCK_CONFIG, then ./ferrodock.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory; overrides workspace.root
    #[arg(long, global = true)]
    pub workdir: Option<PathBuf>,

    /// Judge tools by their output files only, ignoring exit status
    #[arg(long, global = true)]
    pub lenient_exit: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Build homology models and keep the best by DOPE score
    Model {
        /// Alignment to model from; overrides modeling.alignment
        #[arg(long)]
        alignment: Option<PathBuf>,
    },
    /// Align the target sequence against the templates (align2d for one,
    /// structure superposition for several)
    Align {
        /// Replace an existing ligand alignment
        #[arg(long)]
        overwrite: bool,
    },
    /// Extend template segments of a PIR alignment with a ligand block
    AddLigandBlock {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Point `_fit.pdb` templates of a PIR alignment back at the originals
    StripFit {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Repair `*_protein.pdb` structures
    Repair,
    /// Convert repaired structures to docking receptors
    PrepareReceptor,
    /// Generate an affinity map per receptor
    AffinityMaps,
    /// Dock every ligand against every affinity map
    Dock,
    /// Parse docking logs into the score tables
    Summarize,
    /// Extract the best and worst poses
    Select,
    /// Convert the best poses to other chemical formats
    Convert,
    /// Repair through conversion in one go
    Run,
    /// Check the configuration
    Validate,
    /// Write the default configuration
    GenerateConfig {
        #[arg(long, short = 'o', default_value = "ferrodock.toml")]
        output: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ferrodock", "dock", "--workdir", "/tmp/w", "--lenient-exit"]).unwrap();
        assert_eq!(cli.command, Command::Dock);
        assert_eq!(cli.workdir, Some(PathBuf::from("/tmp/w")));
        assert!(cli.lenient_exit);
    }

    #[test]
    fn test_kebab_case_commands() {
        let cli = Cli::try_parse_from(["ferrodock", "prepare-receptor"]).unwrap();
        assert_eq!(cli.command, Command::PrepareReceptor);
        let cli = Cli::try_parse_from(["ferrodock", "add-ligand-block", "a.ali", "b.ali"]).unwrap();
        assert!(matches!(cli.command, Command::AddLigandBlock { overwrite: false, .. }));
    }

    #[test]
    fn test_generate_config_default_path() {
        let cli = Cli::try_parse_from(["ferrodock", "--config", "x.toml", "generate-config"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert_eq!(
            cli.command,
            Command::GenerateConfig { output: PathBuf::from("ferrodock.toml"), force: false }
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["ferrodock", "fly"]).is_err());
    }
}
