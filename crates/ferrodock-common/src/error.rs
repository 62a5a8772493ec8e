use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy shared by every stage.
///
/// Errors are reported per work item; a failing item never aborts its
/// siblings in the same batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Tool invocation failed for {program}: {reason}")]
    ToolInvocationFailed {
        program: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Expected output artifact missing: {}", path.display())]
    OutputArtifactMissing { path: PathBuf },

    #[error("Parse error in {source_name}: {reason}")]
    ParseFormat { source_name: String, reason: String },

    #[error("Model index {index} not found in {}", path.display())]
    ModelIndexNotFound { index: u32, path: PathBuf },

    #[error("Output path {} is produced by both {first} and {second}", path.display())]
    OutputCollision {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Wrap an I/O error, mapping `NotFound` to [`PipelineError::InputNotFound`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::InputNotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn parse(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseFormat {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly tag, used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputNotFound { .. } => "input_not_found",
            Self::ToolInvocationFailed { .. } => "tool_invocation_failed",
            Self::OutputArtifactMissing { .. } => "output_artifact_missing",
            Self::ParseFormat { .. } => "parse_format",
            Self::ModelIndexNotFound { .. } => "model_index_not_found",
            Self::OutputCollision { .. } => "output_collision",
            Self::Config(_) => "config",
            Self::Io { .. } => "io",
            Self::Other(_) => "other",
        }
    }

    /// Whether retrying the same item could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ToolInvocationFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_input_not_found() {
        let err = PipelineError::io(
            "missing.pdb",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, PipelineError::InputNotFound { .. }));
        assert_eq!(err.kind(), "input_not_found");
    }

    #[test]
    fn test_only_tool_failures_are_retryable() {
        let tool = PipelineError::ToolInvocationFailed {
            program: "adfr".to_string(),
            exit_code: Some(1),
            reason: "exit status 1".to_string(),
        };
        assert!(tool.is_retryable());
        assert!(!PipelineError::Config("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_model_index_message_names_file_and_index() {
        let err = PipelineError::ModelIndexNotFound {
            index: 7,
            path: PathBuf::from("rec-lig_out.pdbqt"),
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("rec-lig_out.pdbqt"));
    }
}
