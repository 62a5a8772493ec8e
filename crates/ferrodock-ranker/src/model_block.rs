//! Single-model extraction from multi-model PDBQT files.

use std::path::{Path, PathBuf};

use ferrodock_common::error::{PipelineError, Result};

/// A `MODEL`..`ENDMDL` block, both markers included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBlock {
    pub index: u32,
    /// 0-based line numbers of the two markers
    pub start_line: usize,
    pub end_line: usize,
    /// The block's bytes, line endings preserved
    pub text: String,
}

fn model_index(line: &str) -> Option<u32> {
    if !line.starts_with("MODEL") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// The first block opened by `MODEL <index>` and closed by the next `ENDMDL`.
pub fn extract_model_block(text: &str, index: u32) -> Option<ModelBlock> {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let start = lines.iter().position(|l| model_index(l) == Some(index))?;
    let end = start + lines[start..].iter().position(|l| l.starts_with("ENDMDL"))?;
    Some(ModelBlock {
        index,
        start_line: start,
        end_line: end,
        text: lines[start..=end].concat(),
    })
}

/// Extract model `index` from `source` into `destination`.
pub fn write_model_block(source: &Path, index: u32, destination: &Path) -> Result<ModelBlock> {
    let bytes = std::fs::read(source).map_err(|e| PipelineError::io(source, e))?;
    let text = String::from_utf8_lossy(&bytes);
    let block = extract_model_block(&text, index).ok_or_else(|| PipelineError::ModelIndexNotFound {
        index,
        path: PathBuf::from(source),
    })?;
    std::fs::write(destination, &block.text).map_err(|e| PipelineError::io(destination, e))?;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSES: &str = "\
MODEL 1
REMARK energy -8.5
ATOM      1  C   LIG A   1       0.000   0.000   0.000
ENDMDL
MODEL 2
REMARK energy -7.1
ATOM      1  C   LIG A   1       1.000   0.000   0.000
ENDMDL
MODEL 10
ENDMDL
";

    #[test]
    fn test_block_is_inclusive() {
        let block = extract_model_block(POSES, 2).unwrap();
        assert_eq!((block.start_line, block.end_line), (4, 7));
        assert!(block.text.starts_with("MODEL 2\n"));
        assert!(block.text.ends_with("ENDMDL\n"));
        assert_eq!(block.text.lines().count(), 4);
    }

    #[test]
    fn test_index_matches_whole_number() {
        let block = extract_model_block(POSES, 10).unwrap();
        assert_eq!(block.text, "MODEL 10\nENDMDL\n");
        assert!(extract_model_block(POSES, 3).is_none());
    }

    #[test]
    fn test_unterminated_block_not_found() {
        assert!(extract_model_block("MODEL 1\nATOM\n", 1).is_none());
    }

    #[test]
    fn test_crlf_preserved() {
        let text = "MODEL 1\r\nATOM\r\nENDMDL\r\n";
        assert_eq!(extract_model_block(text, 1).unwrap().text, text);
    }

    #[test]
    fn test_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("rec-lig_out.pdbqt");
        std::fs::write(&source, POSES).unwrap();
        let first = dir.path().join("a.pdbqt");
        let second = dir.path().join("b.pdbqt");

        write_model_block(&source, 1, &first).unwrap();
        write_model_block(&source, 1, &second).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_missing_index_names_index_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("p.pdbqt");
        std::fs::write(&source, POSES).unwrap();
        match write_model_block(&source, 7, &dir.path().join("out.pdbqt")) {
            Err(PipelineError::ModelIndexNotFound { index, path }) => {
                assert_eq!(index, 7);
                assert_eq!(path, source);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dir.path().join("out.pdbqt").exists());
    }
}
