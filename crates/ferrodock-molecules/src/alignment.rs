//! PIR alignment preprocessing and template discovery.
//!
//! Structure headers in a PIR alignment look like
//! `structureX:4biw:FIRST:A:+120:A::::`; the fifth field is the residue
//! count of the template segment.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use ferrodock_common::config::TemplateSpec;
use ferrodock_common::error::{PipelineError, Result};
use ferrodock_common::naming::file_name;

const STRUCTURE_HEADER: &str = "structureX";

/// Extend every template segment by one residue and add a `.` block
/// (the ligand) before each `*` terminator, so HETATM records are modelled.
pub fn add_ligand_block_text(text: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            let line = if line.starts_with(STRUCTURE_HEADER) {
                bump_residue_count(line)
            } else {
                line.to_string()
            };
            line.replace('*', ".*")
        })
        .collect()
}

fn bump_residue_count(line: &str) -> String {
    let mut fields: Vec<String> = line.split(':').map(str::to_string).collect();
    if fields.len() < 5 {
        return line.to_string();
    }
    match fields[4].trim_start_matches('+').trim().parse::<i64>() {
        Ok(count) => {
            fields[4] = format!("+{}", count + 1);
            fields.join(":")
        }
        Err(_) => {
            warn!("Invalid residue count {:?} in alignment header", fields[4]);
            line.to_string()
        }
    }
}

/// Point superposed template files back at the originals.
pub fn strip_fit_suffix_text(text: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line.starts_with(STRUCTURE_HEADER) {
                line.replace("_fit.pdb", ".pdb")
            } else {
                line.to_string()
            }
        })
        .collect()
}

fn transform_file(
    input: &Path,
    output: &Path,
    overwrite: bool,
    transform: fn(&str) -> String,
) -> Result<PathBuf> {
    if output.exists() && !overwrite {
        return Err(PipelineError::Config(format!(
            "{} already exists; pass overwrite to replace it",
            output.display()
        )));
    }
    let bytes = std::fs::read(input).map_err(|e| PipelineError::io(input, e))?;
    let text = String::from_utf8_lossy(&bytes);
    std::fs::write(output, transform(&text)).map_err(|e| PipelineError::io(output, e))?;
    info!("Wrote {}", output.display());
    Ok(output.to_path_buf())
}

/// File form of [`add_ligand_block_text`].
pub fn add_ligand_block(input: &Path, output: &Path, overwrite: bool) -> Result<PathBuf> {
    transform_file(input, output, overwrite, add_ligand_block_text)
}

/// File form of [`strip_fit_suffix_text`].
pub fn strip_fit_suffix(input: &Path, output: &Path, overwrite: bool) -> Result<PathBuf> {
    transform_file(input, output, overwrite, strip_fit_suffix_text)
}

/// Chain id of the first ATOM record in a PDB file.
fn first_atom_chain(path: &Path) -> Result<Option<String>> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    for line in std::io::BufReader::new(file).lines() {
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        if !line.starts_with("ATOM") {
            continue;
        }
        // Column 22 in fixed-width records, else the fifth token.
        let fixed = line.get(21..22).map(str::trim).filter(|c| !c.is_empty());
        let chain = fixed
            .map(str::to_string)
            .or_else(|| line.split_whitespace().nth(4).map(str::to_string));
        return Ok(chain);
    }
    Ok(None)
}

/// One template per `.pdb` file in `dir`: the file's code and the chain of
/// its first ATOM record. Files without ATOM records are skipped.
pub fn detect_templates(dir: &Path) -> Result<Vec<TemplateSpec>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("pdb"))
        .collect();
    paths.sort();

    let mut templates = Vec::new();
    for path in paths {
        let name = file_name(&path);
        let code = name.split('.').next().unwrap_or_default().to_string();
        match first_atom_chain(&path)? {
            Some(chain) => {
                debug!("Template {}{} from {}", code, chain, name);
                templates.push(TemplateSpec { code, chain });
            }
            None => debug!("Skipping {}: no ATOM records", name),
        }
    }
    info!("Detected {} templates in {:?}", templates.len(), dir);
    Ok(templates)
}
