//! Scenario directory loading
//!
//! A scenario file sits next to optional `macros/` and `sequences/`
//! directories of JSON documents:
//!
//! ```text
//! login/
//!   scenario.json
//!   macros/common.json
//!   sequences/01-login.json
//!   sequences/02-logout.json
//! ```

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use tuimuppet_common::{MacroFile, Scenario, Sequence};

/// Documents for one run
#[derive(Debug, Clone)]
pub struct ScenarioBundle {
    pub scenario: Scenario,
    pub sequences: Vec<Sequence>,
    pub macros: Vec<MacroFile>,
}

/// Read a scenario and the sequences and macros beside it
pub fn load_bundle(scenario_path: &Path) -> anyhow::Result<ScenarioBundle> {
    let scenario = Scenario::from_json(&read(scenario_path)?)
        .with_context(|| format!("Invalid scenario {}", scenario_path.display()))?;

    let base = scenario_path.parent().unwrap_or_else(|| Path::new("."));

    let mut sequences = Vec::new();
    for path in json_files(&base.join("sequences"))? {
        let sequence = Sequence::from_json(&read(&path)?)
            .with_context(|| format!("Invalid sequence {}", path.display()))?;
        sequences.push(sequence);
    }

    let mut macros = Vec::new();
    for path in json_files(&base.join("macros"))? {
        let file = MacroFile::from_json(&read(&path)?)
            .with_context(|| format!("Invalid macro file {}", path.display()))?;
        macros.push(file);
    }

    debug!(
        "Loaded scenario {} with {} sequence(s) and {} macro file(s)",
        scenario.name,
        sequences.len(),
        macros.len()
    );

    Ok(ScenarioBundle {
        scenario,
        sequences,
        macros,
    })
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// `*.json` directly inside `dir`, sorted by file name. Missing dir is empty.
fn json_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}
