//! Report emission

use std::path::PathBuf;
use tracing::info;

use tuimuppet_common::RunReport;

/// Where the run report goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportTarget {
    Stdout,
    File(PathBuf),
}

impl ReportTarget {
    /// First target set wins; `"stdout"` or nothing means standard output
    pub fn resolve(candidates: &[Option<&str>]) -> Self {
        match candidates.iter().flatten().next() {
            None | Some(&"stdout") => ReportTarget::Stdout,
            Some(path) => ReportTarget::File(PathBuf::from(*path)),
        }
    }

    pub fn write(&self, report: &RunReport) -> anyhow::Result<()> {
        let json = report.to_json_pretty()?;
        match self {
            ReportTarget::Stdout => println!("{}", json),
            ReportTarget::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, format!("{}\n", json))?;
                info!("Report written to {}", path.display());
            }
        }
        Ok(())
    }
}
