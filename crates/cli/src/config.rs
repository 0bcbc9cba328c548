//! Harness configuration
//!
//! Optional TOML file with machine-level settings that do not belong in a
//! scenario document:
//!
//! ```toml
//! report = "reports/latest.json"
//! captures_dir = "captures"
//!
//! [backend]
//! tmux_bin = "/opt/homebrew/bin/tmux"
//! session_prefix = "ci"
//! cols = 100
//! rows = 30
//! transcript_limit_bytes = 4000000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tuimuppet_engine::BackendOptions;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Backend construction options
    pub backend: BackendOptions,

    /// Report target when neither `--report` nor the scenario names one
    pub report: Option<String>,

    /// Captures directory when neither `--captures` nor the scenario names one
    pub captures_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Load configuration from file, defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_partial_backend_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tuimuppet.toml");
        std::fs::write(
            &path,
            "report = \"stdout\"\n[backend]\nsession_prefix = \"ci\"\ncols = 100\n",
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.report.as_deref(), Some("stdout"));
        assert_eq!(config.backend.session_prefix, "ci");
        assert_eq!(config.backend.cols, 100);
        assert_eq!(config.backend.rows, BackendOptions::default().rows);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[backend\n").unwrap();
        assert!(HarnessConfig::load(&path).is_err());
    }
}
