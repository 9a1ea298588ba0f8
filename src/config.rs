//! Engine configuration.
//!
//! The engine itself only ever sees an [`EngineConfig`] value. Callers build
//! one once at startup, usually through [`ConfigLoader`], and pass it down.
//!
//! Loader precedence (later wins):
//! - defaults: `specs/` and `README.md`
//! - `.spec-manifest.json` in the project root (`specsDir`, `readmeFilename`)
//! - `SPEC_MANIFEST_DIR` and `SPEC_MANIFEST_README` environment variables

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_SPECS_DIR: &str = "specs";
pub const DEFAULT_README: &str = "README.md";
pub const CONFIG_FILE: &str = ".spec-manifest.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding one sub-directory per spec.
    pub specs_dir: PathBuf,
    /// File name of the main document inside each spec directory.
    pub readme_filename: String,
}

impl EngineConfig {
    pub fn new(specs_dir: impl Into<PathBuf>, readme_filename: impl Into<String>) -> Self {
        Self {
            specs_dir: specs_dir.into(),
            readme_filename: readme_filename.into(),
        }
    }

    pub fn with_specs_dir(specs_dir: impl Into<PathBuf>) -> Self {
        Self::new(specs_dir, DEFAULT_README)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    specs_dir: Option<String>,
    readme_filename: Option<String>,
}

/// Resolves an [`EngineConfig`] for a project root.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
}

impl ConfigLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load using the process environment for overrides.
    pub fn load(&self) -> Result<EngineConfig> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    pub fn load_with_env(&self, env: impl Fn(&str) -> Option<String>) -> Result<EngineConfig> {
        let file = self.read_file()?;

        let specs_dir = env("SPEC_MANIFEST_DIR")
            .or(file.specs_dir)
            .unwrap_or_else(|| DEFAULT_SPECS_DIR.to_string());
        let readme_filename = env("SPEC_MANIFEST_README")
            .or(file.readme_filename)
            .unwrap_or_else(|| DEFAULT_README.to_string());

        Ok(EngineConfig::new(
            self.resolve(Path::new(&specs_dir)),
            readme_filename,
        ))
    }

    fn read_file(&self) -> Result<ConfigFile> {
        let path = self.root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(ConfigFile::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(file)
    }

    fn resolve(&self, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.root.join(dir)
        }
    }
}
