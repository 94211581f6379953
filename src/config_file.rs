//! Configuration file handling for the bootstrap sequence.
//!
//! Every field has a default matching the classic setup
//! (`virtualenv -p /usr/bin/python3 venv`, `requirements.txt`,
//! `export.py setup_db`), so running without a config file is the normal case.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FfmrError;
use crate::types::{FailurePolicy, Provisioner};

/// Default interpreter the environment is bound to
pub const DEFAULT_INTERPRETER: &str = "/usr/bin/python3";
/// Default environment directory, relative to the working directory
pub const DEFAULT_ENV_DIR: &str = "venv";
/// Default dependency declaration file
pub const DEFAULT_REQUIREMENTS: &str = "requirements.txt";
/// Default external entry point
pub const DEFAULT_ENTRY_SCRIPT: &str = "export.py";
/// Default argument passed to the entry point
pub const DEFAULT_ENTRY_COMMAND: &str = "setup_db";

/// Bootstrap configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Tool used to create the environment
    pub provisioner: Provisioner,
    /// Interpreter the environment is bound to
    pub interpreter: PathBuf,
    /// Environment directory (relative paths resolve against the working directory)
    pub env_dir: PathBuf,
    /// Dependency declaration passed to `pip install -r`
    pub requirements: PathBuf,
    /// Script run by the environment's interpreter
    pub entry_script: PathBuf,
    /// Arguments passed to the entry script
    pub entry_args: Vec<String>,
    /// Handling of a failed dependency install
    pub failure_policy: FailurePolicy,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            provisioner: Provisioner::default(),
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            env_dir: PathBuf::from(DEFAULT_ENV_DIR),
            requirements: PathBuf::from(DEFAULT_REQUIREMENTS),
            entry_script: PathBuf::from(DEFAULT_ENTRY_SCRIPT),
            entry_args: vec![DEFAULT_ENTRY_COMMAND.to_string()],
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl BootstrapConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides on top of the file values
    pub fn with_strict(mut self, strict: bool) -> Self {
        if strict {
            self.failure_policy = FailurePolicy::Strict;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("interpreter", &self.interpreter),
            ("env_dir", &self.env_dir),
            ("requirements", &self.requirements),
            ("entry_script", &self.entry_script),
        ];
        for (name, path) in paths {
            if path.as_os_str().is_empty() {
                anyhow::bail!(FfmrError::config(format!("{} must not be empty", name)));
            }
        }

        if self.entry_args.is_empty() {
            anyhow::bail!(FfmrError::config(
                "entry_args must name at least one argument (e.g. \"setup_db\")",
            ));
        }
        if self.entry_args.iter().any(|arg| arg.trim().is_empty()) {
            anyhow::bail!(FfmrError::config("entry_args must not contain blank arguments"));
        }

        // A bare interpreter name is looked up on PATH by the provisioner.
        if self.interpreter.components().count() == 1
            && which::which(&self.interpreter).is_err()
        {
            tracing::warn!(
                "Interpreter {:?} is not on PATH; provisioning will likely fail",
                self.interpreter
            );
        }

        Ok(())
    }
}
