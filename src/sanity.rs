//! Pre-flight checks for the bootstrap
//!
//! `ffmr-bootstrap check` reports what the bootstrap would trip over:
//! - the provisioner tool is not on PATH
//! - the interpreter the environment is bound to does not exist
//! - the dependency file or the entry script is missing
//!
//! The bootstrap itself never runs these checks; its only gate is the
//! provisioning step's exit status.

use std::path::{Path, PathBuf};

use crate::config_file::BootstrapConfig;

/// Result of environment verification
#[derive(Debug, Default)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub missing_interpreter: Option<PathBuf>,
    pub missing_files: Vec<PathBuf>,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty()
            && self.missing_interpreter.is_none()
            && self.missing_files.is_empty()
    }
}

fn binary_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

fn interpreter_exists(interpreter: &Path) -> bool {
    if interpreter.components().count() == 1 {
        which::which(interpreter).is_ok()
    } else {
        interpreter.is_file()
    }
}

/// Perform all checks relative to `workdir`
pub fn verify_environment(config: &BootstrapConfig, workdir: &Path) -> SanityCheckResult {
    let mut result = SanityCheckResult::default();

    if let Some(binary) = config.provisioner.required_binary() {
        if !binary_exists(binary) {
            result.missing_binaries.push(binary.to_string());
        }
    }

    if !interpreter_exists(&config.interpreter) {
        result.missing_interpreter = Some(config.interpreter.clone());
    }

    for file in [&config.requirements, &config.entry_script] {
        if !workdir.join(file).is_file() {
            result.missing_files.push(file.clone());
        }
    }

    result
}

/// Human-readable report, one line per finding
pub fn render_report(result: &SanityCheckResult) -> String {
    let mut lines = Vec::new();

    for binary in &result.missing_binaries {
        lines.push(format!(
            "✗ {} not found on PATH (install: {})",
            binary,
            install_hint(binary)
        ));
    }
    if let Some(interpreter) = &result.missing_interpreter {
        lines.push(format!("✗ Interpreter {} does not exist", interpreter.display()));
    }
    for file in &result.missing_files {
        lines.push(format!("✗ Missing file: {}", file.display()));
    }

    if lines.is_empty() {
        lines.push("✓ Pre-flight checks passed".to_string());
    }

    lines.join("\n")
}

fn install_hint(binary: &str) -> &'static str {
    match binary {
        "virtualenv" => "pip install virtualenv, or set \"provisioner\": \"venv\"",
        _ => "see your distribution's packages",
    }
}
