//! The provisioned runtime environment as an explicit value.
//!
//! Sourcing `bin/activate` mutates the calling shell. Here activation is the
//! set of variables returned by [`Environment::activation_vars`], which each
//! later step applies to its own child process only.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const BIN_DIR: &str = "Scripts";
#[cfg(not(windows))]
const BIN_DIR: &str = "bin";

#[cfg(windows)]
const EXE_SUFFIX: &str = ".exe";
#[cfg(not(windows))]
const EXE_SUFFIX: &str = "";

/// Variables `activate` unsets
const CLEARED_VARS: &[&str] = &["PYTHONHOME"];

/// Handle to a provisioned isolated runtime
///
/// Only a successful provisioning step produces one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    root: PathBuf,
}

impl Environment {
    /// Wrap a directory the provisioner just reported as created.
    pub(crate) fn provisioned(root: PathBuf) -> Self {
        Self { root }
    }

    /// Root directory of the environment
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the environment's executables
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    /// The environment's interpreter
    pub fn python(&self) -> PathBuf {
        self.bin_dir().join(format!("python{}", EXE_SUFFIX))
    }

    /// The environment's package installer
    pub fn pip(&self) -> PathBuf {
        self.bin_dir().join(format!("pip{}", EXE_SUFFIX))
    }

    /// Variables set by activation: `VIRTUAL_ENV` and `PATH` with the bin
    /// directory prepended to `current_path`.
    pub fn activation_vars(&self, current_path: Option<OsString>) -> Vec<(OsString, OsString)> {
        let mut paths = vec![self.bin_dir()];
        if let Some(current) = current_path {
            paths.extend(std::env::split_paths(&current));
        }
        // join_paths only fails on entries containing the separator
        let path = std::env::join_paths(&paths)
            .unwrap_or_else(|_| self.bin_dir().into_os_string());

        vec![
            (OsString::from("VIRTUAL_ENV"), self.root.clone().into_os_string()),
            (OsString::from("PATH"), path),
        ]
    }

    /// Variables removed by activation
    pub fn cleared_vars(&self) -> &'static [&'static str] {
        CLEARED_VARS
    }
}
