//! Type-safe configuration types for ffmr-bootstrap
//!
//! Enums instead of strings for every choice the bootstrap makes, so config
//! files and CLI flags are validated at parse time.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// One step of the bootstrap sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Step {
    /// Create the isolated runtime environment
    Provision,
    /// Install the declared dependency set into it
    Install,
    /// Run the external entry point inside it
    Invoke,
}

/// Tool used to create the runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Provisioner {
    /// `virtualenv -p <interpreter> <env_dir>`
    #[default]
    Virtualenv,
    /// `<interpreter> -m venv <env_dir>`
    Venv,
}

impl Provisioner {
    /// Program that must be on PATH for this provisioner, if any.
    ///
    /// `Venv` runs the configured interpreter directly.
    pub fn required_binary(&self) -> Option<&'static str> {
        match self {
            Self::Virtualenv => Some("virtualenv"),
            Self::Venv => None,
        }
    }
}

/// What happens when the dependency install step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Run the entry point anyway; the exit status is the entry point's
    #[default]
    PassThrough,
    /// Stop after a failed install and exit with its status
    Strict,
}
