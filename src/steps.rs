//! The three commands of the bootstrap sequence.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::config_file::BootstrapConfig;
use crate::environment::Environment;
use crate::step_traits::StepArgs;
use crate::types::{Provisioner, Step};

/// Create the environment directory bound to an interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionArgs {
    pub provisioner: Provisioner,
    pub interpreter: PathBuf,
    pub env_dir: PathBuf,
}

impl ProvisionArgs {
    pub fn from_config(config: &BootstrapConfig, env_dir: PathBuf) -> Self {
        Self {
            provisioner: config.provisioner,
            interpreter: config.interpreter.clone(),
            env_dir,
        }
    }
}

impl StepArgs for ProvisionArgs {
    fn step(&self) -> Step {
        Step::Provision
    }

    fn program(&self) -> PathBuf {
        match self.provisioner {
            Provisioner::Virtualenv => PathBuf::from("virtualenv"),
            Provisioner::Venv => self.interpreter.clone(),
        }
    }

    fn to_cli_args(&self) -> Vec<OsString> {
        match self.provisioner {
            Provisioner::Virtualenv => vec![
                OsString::from("-p"),
                self.interpreter.clone().into_os_string(),
                self.env_dir.clone().into_os_string(),
            ],
            Provisioner::Venv => vec![
                OsString::from("-m"),
                OsString::from("venv"),
                self.env_dir.clone().into_os_string(),
            ],
        }
    }
}

/// `pip install -r <requirements>` inside the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallArgs {
    pub env: Environment,
    pub requirements: PathBuf,
}

impl StepArgs for InstallArgs {
    fn step(&self) -> Step {
        Step::Install
    }

    fn program(&self) -> PathBuf {
        self.env.pip()
    }

    fn to_cli_args(&self) -> Vec<OsString> {
        vec![
            OsString::from("install"),
            OsString::from("-r"),
            self.requirements.clone().into_os_string(),
        ]
    }

    fn get_env_vars(&self) -> Vec<(OsString, OsString)> {
        self.env.activation_vars(std::env::var_os("PATH"))
    }

    fn cleared_env_vars(&self) -> Vec<&'static str> {
        self.env.cleared_vars().to_vec()
    }
}

/// `python <entry_script> <entry_args...>` inside the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeArgs {
    pub env: Environment,
    pub entry_script: PathBuf,
    pub entry_args: Vec<String>,
}

impl StepArgs for InvokeArgs {
    fn step(&self) -> Step {
        Step::Invoke
    }

    fn program(&self) -> PathBuf {
        self.env.python()
    }

    fn to_cli_args(&self) -> Vec<OsString> {
        let mut args = vec![self.entry_script.clone().into_os_string()];
        args.extend(self.entry_args.iter().map(OsString::from));
        args
    }

    fn get_env_vars(&self) -> Vec<(OsString, OsString)> {
        self.env.activation_vars(std::env::var_os("PATH"))
    }

    fn cleared_env_vars(&self) -> Vec<&'static str> {
        self.env.cleared_vars().to_vec()
    }
}
