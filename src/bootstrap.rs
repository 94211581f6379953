//! The bootstrap sequence: provision, activate, install, invoke, report.
//!
//! # Invariants
//!
//! - Steps run strictly in order, each at most once.
//! - Install and invoke need an [`Environment`], which exists only after a
//!   successful provision step, so neither can run after provisioning failed.
//! - A failed provision ends the sequence with [`PROVISION_FAILED_MESSAGE`]
//!   and a non-zero exit code.
//!
//! # Failure modes
//!
//! - Provision failed: reported, nothing else runs.
//! - Install failed, [`FailurePolicy::PassThrough`]: logged, invoke still
//!   runs, the exit code is invoke's.
//! - Install failed, [`FailurePolicy::Strict`]: reported, invoke skipped,
//!   the exit code is install's.
//! - Invoke failed: its exit code is the bootstrap's.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::command_runner::{CommandRunner, StepOutput};
use crate::config_file::BootstrapConfig;
use crate::environment::Environment;
use crate::steps::{InstallArgs, InvokeArgs, ProvisionArgs};
use crate::types::FailurePolicy;

/// Printed when the environment could not be created
pub const PROVISION_FAILED_MESSAGE: &str = "Ya na know virtualenv? You no Python 3?";

/// How a bootstrap run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Install and invoke were both attempted
    Completed {
        install: StepOutput,
        invoke: StepOutput,
    },
    /// The environment could not be created; nothing else ran
    ProvisionFailed { provision: StepOutput },
    /// Strict policy only: install failed and invoke was skipped
    InstallFailed { install: StepOutput },
}

impl BootstrapOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed { invoke, .. } => invoke.status_code(),
            Self::ProvisionFailed { provision } => provision.status_code(),
            Self::InstallFailed { install } => install.status_code(),
        }
    }

    /// Message for the user, if the outcome has one
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Completed { .. } => None,
            Self::ProvisionFailed { .. } => Some(PROVISION_FAILED_MESSAGE.to_string()),
            Self::InstallFailed { install } => Some(format!(
                "Dependency installation failed (exit code {})",
                install.status_code()
            )),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Drives the bootstrap steps through a [`CommandRunner`]
pub struct Bootstrap<R: CommandRunner> {
    config: BootstrapConfig,
    workdir: PathBuf,
    runner: R,
}

impl<R: CommandRunner> Bootstrap<R> {
    /// `workdir` is where relative config paths resolve and steps run.
    ///
    /// A relative `workdir` is made absolute against the current directory
    /// first: steps already run inside it, so the environment path they
    /// receive must not be relative to it again.
    pub fn new(config: BootstrapConfig, workdir: impl Into<PathBuf>, runner: R) -> Self {
        let workdir = workdir.into();
        let workdir = std::path::absolute(&workdir).unwrap_or(workdir);
        Self {
            config,
            workdir,
            runner,
        }
    }

    /// Consume the bootstrap and hand back the runner
    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Location of the environment directory
    pub fn env_dir(&self) -> PathBuf {
        resolve(&self.workdir, &self.config.env_dir)
    }

    /// Run the whole sequence once.
    pub fn run(&mut self) -> Result<BootstrapOutcome> {
        let env = match self.provision()? {
            Ok(env) => env,
            Err(provision) => {
                warn!(
                    "Provisioning failed with exit code {}",
                    provision.status_code()
                );
                return Ok(BootstrapOutcome::ProvisionFailed { provision });
            }
        };
        info!("Environment ready at {}", env.root().display());

        let install = self.runner.run(&InstallArgs {
            env: env.clone(),
            requirements: self.config.requirements.clone(),
        })?;

        if !install.success {
            match self.config.failure_policy {
                FailurePolicy::Strict => {
                    warn!("Dependency installation failed, skipping entry point");
                    return Ok(BootstrapOutcome::InstallFailed { install });
                }
                FailurePolicy::PassThrough => {
                    warn!(
                        "Dependency installation failed with exit code {}, invoking entry point anyway",
                        install.status_code()
                    );
                }
            }
        }

        let invoke = self.runner.run(&InvokeArgs {
            env,
            entry_script: self.config.entry_script.clone(),
            entry_args: self.config.entry_args.clone(),
        })?;

        Ok(BootstrapOutcome::Completed { install, invoke })
    }

    /// Provision step. The inner `Err` carries the failed step's output.
    fn provision(&mut self) -> Result<std::result::Result<Environment, StepOutput>> {
        let env_dir = self.env_dir();
        let output = self
            .runner
            .run(&ProvisionArgs::from_config(&self.config, env_dir.clone()))?;

        if output.success {
            Ok(Ok(Environment::provisioned(env_dir)))
        } else {
            Ok(Err(output))
        }
    }
}

fn resolve(workdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}
