//! Step execution
//!
//! [`CommandRunner`] is the seam between the bootstrap sequence and the
//! operating system. [`SystemRunner`] spawns real children; [`DryRunRunner`]
//! only reports what would run.
//!
//! # Exit codes
//!
//! Codes follow shell conventions so the bootstrap's status matches what the
//! equivalent shell pipeline would report:
//!
//! - normal exit: the child's code
//! - killed by a signal: `128 + signal`
//! - program not found: 127
//! - program not executable: 126

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::step_traits::StepArgs;
use crate::types::Step;

/// Exit code for a program that could not be found
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code for a program that could not be executed
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Executes one bootstrap step and reports how it ended.
pub trait CommandRunner {
    /// Run the step to completion.
    ///
    /// A step that ran and failed is `Ok` with `success == false`; `Err` is
    /// reserved for failures to run anything at all.
    fn run(&mut self, args: &dyn StepArgs) -> Result<StepOutput>;
}

/// Result of a step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// Which step ran
    pub step: Step,
    /// Exit code (`128 + signal` if the child was killed)
    pub exit_code: Option<i32>,
    /// Whether the step exited successfully (exit code 0)
    pub success: bool,
}

impl StepOutput {
    /// A step that exited with status 0
    pub fn succeeded(step: Step) -> Self {
        Self {
            step,
            exit_code: Some(0),
            success: true,
        }
    }

    /// A step that exited with `code`
    pub fn exited(step: Step, code: i32) -> Self {
        Self {
            step,
            exit_code: Some(code),
            success: code == 0,
        }
    }

    /// Exit status to hand to the caller. Never 0 for a failed step.
    pub fn status_code(&self) -> i32 {
        match (self.success, self.exit_code) {
            (true, _) => 0,
            (false, Some(code)) if code != 0 => code,
            (false, _) => 1,
        }
    }
}

/// Runs steps as real child processes.
///
/// Children inherit stdout/stderr so pip's progress and the entry point's
/// messages stream through; stdin is closed since each child runs in its own
/// process group.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    workdir: PathBuf,
}

impl SystemRunner {
    /// Run steps from `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, args: &dyn StepArgs) -> Result<StepOutput> {
        let step = args.step();
        let program = args.program();
        let env_vars = args.get_env_vars();

        info!("{}: {}", step, args.command_line());
        debug!("{} env={:?} cleared={:?}", step, env_vars, args.cleared_env_vars());

        let mut cmd = Command::new(&program);
        cmd.args(args.to_cli_args())
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .in_new_process_group();

        for (key, value) in &env_vars {
            cmd.env(key, value);
        }
        for key in args.cleared_env_vars() {
            cmd.env_remove(key);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("{}: {} not found", step, program.display());
                return Ok(StepOutput::exited(step, EXIT_NOT_FOUND));
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                warn!("{}: {} is not executable", step, program.display());
                return Ok(StepOutput::exited(step, EXIT_NOT_EXECUTABLE));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to spawn {}", program.display()));
            }
        };
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid, step);
        }

        let status = child.wait();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let status = status.with_context(|| format!("Failed waiting for {} step", step))?;
        let exit_code = status
            .code()
            .or_else(|| status.signal().map(|signal| 128 + signal));

        if status.success() {
            info!("{} step completed", step);
        } else {
            info!("{} step failed with exit code {:?}", step, exit_code);
        }

        Ok(StepOutput {
            step,
            exit_code,
            success: status.success(),
        })
    }
}

/// Reports each step instead of running it. Every step "succeeds".
#[derive(Debug, Default)]
pub struct DryRunRunner {
    planned: Vec<String>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command lines that would have run, in order
    pub fn planned(&self) -> &[String] {
        &self.planned
    }
}

impl CommandRunner for DryRunRunner {
    fn run(&mut self, args: &dyn StepArgs) -> Result<StepOutput> {
        let line = args.command_line();
        info!("[DRY RUN] {}: {}", args.step(), line);
        println!("[DRY RUN] {}", line);
        self.planned.push(line);
        Ok(StepOutput::succeeded(args.step()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    /// `sh -c <script>` as a step
    struct ShellStep {
        script: &'static str,
    }

    impl StepArgs for ShellStep {
        fn step(&self) -> Step {
            Step::Invoke
        }

        fn program(&self) -> PathBuf {
            PathBuf::from("sh")
        }

        fn to_cli_args(&self) -> Vec<OsString> {
            vec![OsString::from("-c"), OsString::from(self.script)]
        }

        fn get_env_vars(&self) -> Vec<(OsString, OsString)> {
            vec![(OsString::from("FFMR_STEP_TEST"), OsString::from("42"))]
        }
    }

    struct MissingStep;

    impl StepArgs for MissingStep {
        fn step(&self) -> Step {
            Step::Provision
        }

        fn program(&self) -> PathBuf {
            PathBuf::from("ffmr-definitely-not-installed-12345")
        }

        fn to_cli_args(&self) -> Vec<OsString> {
            Vec::new()
        }
    }

    #[test]
    fn test_status_code() {
        assert_eq!(StepOutput::succeeded(Step::Install).status_code(), 0);
        assert_eq!(StepOutput::exited(Step::Install, 3).status_code(), 3);

        let killed = StepOutput {
            step: Step::Invoke,
            exit_code: None,
            success: false,
        };
        assert_eq!(killed.status_code(), 1);
    }

    #[test]
    fn test_system_runner_exit_codes() {
        let mut runner = SystemRunner::new(".");

        let ok = runner.run(&ShellStep { script: "exit 0" }).unwrap();
        assert!(ok.success);
        assert_eq!(ok.exit_code, Some(0));

        let failed = runner.run(&ShellStep { script: "exit 7" }).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.exit_code, Some(7));
    }

    #[test]
    fn test_system_runner_passes_env() {
        let mut runner = SystemRunner::new(".");
        let output = runner
            .run(&ShellStep {
                script: "test \"$FFMR_STEP_TEST\" = 42",
            })
            .unwrap();
        assert!(output.success);
    }

    #[test]
    fn test_system_runner_signal_exit() {
        let mut runner = SystemRunner::new(".");
        let output = runner.run(&ShellStep { script: "kill -KILL $$" }).unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(128 + 9));
    }

    #[test]
    fn test_system_runner_missing_program() {
        let mut runner = SystemRunner::new(".");
        let output = runner.run(&MissingStep).unwrap();
        assert!(!output.success);
        assert_eq!(output.exit_code, Some(EXIT_NOT_FOUND));
    }

    #[test]
    fn test_dry_run_records_without_running() {
        let mut runner = DryRunRunner::new();
        let output = runner.run(&ShellStep { script: "exit 9" }).unwrap();
        assert!(output.success);
        assert_eq!(runner.planned(), &["sh -c exit 9".to_string()]);
    }
}
