//! Typed command contracts for bootstrap steps.
//!
//! Each step is a struct implementing [`StepArgs`]; the runner never builds
//! argument vectors by hand. The struct definition is the contract for which
//! program runs, with which flags, under which environment.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::types::Step;

/// Trait for typed step arguments.
///
/// # Contract
///
/// - `program()`: the executable, either a bare name looked up on `PATH`
///   or a path into the provisioned environment.
/// - `to_cli_args()`: arguments exactly as the program expects them.
/// - `get_env_vars()`: variables to set on the child only.
/// - `cleared_env_vars()`: variables to remove from the child only.
///
/// # Invariants
///
/// - Implementations never touch the parent's environment.
/// - Steps that need the runtime environment hold an
///   [`Environment`](crate::environment::Environment), so they cannot be
///   constructed before provisioning succeeded.
pub trait StepArgs {
    /// Which bootstrap step this is
    fn step(&self) -> Step;

    /// Program to execute
    fn program(&self) -> PathBuf;

    /// Arguments passed to the program
    fn to_cli_args(&self) -> Vec<OsString>;

    /// Environment variables for the child
    fn get_env_vars(&self) -> Vec<(OsString, OsString)> {
        Vec::new()
    }

    /// Environment variables removed from the child
    fn cleared_env_vars(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Human-readable command line, for logs and dry runs
    fn command_line(&self) -> String {
        let mut parts = vec![self.program().display().to_string()];
        parts.extend(
            self.to_cli_args()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}
