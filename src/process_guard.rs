//! Child process lifecycle for bootstrap steps
//!
//! Every step runs in its own process group so the whole tree (pip and the
//! compilers it spawns, the entry point and its workers) can be signalled at
//! once. The PIDs of running steps live in a global registry; on SIGINT,
//! SIGTERM or SIGHUP the registered groups get SIGTERM, a grace period, then
//! SIGKILL, and the bootstrap exits with `128 + signal`.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::types::Step;

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Grace period between SIGTERM and SIGKILL when a signal arrives
const SIGNAL_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Registry tracking the running step processes and which step each one is
#[derive(Debug, Default)]
pub struct ChildRegistry {
    children: BTreeMap<u32, Step>,
    /// Set once termination started; later calls are no-ops
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Track a spawned step
    pub fn register(&mut self, pid: u32, step: Step) {
        self.children.insert(pid, step);
        tracing::debug!("{} step running as PID {}", step, pid);
    }

    /// Stop tracking a step that exited
    pub fn unregister(&mut self, pid: u32) {
        if let Some(step) = self.children.remove(&pid) {
            tracing::debug!("{} step (PID {}) exited", step, pid);
        }
    }

    /// Number of tracked children
    pub fn count(&self) -> usize {
        self.children.len()
    }

    /// Steps currently running, ordered by PID
    pub fn running_steps(&self) -> Vec<Step> {
        self.children.values().copied().collect()
    }

    /// Stop every running step: SIGTERM to its process group, up to
    /// `grace_period` to exit, then SIGKILL. Returns the steps that had to be
    /// killed.
    pub fn terminate_all(&mut self, grace_period: Duration) -> Vec<Step> {
        if self.cleanup_initiated {
            tracing::debug!("Cleanup already initiated, skipping");
            return Vec::new();
        }
        self.cleanup_initiated = true;

        let children = std::mem::take(&mut self.children);
        if children.is_empty() {
            return Vec::new();
        }

        for (&pid, &step) in &children {
            tracing::info!("Stopping {} step (PID {})", step, pid);
            signal_step(pid, step, Signal::SIGTERM);
        }

        let deadline = Instant::now() + grace_period;
        let mut remaining: Vec<(u32, Step)> = children.into_iter().collect();
        loop {
            remaining.retain(|&(pid, _)| is_process_alive(pid));
            if remaining.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &(pid, step) in &remaining {
            tracing::warn!("{} step (PID {}) ignored SIGTERM, sending SIGKILL", step, pid);
            signal_step(pid, step, Signal::SIGKILL);
        }

        remaining.into_iter().map(|(_, step)| step).collect()
    }
}

/// Signal a step's process group, falling back to the process itself when
/// the group is already gone.
fn signal_step(pid: u32, step: Step, sig: Signal) {
    if send_signal_to_group(pid, sig).is_ok() {
        return;
    }
    if let Err(e) = send_signal(pid, sig) {
        tracing::debug!("{} step (PID {}) not signalled with {}: {}", step, pid, sig, e);
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative PID addresses the whole process group
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Alive means it exists and is neither a zombie nor dead
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// Install SIGINT/SIGTERM/SIGHUP handlers that stop running steps and exit.
/// Call once at program start.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "signal",
            };
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                let running = registry.running_steps();
                if running.is_empty() {
                    tracing::info!("Received {} between steps, stopping bootstrap", name);
                } else {
                    let steps: Vec<String> = running.iter().map(Step::to_string).collect();
                    tracing::info!(
                        "Received {} during {} step, stopping bootstrap",
                        name,
                        steps.join(", ")
                    );
                }
                let killed = registry.terminate_all(SIGNAL_GRACE_PERIOD);
                if !killed.is_empty() {
                    tracing::warn!("Force-killed {} step(s)", killed.len());
                }
            }

            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for `std::process::Command` to spawn into a new process group
pub trait CommandProcessGroup {
    /// Make the child the leader of its own process group and, on Linux,
    /// have it receive SIGTERM if the bootstrap dies.
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::from)?;
                set_parent_death_signal()
            });
        }
        self
    }
}

#[cfg(target_os = "linux")]
fn set_parent_death_signal() -> std::io::Result<()> {
    // Runs between fork and exec: only async-signal-safe calls
    if unsafe { nix::libc::prctl(nix::libc::PR_SET_PDEATHSIG, nix::libc::SIGTERM) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn wait_for_exit(child: &mut std::process::Child, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Ok(Some(_)) = child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_registry_register_unregister() {
        let mut registry = ChildRegistry::default();

        registry.register(1234, Step::Provision);
        registry.register(5678, Step::Install);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.running_steps(), vec![Step::Provision, Step::Install]);

        registry.unregister(1234);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.running_steps(), vec![Step::Install]);

        registry.unregister(5678);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_terminate_all_stops_process_group() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn sh");

        let mut registry = ChildRegistry::default();
        registry.register(child.id(), Step::Invoke);
        assert!(is_process_alive(child.id()));

        // sh exits on SIGTERM, so nothing needs SIGKILL
        let killed = registry.terminate_all(Duration::from_secs(2));
        assert!(killed.is_empty());

        assert!(wait_for_exit(&mut child, Duration::from_secs(2)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_terminate_all_kills_step_ignoring_sigterm() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 60"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn sh");
        // Let the trap install before signalling
        std::thread::sleep(Duration::from_millis(300));

        let mut registry = ChildRegistry::default();
        registry.register(child.id(), Step::Install);

        let killed = registry.terminate_all(Duration::from_millis(300));
        assert_eq!(killed, vec![Step::Install]);
        assert!(wait_for_exit(&mut child, Duration::from_secs(2)));
    }

    #[test]
    fn test_terminate_all_handles_exited_process() {
        let mut child = Command::new("sh")
            .args(["-c", "exit 0"])
            .spawn()
            .expect("Failed to spawn sh");
        let pid = child.id();
        let _ = child.wait();

        let mut registry = ChildRegistry::default();
        registry.register(pid, Step::Install);
        assert!(registry.terminate_all(Duration::from_millis(100)).is_empty());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_cleanup_runs_once() {
        let mut registry = ChildRegistry::default();
        registry.terminate_all(Duration::from_millis(10));
        assert!(registry.cleanup_initiated);

        registry.register(12345, Step::Install);
        assert!(registry.terminate_all(Duration::from_millis(10)).is_empty());
        // Second call returned early, the PID is still tracked
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(999_999));
        assert!(send_signal(999_999, Signal::SIGTERM).is_err());
    }

    #[test]
    fn test_new_process_group_leader() {
        let mut child = Command::new("sh")
            .args(["-c", "sleep 5"])
            .in_new_process_group()
            .spawn()
            .expect("Failed to spawn sh");
        let pid = Pid::from_raw(child.id() as i32);

        let pgid = nix::unistd::getpgid(Some(pid)).unwrap();
        assert_eq!(pgid, pid);

        let _ = child.kill();
        let _ = child.wait();
    }
}
