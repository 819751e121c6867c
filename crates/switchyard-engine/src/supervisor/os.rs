//! Operating-system process handles

use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::thread;

use switchyard_common::{KillMode, LaunchError, ProcessPriority};
use sysinfo::{Pid, System};
use tracing::{debug, warn};

use super::launch::{LaunchSpec, ProcessLauncher, RunningProcess, WindowStyle};
use crate::notify::ActivityNotifier;

/// Spawns real processes with `std::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl OsLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for OsLauncher {
    fn launch(
        &mut self,
        spec: &LaunchSpec,
        output: &ActivityNotifier,
    ) -> Result<Box<dyn RunningProcess>, LaunchError> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.arguments).stdin(Stdio::null());
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        match spec.window {
            Some(WindowStyle::Minimized) => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            Some(WindowStyle::Hidden) => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            None => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        let mut child = command
            .spawn()
            .map_err(|e| LaunchError::Spawn(e.to_string()))?;

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, output.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, output.clone());
        }

        debug!(pid = child.id(), program = %spec.program.display(), "Spawned process");
        Ok(Box::new(OsProcess { child }))
    }
}

/// Forward each line of a pipe to the notifier until the pipe closes
fn forward_lines<R: Read + Send + 'static>(pipe: R, output: ActivityNotifier) {
    thread::spawn(move || {
        for line in BufReader::new(pipe).lines() {
            match line {
                Ok(line) => output.miner_output(line),
                Err(_) => break,
            }
        }
    });
}

#[derive(Debug)]
pub struct OsProcess {
    child: Child,
}

impl RunningProcess for OsProcess {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self, mode: KillMode) -> io::Result<()> {
        if mode == KillMode::Tree {
            kill_descendants(self.pid());
        }
        match self.child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e),
        }
        self.child.wait().map(|_| ())
    }

    fn set_priority(&mut self, priority: ProcessPriority) -> io::Result<()> {
        set_niceness(self.pid(), priority.niceness())
    }

    fn set_affinity(&mut self, mask: u64) -> io::Result<()> {
        set_affinity(self.pid(), mask)
    }
}

/// Kill every descendant of `root`, deepest first
fn kill_descendants(root: u32) {
    let mut system = System::new();
    system.refresh_processes();

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in system.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut order = Vec::new();
    let mut queue = VecDeque::from([Pid::from_u32(root)]);
    while let Some(pid) = queue.pop_front() {
        if let Some(kids) = children.get(&pid) {
            for kid in kids {
                order.push(*kid);
                queue.push_back(*kid);
            }
        }
    }

    for pid in order.into_iter().rev() {
        if let Some(process) = system.process(pid) {
            if !process.kill() {
                warn!(pid = pid.as_u32(), "Failed to kill descendant");
            }
        }
    }
}

#[cfg(unix)]
fn set_niceness(pid: u32, niceness: i32) -> io::Result<()> {
    let output = Command::new("renice")
        .args(["-n", &niceness.to_string(), "-p", &pid.to_string()])
        .output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }
}

#[cfg(not(unix))]
fn set_niceness(_pid: u32, _niceness: i32) -> io::Result<()> {
    Err(super::launch::unsupported("process priority"))
}

#[cfg(target_os = "linux")]
fn set_affinity(pid: u32, mask: u64) -> io::Result<()> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid as NixPid;

    let mut cpus = CpuSet::new();
    for cpu in 0..CpuSet::count().min(64) {
        if mask & (1u64 << cpu) != 0 {
            cpus.set(cpu).map_err(io::Error::from)?;
        }
    }
    sched_setaffinity(NixPid::from_raw(pid as i32), &cpus).map_err(io::Error::from)
}

#[cfg(not(target_os = "linux"))]
fn set_affinity(_pid: u32, _mask: u64) -> io::Result<()> {
    Err(super::launch::unsupported("CPU affinity"))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn spec(program: &str, arguments: &[&str]) -> LaunchSpec {
        LaunchSpec {
            program: PathBuf::from(program),
            working_dir: None,
            arguments: arguments.iter().map(|a| a.to_string()).collect(),
            window: None,
        }
    }

    #[test]
    fn test_captured_output_is_forwarded() {
        let (notifier, mut rx) = ActivityNotifier::channel();
        let mut process = OsLauncher::new()
            .launch(&spec("/bin/sh", &["-c", "echo accepted"]), &notifier)
            .unwrap();

        let mut line = None;
        for _ in 0..50 {
            if let Ok(notification) = rx.try_recv() {
                line = Some(notification);
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(
            line,
            Some(crate::notify::Notification::MinerOutput("accepted".to_string()))
        );
        process.terminate(KillMode::Process).unwrap();
        assert!(!process.is_alive());
    }

    #[test]
    fn test_terminate_tree() {
        let notifier = ActivityNotifier::disabled();
        let mut process = OsLauncher::new()
            .launch(&spec("/bin/sh", &["-c", "sleep 30 & sleep 30"]), &notifier)
            .unwrap();
        assert!(process.is_alive());
        process.terminate(KillMode::Tree).unwrap();
        assert!(!process.is_alive());
        // a second terminate on a reaped process is harmless
        let _ = process.terminate(KillMode::Tree);
    }

    #[test]
    fn test_spawn_failure() {
        let notifier = ActivityNotifier::disabled();
        let err = OsLauncher::new()
            .launch(&spec("/nonexistent/miner", &[]), &notifier)
            .err()
            .unwrap();
        assert!(matches!(err, LaunchError::Spawn(_)));
    }
}
