//! Process supervisor
//!
//! Owns at most one external process at a time. Starting validates the
//! workload's folder and command, spawns through the injected launcher and
//! applies best-effort cosmetics (title, priority, affinity). Stopping is
//! idempotent and reports the completed run so the engine can accumulate
//! mining time.

pub mod launch;
pub mod os;

pub use launch::{split_arguments, LaunchSpec, ProcessLauncher, RunningProcess, WindowStyle};
pub use os::{OsLauncher, OsProcess};

use chrono::{DateTime, Duration, Utc};
use switchyard_common::{
    KillMode, LaunchError, MiningMode, ProcessPriority, Result, SwitchyardError, TrayMode,
    Workload, WorkloadId,
};
use tracing::{debug, info, instrument, warn};

use crate::notify::ActivityNotifier;

/// The process currently owned by the supervisor
pub struct ActiveRun {
    pub workload: WorkloadId,
    pub mode: MiningMode,
    pub started_at: DateTime<Utc>,
    pub use_window: bool,
    process: Box<dyn RunningProcess>,
}

impl ActiveRun {
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }
}

/// A run that ended, by stop or by death
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedRun {
    pub workload: WorkloadId,
    pub mode: MiningMode,
    pub elapsed: Duration,
}

pub struct ProcessSupervisor {
    launcher: Box<dyn ProcessLauncher>,
    notifier: ActivityNotifier,
    kill_mode: KillMode,
    tray_mode: TrayMode,
    active: Option<ActiveRun>,
}

impl ProcessSupervisor {
    pub fn new(launcher: Box<dyn ProcessLauncher>, notifier: ActivityNotifier) -> Self {
        Self {
            launcher,
            notifier,
            kill_mode: KillMode::default(),
            tray_mode: TrayMode::default(),
            active: None,
        }
    }

    pub fn with_kill_mode(mut self, kill_mode: KillMode) -> Self {
        self.kill_mode = kill_mode;
        self
    }

    pub fn with_tray_mode(mut self, tray_mode: TrayMode) -> Self {
        self.tray_mode = tray_mode;
        self
    }

    pub fn active(&self) -> Option<&ActiveRun> {
        self.active.as_ref()
    }

    pub fn running_id(&self) -> Option<WorkloadId> {
        self.active.as_ref().map(|run| run.workload)
    }

    /// Whether the owned process is still running; false when none is owned
    pub fn is_alive(&mut self) -> bool {
        self.active
            .as_mut()
            .map(|run| run.process.is_alive())
            .unwrap_or(false)
    }

    /// Build the launch spec for a workload, validating folder and command
    pub fn prepare(
        &self,
        workload: &Workload,
        mode: MiningMode,
        minimized_to_tray: bool,
    ) -> std::result::Result<LaunchSpec, LaunchError> {
        let exec = workload.exec(mode);
        if !exec.has_command() {
            return Err(LaunchError::EmptyCommand);
        }

        let working_dir = exec.working_dir();
        if let Some(dir) = &working_dir {
            if !dir.is_dir() {
                return Err(LaunchError::PathNotFound(dir.clone()));
            }
        }
        let program = exec.program();
        if !program.is_file() {
            return Err(LaunchError::CommandNotFound(program));
        }

        let window = workload.use_window.then(|| {
            if minimized_to_tray && self.tray_mode == TrayMode::Hidden {
                WindowStyle::Hidden
            } else {
                WindowStyle::Minimized
            }
        });

        Ok(LaunchSpec {
            program,
            working_dir,
            arguments: split_arguments(&exec.arguments),
            window,
        })
    }

    /// Launch a workload; on any launch failure the workload is marked dead
    #[instrument(skip_all, fields(workload = %workload.id, mode = %mode))]
    pub fn start(
        &mut self,
        workload: &mut Workload,
        mode: MiningMode,
        minimized_to_tray: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(run) = &self.active {
            return Err(SwitchyardError::Supervisor(format!(
                "workload {} is already running",
                run.workload
            )));
        }

        let launched = self
            .prepare(workload, mode, minimized_to_tray)
            .and_then(|spec| {
                self.notifier.console(
                    now,
                    format!(
                        "Starting {} {} with {}",
                        workload.service_name(),
                        workload.name,
                        spec.command_line()
                    ),
                );
                self.launcher.launch(&spec, &self.notifier)
            });

        let mut process = match launched {
            Ok(process) => process,
            Err(e) => {
                workload.dead_since = Some(now);
                self.notifier.console(now, e.to_string());
                return Err(e.into());
            }
        };

        if workload.use_window {
            let title = format!("{} {} Miner", workload.service_name(), workload.name);
            if let Err(e) = process.set_title(&title) {
                warn!("Failed to set window title: {}", e);
            }
            if minimized_to_tray && self.tray_mode == TrayMode::HideAfterStart {
                if let Err(e) = process.hide_window() {
                    warn!("Failed to hide window: {}", e);
                }
            }
        }

        if let Some(priority) = ProcessPriority::from_hint(&workload.priority) {
            if let Err(e) = process.set_priority(priority) {
                warn!(?priority, "Failed to set process priority: {}", e);
            }
        }

        if workload.affinity > 0 {
            if let Err(e) = process.set_affinity(workload.affinity as u64) {
                warn!(affinity = workload.affinity, "Failed to set CPU affinity: {}", e);
            }
        }

        info!(pid = process.pid(), "Process started");
        self.active = Some(ActiveRun {
            workload: workload.id,
            mode,
            started_at: now,
            use_window: workload.use_window,
            process,
        });
        Ok(())
    }

    /// Kill the owned process; no-op when none is owned
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<CompletedRun> {
        let mut run = self.active.take()?;
        if let Err(e) = run.process.terminate(self.kill_mode) {
            warn!(pid = run.pid(), "Failed to terminate process: {}", e);
        }
        info!(workload = %run.workload, "Process stopped");
        Some(CompletedRun {
            workload: run.workload,
            mode: run.mode,
            elapsed: run.elapsed(now),
        })
    }

    /// Release a process that exited on its own
    pub fn reap(&mut self, now: DateTime<Utc>) -> Option<CompletedRun> {
        let mut run = self.active.take()?;
        if let Err(e) = run.process.terminate(KillMode::Process) {
            debug!(pid = run.pid(), "Reap of exited process: {}", e);
        }
        Some(CompletedRun {
            workload: run.workload,
            mode: run.mode,
            elapsed: run.elapsed(now),
        })
    }

    pub fn hide_window(&mut self) {
        if let Some(run) = self.active.as_mut().filter(|run| run.use_window) {
            if let Err(e) = run.process.hide_window() {
                warn!("Failed to hide window: {}", e);
            }
        }
    }

    pub fn minimize_window(&mut self) {
        if let Some(run) = self.active.as_mut().filter(|run| run.use_window) {
            if let Err(e) = run.process.minimize_window() {
                warn!("Failed to minimize window: {}", e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use switchyard_common::{ExecSpec, ServiceId, ServiceKind, ServiceRef};

    fn workload(folder: &str) -> Workload {
        let service = ServiceRef {
            id: ServiceId(0),
            name: "Alpha".to_string(),
            kind: ServiceKind::Manual,
        };
        let mut w = Workload::new(WorkloadId(1), "x11", "X11", service);
        w.normal = ExecSpec::new(folder, "miner", "-a x11 -u \"my worker\"");
        w
    }

    fn supervisor(launcher: &ScriptedLauncher) -> ProcessSupervisor {
        ProcessSupervisor::new(Box::new(launcher.clone()), ActivityNotifier::disabled())
            .with_tray_mode(TrayMode::Hidden)
    }

    #[test]
    fn test_start_and_stop() {
        let dir = command_dir();
        let launcher = ScriptedLauncher::default();
        let mut supervisor = supervisor(&launcher);
        let mut w = workload(dir.path().to_str().unwrap());
        w.priority = "BelowNormal".to_string();
        w.affinity = 3;
        let now = Utc::now();

        supervisor.start(&mut w, MiningMode::Automatic, false, now).unwrap();
        assert_eq!(supervisor.running_id(), Some(WorkloadId(1)));
        assert!(supervisor.is_alive());
        {
            let log = launcher.log.lock();
            assert_eq!(log.launched[0].arguments, vec!["-a", "x11", "-u", "my worker"]);
            assert_eq!(log.launched[0].window, None);
            assert_eq!(log.priorities, vec![ProcessPriority::BelowNormal]);
            assert_eq!(log.affinities, vec![3]);
        }

        let run = supervisor.stop(now + Duration::minutes(7)).unwrap();
        assert_eq!(run.elapsed, Duration::minutes(7));
        assert_eq!(run.mode, MiningMode::Automatic);
        assert!(supervisor.running_id().is_none());
        assert!(!supervisor.is_alive());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let launcher = ScriptedLauncher::default();
        let mut supervisor = supervisor(&launcher);
        assert!(supervisor.stop(Utc::now()).is_none());
        assert!(supervisor.stop(Utc::now()).is_none());
        assert_eq!(launcher.log.lock().terminated, 0);
    }

    #[test]
    fn test_missing_folder_marks_dead() {
        let launcher = ScriptedLauncher::default();
        let mut supervisor = supervisor(&launcher);
        let mut w = workload("/nonexistent/miners");
        let now = Utc::now();

        let err = supervisor
            .start(&mut w, MiningMode::Automatic, false, now)
            .unwrap_err();
        assert!(matches!(
            err,
            SwitchyardError::Launch(LaunchError::PathNotFound(_))
        ));
        assert_eq!(w.dead_since, Some(now));
        assert!(launcher.log.lock().launched.is_empty());
    }

    #[test]
    fn test_missing_command_marks_dead() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = ScriptedLauncher::default();
        let mut supervisor = supervisor(&launcher);
        let mut w = workload(dir.path().to_str().unwrap());
        let now = Utc::now();

        let err = supervisor
            .start(&mut w, MiningMode::Automatic, false, now)
            .unwrap_err();
        assert!(matches!(
            err,
            SwitchyardError::Launch(LaunchError::CommandNotFound(_))
        ));
        assert_eq!(w.dead_since, Some(now));
    }

    #[test]
    fn test_second_start_is_rejected() {
        let dir = command_dir();
        let launcher = ScriptedLauncher::default();
        let mut supervisor = supervisor(&launcher);
        let mut w = workload(dir.path().to_str().unwrap());
        let now = Utc::now();

        supervisor.start(&mut w, MiningMode::Automatic, false, now).unwrap();
        let err = supervisor
            .start(&mut w, MiningMode::Automatic, false, now)
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Supervisor(_)));
        assert!(w.dead_since.is_none());
        assert_eq!(launcher.log.lock().launched.len(), 1);
    }

    #[test]
    fn test_window_hidden_when_minimized_to_tray() {
        let dir = command_dir();
        let launcher = ScriptedLauncher::default();
        let supervisor = supervisor(&launcher);
        let mut w = workload(dir.path().to_str().unwrap());
        w.use_window = true;

        let spec = supervisor.prepare(&w, MiningMode::Automatic, true).unwrap();
        assert_eq!(spec.window, Some(WindowStyle::Hidden));
        let spec = supervisor.prepare(&w, MiningMode::Automatic, false).unwrap();
        assert_eq!(spec.window, Some(WindowStyle::Minimized));
    }

    #[test]
    fn test_donation_without_command() {
        let launcher = ScriptedLauncher::default();
        let supervisor = supervisor(&launcher);
        let w = workload("");
        assert_eq!(
            supervisor.prepare(&w, MiningMode::Donation, false),
            Err(LaunchError::EmptyCommand)
        );
    }
}
