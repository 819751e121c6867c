//! Launch abstraction
//!
//! The supervisor talks to processes only through [`ProcessLauncher`] and
//! [`RunningProcess`], so scenarios can substitute scripted processes.

use std::io;
use std::path::PathBuf;

use switchyard_common::{KillMode, LaunchError, ProcessPriority};

use crate::notify::ActivityNotifier;

/// How a windowed process is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStyle {
    Minimized,
    Hidden,
}

/// Everything needed to spawn one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub arguments: Vec<String>,
    /// `None` captures output into the notifier instead of showing a window
    pub window: Option<WindowStyle>,
}

impl LaunchSpec {
    /// Program and arguments as one display line
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for argument in &self.arguments {
            line.push(' ');
            line.push_str(argument);
        }
        line
    }
}

/// Spawns supervised processes
pub trait ProcessLauncher: Send {
    fn launch(
        &mut self,
        spec: &LaunchSpec,
        output: &ActivityNotifier,
    ) -> Result<Box<dyn RunningProcess>, LaunchError>;
}

/// Handle to a spawned process
pub trait RunningProcess: Send {
    fn pid(&self) -> u32;

    /// Non-blocking liveness probe
    fn is_alive(&mut self) -> bool;

    /// Kill and reap; killing an exited process is not an error
    fn terminate(&mut self, mode: KillMode) -> io::Result<()>;

    fn set_priority(&mut self, priority: ProcessPriority) -> io::Result<()>;

    /// Bit `n` of `mask` allows CPU `n`
    fn set_affinity(&mut self, mask: u64) -> io::Result<()>;

    fn set_title(&mut self, _title: &str) -> io::Result<()> {
        Err(unsupported("window titles"))
    }

    fn hide_window(&mut self) -> io::Result<()> {
        Err(unsupported("hiding windows"))
    }

    fn minimize_window(&mut self) -> io::Result<()> {
        Err(unsupported("minimizing windows"))
    }
}

pub(crate) fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} not supported on this platform", what),
    )
}

/// Split an argument string on whitespace, keeping double-quoted runs
/// together and dropping the quotes
pub fn split_arguments(arguments: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut pending = false;

    for c in arguments.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                pending = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if pending {
                    result.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        result.push(current);
    }
    result
}
