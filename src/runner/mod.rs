//! Runner module - Toolchain invocation layer
//!
//! This module provides a uniform way of running a toolchain command:
//! - `ProcessRunner`: spawns the command directly as a child process
//!
//! The runner module does NOT:
//! - Decide whether diagnostics mean a compile error
//! - Know about languages or artifacts

pub mod process;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ProcessError;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory of the child
    pub work_dir: PathBuf,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, work_dir: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.as_ref().to_path_buf(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.clone());
        v
    }
}

/// How the child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Killed by signal
    Signaled(i32),
}

impl ExitState {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitState::Exited(0))
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitState::Exited(code) => write!(f, "exit code {}", code),
            ExitState::Signaled(sig) => match nix::sys::signal::Signal::try_from(*sig) {
                Ok(signal) => write!(f, "signal {}", signal),
                Err(_) => write!(f, "signal {}", sig),
            },
        }
    }
}

/// Outcome of running a toolchain
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit: ExitState,
    /// Everything the child wrote to stderr
    pub stderr: String,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.exit.is_success()
    }
}

/// Runner trait for executing toolchains
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command to completion, capturing its stderr
    async fn run(&self, cmd: &CommandSpec) -> Result<RunOutcome, ProcessError>;
}

pub use process::ProcessRunner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_to_vec() {
        let cmd = CommandSpec::new("gcc", "/tmp")
            .with_args(["-o", "main", "main.c"]);
        assert_eq!(cmd.to_vec(), vec!["gcc", "-o", "main", "main.c"]);
        assert_eq!(cmd.work_dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_exit_state_display() {
        assert_eq!(ExitState::Exited(1).to_string(), "exit code 1");
        assert_eq!(ExitState::Signaled(9).to_string(), "signal SIGKILL");
        assert!(ExitState::Exited(0).is_success());
        assert!(!ExitState::Signaled(11).is_success());
    }
}
