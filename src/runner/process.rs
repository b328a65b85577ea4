//! Process runner implementation
//!
//! Spawns a toolchain as a plain child process. Only stderr is captured;
//! stdin and stdout are detached. Stderr is drained while the child runs,
//! so a chatty compiler never blocks on a full pipe.

use async_trait::async_trait;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::{CommandSpec, ExitState, RunOutcome, Runner};
use crate::error::ProcessError;

/// Runner that executes toolchains directly
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Upper bound on a single run, `None` waits forever
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub async fn execute(&self, cmd: &CommandSpec) -> Result<RunOutcome, ProcessError> {
        debug!("Running {:?} in {:?}", cmd.to_vec(), cmd.work_dir);

        let child = Command::new(&cmd.program)
            .args(&cmd.args)
            .current_dir(&cmd.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: cmd.program.clone(),
                source,
            })?;

        // wait_with_output reads stderr to EOF concurrently with waiting, and
        // owns the pipe so it is closed exactly once on every path.
        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ProcessError::Timeout {
                    program: cmd.program.clone(),
                    limit,
                })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|source| ProcessError::Wait {
            program: cmd.program.clone(),
            source,
        })?;

        let exit = match (output.status.code(), output.status.signal()) {
            (Some(code), _) => ExitState::Exited(code),
            (None, Some(sig)) => ExitState::Signaled(sig),
            (None, None) => ExitState::Exited(-1),
        };

        Ok(RunOutcome {
            exit,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, cmd: &CommandSpec) -> Result<RunOutcome, ProcessError> {
        self.execute(cmd).await
    }
}
