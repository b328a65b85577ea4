//! Task pipeline driver
//!
//! Resolves the language, gives the task a fresh workspace and runs
//! persist -> build -> package, stopping at the first failure. Whatever
//! happens, the workspace is removed and the task comes back with either
//! its artifacts or a classified error.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, info, warn};

use crate::compiler::LanguageStrategy;
use crate::error::{PipelineError, UNKNOWN_ERROR_MESSAGE};
use crate::languages::LanguageRegistry;
use crate::runner::Runner;
use crate::task::{Artifact, TaskData};
use crate::workspace::Workspace;

pub struct Pipeline {
    registry: LanguageRegistry,
    runner: Arc<dyn Runner>,
    workspace_root: PathBuf,
}

impl Pipeline {
    pub fn new(
        registry: LanguageRegistry,
        runner: Arc<dyn Runner>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            runner,
            workspace_root: workspace_root.into(),
        }
    }

    /// Process one task and return it with status and result filled in
    pub async fn execute(&self, mut data: TaskData) -> TaskData {
        info!("Work with task: {}", data.id());

        let outcome = AssertUnwindSafe(self.run(&data)).catch_unwind().await;
        let outcome = outcome.unwrap_or_else(|panic| Err(PipelineError::Unknown(panic_message(panic))));

        match outcome {
            Ok(artifacts) => {
                info!(
                    "Task {} built: {} artifact(s)",
                    data.id(),
                    artifacts.len()
                );
                data.complete(artifacts);
            }
            Err(e) => {
                let status = e.status();
                warn!(
                    "Task {} failed with {} ({}): {}",
                    data.id(),
                    status,
                    status.code(),
                    e.message()
                );
                data.fail(&e);
            }
        }
        data
    }

    async fn run(&self, data: &TaskData) -> Result<Vec<Artifact>, PipelineError> {
        let strategy = self
            .registry
            .resolve(data.language())
            .ok_or_else(|| PipelineError::unsupported_language(data.language()))?;

        let mut workspace = Workspace::create(&self.workspace_root, data.id()).await?;
        let result = self.run_phases(strategy.as_ref(), &workspace, data).await;

        if let Err(e) = workspace.remove().await {
            error!("Task {}: {}", data.id(), e);
        }
        result
    }

    async fn run_phases(
        &self,
        strategy: &dyn LanguageStrategy,
        workspace: &Workspace,
        data: &TaskData,
    ) -> Result<Vec<Artifact>, PipelineError> {
        strategy.persist(workspace, data).await?;
        strategy.build(workspace, data, self.runner.as_ref()).await?;
        strategy.package(workspace, data).await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        UNKNOWN_ERROR_MESSAGE.to_string()
    }
}
