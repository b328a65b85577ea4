//! Java: compile every source, ship every class file

use async_trait::async_trait;

use super::{run_toolchain, LanguageStrategy};
use crate::error::PipelineError;
use crate::runner::{CommandSpec, Runner};
use crate::task::{Artifact, TaskData};
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct JvmStrategy {
    pub source_file: String,
    pub program: String,
    pub args: Vec<String>,
}

impl JvmStrategy {
    /// `program <args> <every .java file in the workspace>`
    ///
    /// The child is not started through a shell, so the source glob is
    /// expanded here.
    pub async fn command(&self, workspace: &Workspace) -> Result<CommandSpec, PipelineError> {
        let sources = workspace.files_with_extension("java").await?;
        Ok(CommandSpec::new(&self.program, workspace.path())
            .with_args(self.args.iter().cloned().chain(sources)))
    }
}

#[async_trait]
impl LanguageStrategy for JvmStrategy {
    fn source_file(&self) -> &str {
        &self.source_file
    }

    async fn build(
        &self,
        workspace: &Workspace,
        _task: &TaskData,
        runner: &dyn Runner,
    ) -> Result<(), PipelineError> {
        let cmd = self.command(workspace).await?;
        run_toolchain(runner, &cmd).await
    }

    /// One entry per class file; nested and secondary classes produce
    /// several, so the count is whatever javac left behind.
    async fn package(
        &self,
        workspace: &Workspace,
        _task: &TaskData,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let mut artifacts = Vec::new();
        for name in workspace.files_with_extension("class").await? {
            if let Some(content) = workspace.encode_file(&name).await? {
                artifacts.push(Artifact::new(name, content));
            }
        }
        Ok(artifacts)
    }
}
