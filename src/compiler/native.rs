//! Single-binary toolchains (C, C++, Verilog)

use async_trait::async_trait;

use super::{encode_artifact, matching_aux_files, persist_sources, run_toolchain, LanguageStrategy};
use crate::error::PipelineError;
use crate::runner::{CommandSpec, Runner};
use crate::task::{Artifact, TaskData};
use crate::workspace::Workspace;

/// A toolchain invoked as
/// `program <args> <matching aux files> <trailing_args>`
/// that leaves exactly one `artifact` in the workspace.
#[derive(Debug, Clone)]
pub struct NativeStrategy {
    pub source_file: String,
    pub program: String,
    pub args: Vec<String>,
    pub trailing_args: Vec<String>,
    /// Extensions of auxiliary files passed to the toolchain
    pub aux_suffixes: Vec<String>,
    /// Auxiliary files the task must supply
    pub required_files: Vec<String>,
    pub artifact: String,
}

impl NativeStrategy {
    pub fn command(&self, workspace: &Workspace, task: &TaskData) -> CommandSpec {
        let aux = matching_aux_files(task, &self.aux_suffixes)
            .filter(|name| **name != self.source_file && !self.args.contains(name))
            .cloned();

        CommandSpec::new(&self.program, workspace.path()).with_args(
            self.args
                .iter()
                .cloned()
                .chain(aux)
                .chain(self.trailing_args.iter().cloned()),
        )
    }
}

#[async_trait]
impl LanguageStrategy for NativeStrategy {
    fn source_file(&self) -> &str {
        &self.source_file
    }

    async fn persist(&self, workspace: &Workspace, task: &TaskData) -> Result<(), PipelineError> {
        if let Some(missing) = self
            .required_files
            .iter()
            .find(|name| !task.extra.contains_key(*name))
        {
            return Err(PipelineError::Run(format!(
                "Missing required file: {}",
                missing
            )));
        }
        persist_sources(workspace, task, &self.source_file).await
    }

    async fn build(
        &self,
        workspace: &Workspace,
        task: &TaskData,
        runner: &dyn Runner,
    ) -> Result<(), PipelineError> {
        run_toolchain(runner, &self.command(workspace, task)).await
    }

    async fn package(
        &self,
        workspace: &Workspace,
        _task: &TaskData,
    ) -> Result<Vec<Artifact>, PipelineError> {
        Ok(vec![encode_artifact(workspace, &self.artifact).await?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::testing::{task, FakeRunner, Script};
    use crate::runner::ExitState;

    fn c_strategy() -> NativeStrategy {
        NativeStrategy {
            source_file: "main.c".into(),
            program: "gcc".into(),
            args: vec!["-o".into(), "main".into(), "main.c".into()],
            trailing_args: vec!["-std=c11".into(), "-lm".into()],
            aux_suffixes: vec!["c".into()],
            required_files: vec![],
            artifact: "main".into(),
        }
    }

    fn verilog_strategy() -> NativeStrategy {
        NativeStrategy {
            source_file: "main.v".into(),
            program: "iverilog".into(),
            args: vec![
                "-o".into(),
                "main".into(),
                "main.v".into(),
                "tb_main.v".into(),
            ],
            trailing_args: vec![],
            aux_suffixes: vec![],
            required_files: vec!["tb_main.v".into()],
            artifact: "main".into(),
        }
    }

    #[tokio::test]
    async fn test_c_command_line() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "c").await.unwrap();
        let t = task("C", "", &[("util.c", ""), ("util.h", ""), ("main.c", "")]);

        let cmd = c_strategy().command(&ws, &t);
        assert_eq!(
            cmd.to_vec(),
            vec!["gcc", "-o", "main", "main.c", "util.c", "-std=c11", "-lm"]
        );
        assert_eq!(cmd.work_dir, ws.path());
    }

    #[tokio::test]
    async fn test_build_and_package_binary() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "c").await.unwrap();
        let t = task("C", "int main(){return 0;}", &[]);
        let strategy = c_strategy();
        let runner = FakeRunner::producing(vec![("main", &b"\x7fELF"[..])]);

        strategy.persist(&ws, &t).await.unwrap();
        assert!(ws.path().join("main.c").is_file());
        strategy.build(&ws, &t, &runner).await.unwrap();
        let artifacts = strategy.package(&ws, &t).await.unwrap();

        assert_eq!(artifacts, vec![Artifact::new("main", "f0VMRg==")]);
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_silent_toolchain_leaves_no_artifact() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "c").await.unwrap();
        let t = task("C", "", &[]);
        let strategy = c_strategy();

        strategy
            .build(&ws, &t, &FakeRunner::producing(vec![]))
            .await
            .unwrap();
        let err = strategy.package(&ws, &t).await.unwrap_err();
        assert!(matches!(err, PipelineError::Run(_)));
    }

    #[tokio::test]
    async fn test_compile_error_and_spawn_failure() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "c").await.unwrap();
        let t = task("C", "int main({", &[]);
        let strategy = c_strategy();

        let runner = FakeRunner::failing(ExitState::Exited(1), "main.c:1:10: error");
        match strategy.build(&ws, &t, &runner).await {
            Err(PipelineError::Compile(msg)) => assert_eq!(msg, "main.c:1:10: error"),
            other => panic!("unexpected {:?}", other),
        }

        let runner = FakeRunner::new(Script::SpawnFailure);
        let err = strategy.build(&ws, &t, &runner).await.unwrap_err();
        assert!(matches!(err, PipelineError::Run(_)));
    }

    #[tokio::test]
    async fn test_verilog_requires_testbench() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "v").await.unwrap();
        let strategy = verilog_strategy();

        let without = task("Verilog", "module m; endmodule", &[]);
        let err = strategy.persist(&ws, &without).await.unwrap_err();
        assert!(err.message().contains("tb_main.v"));

        let with = task("Verilog", "module m; endmodule", &[("tb_main.v", "")]);
        strategy.persist(&ws, &with).await.unwrap();
        assert_eq!(
            strategy.command(&ws, &with).to_vec(),
            vec!["iverilog", "-o", "main", "main.v", "tb_main.v"]
        );
    }
}
