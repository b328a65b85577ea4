//! Compiler module - Per-language build strategies
//!
//! Every language goes through the same three phases over a task workspace:
//! - persist: write the submission and its auxiliary files
//! - build: run the toolchain (a no-op for scripts)
//! - package: encode whatever the execution stage needs
//!
//! Three implementations cover all languages:
//! - `NativeStrategy`: one toolchain call producing one binary (C, C++, Verilog)
//! - `JvmStrategy`: javac, packaging every produced class file
//! - `ScriptStrategy`: no build, ships the sources themselves

pub mod jvm;
pub mod native;
pub mod script;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PipelineError;
use crate::runner::{CommandSpec, RunOutcome, Runner};
use crate::task::{Artifact, TaskData};
use crate::workspace::Workspace;

pub use jvm::JvmStrategy;
pub use native::NativeStrategy;
pub use script::ScriptStrategy;

#[async_trait]
pub trait LanguageStrategy: Send + Sync {
    /// File name the submission is saved under
    fn source_file(&self) -> &str;

    async fn persist(&self, workspace: &Workspace, task: &TaskData) -> Result<(), PipelineError> {
        persist_sources(workspace, task, self.source_file()).await
    }

    async fn build(
        &self,
        workspace: &Workspace,
        task: &TaskData,
        runner: &dyn Runner,
    ) -> Result<(), PipelineError>;

    async fn package(
        &self,
        workspace: &Workspace,
        task: &TaskData,
    ) -> Result<Vec<Artifact>, PipelineError>;
}

/// Write the auxiliary files, then the submission on top.
///
/// The submission is written last so an auxiliary file can never replace it.
pub async fn persist_sources(
    workspace: &Workspace,
    task: &TaskData,
    source_file: &str,
) -> Result<(), PipelineError> {
    for (name, encoded) in &task.extra {
        workspace.decode_and_write_file(name, encoded).await?;
    }
    workspace
        .write_file(source_file, task.task.answer.code.as_bytes())
        .await?;
    Ok(())
}

/// Run a toolchain command and turn the outcome into a build verdict
pub async fn run_toolchain(runner: &dyn Runner, cmd: &CommandSpec) -> Result<(), PipelineError> {
    debug!("Compiling with {:?}", cmd.to_vec());
    let outcome = runner.run(cmd).await?;
    classify_build(outcome)
}

/// Only a clean exit with no diagnostics counts as a successful build
pub fn classify_build(outcome: RunOutcome) -> Result<(), PipelineError> {
    if !outcome.stderr.is_empty() {
        return Err(PipelineError::Compile(outcome.stderr));
    }
    if !outcome.is_success() {
        return Err(PipelineError::Compile(format!(
            "Compilation failed with {}",
            outcome.exit
        )));
    }
    Ok(())
}

/// Encode one expected artifact, failing if the toolchain did not leave it
pub async fn encode_artifact(workspace: &Workspace, name: &str) -> Result<Artifact, PipelineError> {
    match workspace.encode_file(name).await? {
        Some(content) => Ok(Artifact::new(name, content)),
        None => Err(PipelineError::artifact_missing(name)),
    }
}

/// Auxiliary file names whose extension is one of `suffixes`
pub fn matching_aux_files<'a>(
    task: &'a TaskData,
    suffixes: &'a [String],
) -> impl Iterator<Item = &'a String> + 'a {
    task.extra.keys().filter(move |name| {
        name.rsplit_once('.')
            .is_some_and(|(_, ext)| suffixes.iter().any(|s| s == ext))
    })
}


#[cfg(test)]
mod tests {
    use super::testing::task;
    use super::*;
    use crate::runner::ExitState;

    fn outcome(exit: ExitState, stderr: &str) -> RunOutcome {
        RunOutcome {
            exit,
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_clean_build_succeeds() {
        assert!(classify_build(outcome(ExitState::Exited(0), "")).is_ok());
    }

    #[test]
    fn test_diagnostics_are_compile_errors_verbatim() {
        let text = "main.c:1:1: error: expected ';'\n";
        for exit in [ExitState::Exited(0), ExitState::Exited(1)] {
            match classify_build(outcome(exit, text)) {
                Err(PipelineError::Compile(msg)) => assert_eq!(msg, text),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_silent_failure_gets_generic_message() {
        match classify_build(outcome(ExitState::Exited(4), "")) {
            Err(PipelineError::Compile(msg)) => {
                assert_eq!(msg, "Compilation failed with exit code 4")
            }
            other => panic!("unexpected {:?}", other),
        }
        match classify_build(outcome(ExitState::Signaled(11), "")) {
            Err(PipelineError::Compile(msg)) => assert!(msg.contains("SIGSEGV")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_matching_aux_files() {
        let t = task(
            "C",
            "",
            &[("a.c", ""), ("b.h", ""), ("c.cpp", ""), ("noext", "")],
        );
        let suffixes = vec!["c".to_string()];
        let names: Vec<_> = matching_aux_files(&t, &suffixes).collect();
        assert_eq!(names, vec!["a.c"]);
    }

    #[tokio::test]
    async fn test_persist_writes_source_over_aux() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "p").await.unwrap();
        // "bWFsaWNpb3Vz" is "malicious"
        let t = task("C", "int main(){}", &[("main.c", "bWFsaWNpb3Vz"), ("x.c", "")]);

        persist_sources(&ws, &t, "main.c").await.unwrap();

        let source = std::fs::read_to_string(ws.path().join("main.c")).unwrap();
        assert_eq!(source, "int main(){}");
        assert!(ws.path().join("x.c").is_file());
    }
}
