//! Interpreted languages (Python, Lua)

use async_trait::async_trait;

use super::{encode_artifact, LanguageStrategy};
use crate::error::PipelineError;
use crate::runner::Runner;
use crate::task::{Artifact, TaskData};
use crate::workspace::Workspace;

/// Nothing to compile; the sources are the artifacts
#[derive(Debug, Clone)]
pub struct ScriptStrategy {
    pub source_file: String,
}

#[async_trait]
impl LanguageStrategy for ScriptStrategy {
    fn source_file(&self) -> &str {
        &self.source_file
    }

    async fn build(
        &self,
        _workspace: &Workspace,
        _task: &TaskData,
        _runner: &dyn Runner,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    async fn package(
        &self,
        workspace: &Workspace,
        task: &TaskData,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let mut artifacts = vec![encode_artifact(workspace, &self.source_file).await?];
        // Modules are needed again at execution time, as supplied.
        artifacts.extend(
            task.extra
                .iter()
                .filter(|(name, _)| **name != self.source_file)
                .map(|(name, content)| Artifact::new(name.clone(), content.clone())),
        );
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::testing::{task, FakeRunner};

    #[tokio::test]
    async fn test_lua_ships_main_and_modules() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "lua").await.unwrap();
        let code = include_str!("../../test-codes/main.lua");
        let helper = include_str!("../../test-codes/helper.lua");
        let encoded_helper = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            helper,
        );
        let t = task("Lua", code, &[("helper.lua", encoded_helper.as_str())]);
        let strategy = ScriptStrategy {
            source_file: "main.lua".into(),
        };
        let runner = FakeRunner::producing(vec![]);

        strategy.persist(&ws, &t).await.unwrap();
        strategy.build(&ws, &t, &runner).await.unwrap();
        let artifacts = strategy.package(&ws, &t).await.unwrap();

        assert!(runner.calls().is_empty());
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].name, "main.lua");
        assert_eq!(artifacts[1], Artifact::new("helper.lua", encoded_helper.clone()));

        let decode = |s: &str| {
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s).unwrap()
        };
        assert_eq!(decode(&artifacts[0].content), code.as_bytes());
        assert_eq!(decode(&artifacts[1].content), helper.as_bytes());
    }

    #[tokio::test]
    async fn test_python_without_modules() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path(), "py").await.unwrap();
        let t = task("Python", "print(1)\n", &[]);
        let strategy = ScriptStrategy {
            source_file: "main.py".into(),
        };

        strategy.persist(&ws, &t).await.unwrap();
        let artifacts = strategy.package(&ws, &t).await.unwrap();
        assert_eq!(artifacts, vec![Artifact::new("main.py", "cHJpbnQoMSkK")]);
    }
}
