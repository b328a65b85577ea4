//! Language registry
//!
//! Maps a language name (case-insensitive, aliases included) to the
//! strategy that builds it. The table is data: the built-in one is compiled
//! in from `files/languages.toml` and can be replaced by a file at startup.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::compiler::{JvmStrategy, LanguageStrategy, NativeStrategy, ScriptStrategy};

const BUILTIN_LANGUAGES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum StrategyKind {
    Native,
    Jvm,
    Script,
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageConfig {
    kind: StrategyKind,
    source_file: String,
    program: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    trailing_args: Vec<String>,
    #[serde(default)]
    aux_suffixes: Vec<String>,
    #[serde(default)]
    required_files: Vec<String>,
    artifact: Option<String>,
    #[serde(default)]
    aliases: Vec<String>,
}

impl RawLanguageConfig {
    fn into_strategy(self, name: &str) -> anyhow::Result<Arc<dyn LanguageStrategy>> {
        let program = |program: Option<String>| {
            program.with_context(|| format!("Language {} needs a program", name))
        };

        let strategy: Arc<dyn LanguageStrategy> = match self.kind {
            StrategyKind::Native => Arc::new(NativeStrategy {
                source_file: self.source_file,
                program: program(self.program)?,
                args: self.args,
                trailing_args: self.trailing_args,
                aux_suffixes: self.aux_suffixes,
                required_files: self.required_files,
                artifact: self
                    .artifact
                    .with_context(|| format!("Language {} needs an artifact", name))?,
            }),
            StrategyKind::Jvm => Arc::new(JvmStrategy {
                source_file: self.source_file,
                program: program(self.program)?,
                args: self.args,
            }),
            StrategyKind::Script => Arc::new(ScriptStrategy {
                source_file: self.source_file,
            }),
        };
        Ok(strategy)
    }
}

#[derive(Clone)]
pub struct LanguageRegistry {
    strategies: HashMap<String, Arc<dyn LanguageStrategy>>,
}

impl LanguageRegistry {
    /// The table shipped with the worker
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml(BUILTIN_LANGUAGES).context("Invalid built-in language table")
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read language table {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid language table {:?}", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let raw_configs: HashMap<String, RawLanguageConfig> = toml::from_str(content)?;

        let mut strategies = HashMap::new();
        for (name, mut raw) in raw_configs {
            let aliases = std::mem::take(&mut raw.aliases);
            let strategy = raw.into_strategy(&name)?;

            for key in std::iter::once(name).chain(aliases) {
                let key = key.to_lowercase();
                if strategies.insert(key.clone(), strategy.clone()).is_some() {
                    anyhow::bail!("Language {} is defined twice", key);
                }
            }
        }

        Ok(Self { strategies })
    }

    /// Look up the strategy for a task's declared language
    pub fn resolve(&self, language: &str) -> Option<Arc<dyn LanguageStrategy>> {
        self.strategies.get(&language.to_lowercase()).cloned()
    }

    /// All accepted names, aliases included, sorted
    pub fn supported(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }
}
