//! Task documents exchanged with the queue
//!
//! A task arrives as a JSON document, is mutated in place by the pipeline
//! (status and result) and is pushed back. Fields this worker does not
//! understand are carried through untouched so downstream stages still
//! see them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// Status of a task in the judge pipeline
///
/// Only `CE`, `RE` and `UKE` are written by the compile worker; the rest
/// belong to the execution stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "COMPILING")]
    Compiling,
    #[serde(rename = "EXECUTING")]
    Executing,
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "UKE")]
    UnknownError,
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "MLE")]
    MemoryLimitExceeded,
    #[serde(rename = "OLE")]
    OutputLimitExceeded,
}

impl TaskStatus {
    /// Numeric code shared with the rest of the judge
    pub fn code(&self) -> i32 {
        match self {
            TaskStatus::Compiling => 2,
            TaskStatus::Executing => 1,
            TaskStatus::Accepted => 0,
            TaskStatus::WrongAnswer => -1,
            TaskStatus::UnknownError => -2,
            TaskStatus::RuntimeError => -3,
            TaskStatus::CompileError => -4,
            TaskStatus::TimeLimitExceeded => -5,
            TaskStatus::MemoryLimitExceeded => -6,
            TaskStatus::OutputLimitExceeded => -7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        let status = match code {
            2 => TaskStatus::Compiling,
            1 => TaskStatus::Executing,
            0 => TaskStatus::Accepted,
            -1 => TaskStatus::WrongAnswer,
            -2 => TaskStatus::UnknownError,
            -3 => TaskStatus::RuntimeError,
            -4 => TaskStatus::CompileError,
            -5 => TaskStatus::TimeLimitExceeded,
            -6 => TaskStatus::MemoryLimitExceeded,
            -7 => TaskStatus::OutputLimitExceeded,
            _ => return None,
        };
        Some(status)
    }

    /// Read a status written by another stage, either by name or by code
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().and_then(Self::from_code),
            Value::String(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Compiling => "COMPILING",
            TaskStatus::Executing => "EXECUTING",
            TaskStatus::Accepted => "AC",
            TaskStatus::WrongAnswer => "WA",
            TaskStatus::UnknownError => "UKE",
            TaskStatus::RuntimeError => "RE",
            TaskStatus::CompileError => "CE",
            TaskStatus::TimeLimitExceeded => "TLE",
            TaskStatus::MemoryLimitExceeded => "MLE",
            TaskStatus::OutputLimitExceeded => "OLE",
        };
        write!(f, "{}", s)
    }
}

/// One encoded output file, serialized as `{"<name>": "<base64>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, String>",
    into = "BTreeMap<String, String>"
)]
pub struct Artifact {
    pub name: String,
    /// Base64 encoded file content
    pub content: String,
}

impl Artifact {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for Artifact {
    type Error = String;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(format!(
                "artifact entry must have exactly one file, found {}",
                map.len()
            ));
        }
        let (name, content) = map.into_iter().next().ok_or("empty artifact entry")?;
        Ok(Self { name, content })
    }
}

impl From<Artifact> for BTreeMap<String, String> {
    fn from(artifact: Artifact) -> Self {
        BTreeMap::from([(artifact.name, artifact.content)])
    }
}

/// Payload of a processed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResult {
    /// Build succeeded: the encoded artifacts
    Artifacts(Vec<Artifact>),
    /// Build failed: a single diagnostic message
    Message { msg: String },
    /// Whatever another stage left in the slot; never written here
    Other(Value),
}

/// The submitted program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub language: String,
    pub code: String,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub answer: Answer,
    /// Kept as received until this worker records a failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// A full queue message: the task plus its auxiliary files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskData {
    pub task: Task,
    /// Auxiliary files, file name -> base64 content
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl TaskData {
    pub fn id(&self) -> &str {
        &self.task.id
    }

    pub fn language(&self) -> &str {
        &self.task.answer.language
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.task.status.as_ref().and_then(TaskStatus::from_value)
    }

    /// Store the artifacts of a successful build, replacing any prior payload
    pub fn complete(&mut self, artifacts: Vec<Artifact>) {
        self.task.result = Some(TaskResult::Artifacts(artifacts));
    }

    /// Record a failure; the payload becomes the diagnostic message alone
    pub fn fail(&mut self, error: &PipelineError) {
        self.task.status = Some(Value::String(error.status().to_string()));
        self.task.result = Some(TaskResult::Message {
            msg: error.message(),
        });
    }
}
