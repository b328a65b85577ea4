//! Error types for the compile pipeline
//!
//! Workspace and process failures are specific to their layer; the pipeline
//! folds all of them into the three outcomes reported back to the judge.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::task::TaskStatus;

/// Message used when a failure carries no text at all
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Directory already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),
    #[error("Cannot decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        WorkspaceError::Io {
            context: context.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} did not finish within {}s", .limit.as_secs())]
    Timeout { program: String, limit: Duration },
}

/// Outcome classes of a failed task
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The toolchain ran and rejected the submission
    #[error("{0}")]
    Compile(String),
    /// Infrastructure failure around the build
    #[error("{0}")]
    Run(String),
    #[error("{0}")]
    Unknown(String),
}

impl PipelineError {
    pub fn status(&self) -> TaskStatus {
        match self {
            PipelineError::Compile(_) => TaskStatus::CompileError,
            PipelineError::Run(_) => TaskStatus::RuntimeError,
            PipelineError::Unknown(_) => TaskStatus::UnknownError,
        }
    }

    /// Text placed in the result payload, never empty
    pub fn message(&self) -> String {
        let msg = match self {
            PipelineError::Compile(msg) | PipelineError::Run(msg) | PipelineError::Unknown(msg) => {
                msg
            }
        };
        if msg.is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            msg.clone()
        }
    }

    pub fn unsupported_language(language: &str) -> Self {
        PipelineError::Run(format!("Unsupported language: {}", language))
    }

    pub fn artifact_missing(name: &str) -> Self {
        PipelineError::Run(format!("File not exists: {}", name))
    }
}

impl From<WorkspaceError> for PipelineError {
    fn from(err: WorkspaceError) -> Self {
        match err {
            // The payload itself is malformed, not the machine.
            WorkspaceError::Decode { .. } => PipelineError::Unknown(err.to_string()),
            _ => PipelineError::Run(err.to_string()),
        }
    }
}

impl From<ProcessError> for PipelineError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { .. } => {
                PipelineError::Compile("Compilation timed out".to_string())
            }
            _ => PipelineError::Run(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PipelineError::Compile("x".into()).status(),
            TaskStatus::CompileError
        );
        assert_eq!(PipelineError::Run("x".into()).status(), TaskStatus::RuntimeError);
        assert_eq!(
            PipelineError::Unknown("x".into()).status(),
            TaskStatus::UnknownError
        );
    }

    #[test]
    fn test_empty_message_gets_placeholder() {
        assert_eq!(
            PipelineError::Unknown(String::new()).message(),
            UNKNOWN_ERROR_MESSAGE
        );
        assert_eq!(PipelineError::Compile("bad".into()).message(), "bad");
    }

    #[test]
    fn test_workspace_errors_classify() {
        let exists = WorkspaceError::AlreadyExists(PathBuf::from("/tmp/judge/a"));
        assert!(matches!(PipelineError::from(exists), PipelineError::Run(_)));

        let decode = WorkspaceError::Decode {
            name: "a.c".into(),
            source: base64::DecodeError::InvalidLength(3),
        };
        assert!(matches!(PipelineError::from(decode), PipelineError::Unknown(_)));
    }

    #[test]
    fn test_process_errors_classify() {
        let spawn = ProcessError::Spawn {
            program: "gcc".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
        };
        let err = PipelineError::from(spawn);
        assert!(matches!(err, PipelineError::Run(_)));
        assert!(err.message().contains("gcc"));

        let timeout = ProcessError::Timeout {
            program: "gcc".into(),
            limit: Duration::from_secs(30),
        };
        assert_eq!(
            PipelineError::from(timeout).message(),
            "Compilation timed out"
        );
    }
}
