//! Per-task working directory
//!
//! Every task gets `<root>/<task id>` for the duration of its pipeline run.
//! The directory is created exclusively and removed recursively when the
//! run ends; dropping a workspace that was never removed cleans up as well,
//! so an unwinding pipeline still leaves nothing behind.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose;
use base64::Engine;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::WorkspaceError;

#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Create the workspace for `task_id` under `root`.
    ///
    /// Fails with `AlreadyExists` if another run owns the directory.
    pub async fn create(root: &Path, task_id: &str) -> Result<Self, WorkspaceError> {
        let name = safe_relative_path(task_id)?;
        if name.components().count() != 1 {
            return Err(WorkspaceError::InvalidName(task_id.to_string()));
        }

        fs::create_dir_all(root)
            .await
            .map_err(|e| WorkspaceError::io(format!("Cannot create {}", root.display()), e))?;

        let dir = root.join(name);
        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::AlreadyExists(dir));
            }
            Err(e) => {
                return Err(WorkspaceError::io("Cannot create directory", e));
            }
        }

        debug!("Created workspace {:?}", dir);
        Ok(Self {
            dir,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Resolve a task-supplied file name inside the workspace
    pub fn resolve(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        Ok(self.dir.join(safe_relative_path(name)?))
    }

    pub async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| WorkspaceError::io(format!("Cannot create directory for {}", name), e))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| WorkspaceError::io(format!("Cannot open {} for writing", name), e))
    }

    /// Decode base64 `encoded` and write it as `name`
    pub async fn decode_and_write_file(
        &self,
        name: &str,
        encoded: &str,
    ) -> Result<(), WorkspaceError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|source| WorkspaceError::Decode {
                name: name.to_string(),
                source,
            })?;
        self.write_file(name, &bytes).await
    }

    /// Read `name` and return it base64 encoded, `None` if it is absent
    pub async fn encode_file(&self, name: &str) -> Result<Option<String>, WorkspaceError> {
        let path = self.resolve(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(general_purpose::STANDARD.encode(bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(WorkspaceError::io(format!("Cannot read {}", name), e)),
        }
    }

    /// Names of the regular files directly inside the workspace with the
    /// given extension (without dot), sorted
    pub async fn files_with_extension(&self, extension: &str) -> Result<Vec<String>, WorkspaceError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| WorkspaceError::io("Cannot list workspace", e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WorkspaceError::io("Cannot list workspace", e))?
        {
            let path = entry.path();
            let is_file = match entry.file_type().await {
                Ok(file_type) => file_type.is_file(),
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => {
                    return Err(WorkspaceError::io(
                        format!("Cannot stat {}", path.display()),
                        e,
                    ))
                }
            };
            if is_file && path.extension().is_some_and(|ext| ext == extension) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Recursively delete the workspace. Calling it again is a no-op.
    pub async fn remove(&mut self) -> Result<(), WorkspaceError> {
        if self.removed {
            return Ok(());
        }
        self.removed = true;
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!("Removed workspace {:?}", self.dir);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WorkspaceError::io(
                format!("Cannot remove {}", self.dir.display()),
                e,
            )),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove workspace {:?}: {}", self.dir, e);
            }
        }
    }
}

/// Accept only plain relative paths: no root, no `..`, no `.`, not empty
fn safe_relative_path(name: &str) -> Result<PathBuf, WorkspaceError> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return Err(WorkspaceError::InvalidName(name.to_string())),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(WorkspaceError::InvalidName(name.to_string()));
    }
    Ok(out)
}
