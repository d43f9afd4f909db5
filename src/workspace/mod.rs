//! Workspace-scoped file access
//!
//! Every path handled by the pipeline comes from the repository (config file,
//! CI change lists, configured folders) and must stay inside it. Paths are
//! checked lexically with [`is_local`] and then resolved against the
//! workspace root.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Returns true when `path` is relative, non-empty and never climbs above
/// its starting directory.
pub fn is_local(path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return false;
    }

    let mut depth: usize = 0;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return false,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
        }
    }
    true
}

/// Lexically normalise a relative path: drops `.` components and folds
/// `name/..` pairs. The empty path becomes `.`.
pub fn clean(path: impl AsRef<Path>) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// True when `file` sits directly inside `folder` (no nested directories).
/// Both paths must be local.
pub fn is_direct_child(file: impl AsRef<Path>, folder: impl AsRef<Path>) -> bool {
    let (file, folder) = (file.as_ref(), folder.as_ref());
    if !is_local(file) || !is_local(folder) {
        return false;
    }

    let file = clean(file);
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent == clean(folder),
        // A bare file name lives in the workspace root
        _ => false,
    }
}

/// True when `file` sits anywhere below `folder`.
pub fn is_within(file: impl AsRef<Path>, folder: impl AsRef<Path>) -> bool {
    let (file, folder) = (file.as_ref(), folder.as_ref());
    if !is_local(file) || !is_local(folder) {
        return false;
    }

    let folder = clean(folder);
    let file = clean(file);
    if folder == Path::new(".") {
        return true;
    }
    file != folder && file.starts_with(&folder)
}

/// Handle on the repository checkout all relative paths are resolved against
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a workspace rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace rooted at the process working directory
    pub fn current() -> Result<Self, WorkspaceError> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Root directory of the workspace
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path, rejecting anything non-local
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        let path = path.as_ref();
        if !is_local(path) {
            return Err(WorkspaceError::NonLocal(path.display().to_string()));
        }
        Ok(self.root.join(clean(path)))
    }

    /// Whether a local path exists. Non-local paths never exist.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String, WorkspaceError> {
        let full = self.resolve(&path)?;
        fs::read_to_string(&full).map_err(|e| WorkspaceError::Read {
            path: path.as_ref().display().to_string(),
            source: e,
        })
    }

    /// Write `contents`, truncating any previous file
    pub fn write(&self, path: impl AsRef<Path>, contents: &[u8]) -> Result<(), WorkspaceError> {
        let full = self.resolve(&path)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full)
            .map_err(|e| WorkspaceError::Write {
                path: path.as_ref().display().to_string(),
                source: e,
            })?;
        file.write_all(contents).map_err(|e| WorkspaceError::Write {
            path: path.as_ref().display().to_string(),
            source: e,
        })
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> Result<(), WorkspaceError> {
        let full = self.resolve(&path)?;
        fs::remove_file(&full).map_err(|e| WorkspaceError::Remove {
            path: path.as_ref().display().to_string(),
            source: e,
        })
    }

    /// Create a directory and its parents, mode 0755 on unix
    pub fn create_dir_all(&self, path: impl AsRef<Path>) -> Result<(), WorkspaceError> {
        let full = self.resolve(path)?;
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder.create(full)?;
        Ok(())
    }

    /// Regular files directly inside `folder`, as workspace-relative paths
    /// sorted by name.
    pub fn list_files(&self, folder: impl AsRef<Path>) -> Result<Vec<PathBuf>, WorkspaceError> {
        let folder = folder.as_ref();
        let full = self.resolve(folder)?;
        let entries = fs::read_dir(&full).map_err(|e| WorkspaceError::Read {
            path: folder.display().to_string(),
            source: e,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            files.push(clean(folder).join(entry.file_name()));
        }
        files.sort();
        Ok(files)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Invalid file path: {0} is not local to the workspace")]
    NonLocal(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
