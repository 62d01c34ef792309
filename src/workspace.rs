//! Job-scoped staging directories.
//!
//! A [`Workspace`] owns a temporary directory tree for the lifetime of one
//! job: extracted frames at the root, upscaled frames in `upscaled/`, and
//! (for video) the extracted audio track. The tree is removed when the guard
//! is dropped, so every exit path of a job cleans up after itself.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use crate::error::BatchScaleError;

/// Name of the subdirectory holding upscaled frames.
pub const UPSCALED_DIRECTORY: &str = "upscaled";

/// File written into every workspace. A directory without it is never deleted.
pub const MARKER_FILE: &str = ".batchscale-workspace";

/// RAII guard over a job's staging directory.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    upscaled: PathBuf,
    directory: Option<TempDir>,
    released: bool,
}

impl Workspace {
    /// Create a workspace with a fresh, unique name under `parent`.
    ///
    /// The directory name starts with `prefix`. Two jobs never receive the
    /// same directory, even when their sources share a name.
    ///
    /// # Errors
    ///
    /// Returns [`BatchScaleError::Workspace`] if `parent` or the workspace
    /// cannot be created.
    pub fn create_in(parent: &Path, prefix: &str) -> Result<Self, BatchScaleError> {
        fs::create_dir_all(parent).map_err(|error| BatchScaleError::Workspace {
            path: parent.to_path_buf(),
            reason: error.to_string(),
        })?;
        let prefix = format!("{prefix}-");
        let directory = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)
            .map_err(|error| BatchScaleError::Workspace {
                path: parent.to_path_buf(),
                reason: error.to_string(),
            })?;

        let root = directory.path().to_path_buf();
        let upscaled = prepare(&root)?;
        log::debug!("Acquired workspace {}", root.display());

        Ok(Self {
            root,
            upscaled,
            directory: Some(directory),
            released: false,
        })
    }

    /// Create a workspace at exactly `root`.
    ///
    /// A workspace left at `root` by an earlier failed run is deleted first.
    /// Anything else already there is left alone and the call fails.
    ///
    /// # Errors
    ///
    /// Returns [`BatchScaleError::Workspace`] if `root` is a filesystem root
    /// or `.`, if it exists without the [`MARKER_FILE`], or if the
    /// directories cannot be created.
    pub fn acquire(root: impl Into<PathBuf>) -> Result<Self, BatchScaleError> {
        let root = root.into();
        if is_protected(&root) {
            return Err(BatchScaleError::Workspace {
                path: root,
                reason: "refusing to use a filesystem root or the current directory".to_string(),
            });
        }

        if root.exists() {
            if !root.join(MARKER_FILE).is_file() {
                return Err(BatchScaleError::Workspace {
                    path: root,
                    reason: "exists and is not a batchscale workspace".to_string(),
                });
            }
            log::debug!("Removing stale workspace {}", root.display());
            fs::remove_dir_all(&root).map_err(|error| BatchScaleError::Workspace {
                path: root.clone(),
                reason: format!("failed to remove stale workspace: {error}"),
            })?;
        }

        let upscaled = prepare(&root)?;
        log::debug!("Acquired workspace {}", root.display());

        Ok(Self {
            root,
            upscaled,
            directory: None,
            released: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory receiving upscaled frames.
    pub fn upscaled(&self) -> &Path {
        &self.upscaled
    }

    /// Path of the extracted audio track with the given extension.
    pub fn audio_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("audio.{extension}"))
    }

    /// Path for an intermediate file at the workspace root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Remove the workspace now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match self.directory.take() {
            Some(directory) => {
                if let Err(error) = directory.close() {
                    log::warn!("Failed to remove {}: {error}", self.root.display());
                }
            }
            None => {
                remove_directory(&self.root);
            }
        }
        log::debug!("Released workspace {}", self.root.display());
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Create the `upscaled/` subdirectory and the marker inside `root`.
fn prepare(root: &Path) -> Result<PathBuf, BatchScaleError> {
    let upscaled = root.join(UPSCALED_DIRECTORY);
    fs::create_dir_all(&upscaled)
        .and_then(|()| fs::write(root.join(MARKER_FILE), b""))
        .map_err(|error| BatchScaleError::Workspace {
            path: root.to_path_buf(),
            reason: error.to_string(),
        })?;
    Ok(upscaled)
}

/// Recursively delete `path`.
///
/// Refuses (and returns `false`) when `path` is a filesystem root or `.`.
/// Failures are logged and swallowed; a missing directory counts as removed.
pub fn remove_directory(path: &Path) -> bool {
    if is_protected(path) {
        log::warn!("Refusing to remove protected path {}", path.display());
        return false;
    }
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(error) if error.kind() == ErrorKind::NotFound => true,
        Err(error) => {
            log::warn!("Failed to remove {}: {error}", path.display());
            false
        }
    }
}

/// Whether `path` resolves to a filesystem root or the current directory.
fn is_protected(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return true;
    }
    let meaningful = path
        .components()
        .any(|component| matches!(component, Component::Normal(_) | Component::ParentDir));
    if !meaningful {
        return true;
    }
    match path.canonicalize() {
        Ok(resolved) => {
            resolved.parent().is_none()
                || std::env::current_dir().is_ok_and(|current| current == resolved)
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_and_dot_are_protected() {
        assert!(is_protected(Path::new("/")));
        assert!(is_protected(Path::new(".")));
        assert!(is_protected(Path::new("./")));
        assert!(is_protected(Path::new("")));
        assert!(!is_protected(Path::new("/tmp/batchscale-test-missing")));
    }

    #[test]
    fn remove_directory_refuses_root() {
        assert!(!remove_directory(Path::new("/")));
        assert!(Path::new("/").exists());
    }

    #[test]
    fn workspace_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("job");
        {
            let workspace = Workspace::acquire(&root).unwrap();
            assert!(workspace.upscaled().is_dir());
            fs::write(workspace.file("frame.png"), b"x").unwrap();
        }
        assert!(!root.exists());
    }

    #[test]
    fn stale_workspace_is_replaced() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("job");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(MARKER_FILE), b"").unwrap();
        fs::write(root.join("leftover.png"), b"x").unwrap();

        let workspace = Workspace::acquire(&root).unwrap();
        assert!(!root.join("leftover.png").exists());
        workspace.release();
        assert!(!root.exists());
    }

    #[test]
    fn acquire_rejects_protected_root() {
        assert!(matches!(
            Workspace::acquire("/"),
            Err(BatchScaleError::Workspace { .. })
        ));
    }

    #[test]
    fn unmarked_directory_is_left_alone() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("Documents");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("thesis.txt"), b"draft").unwrap();

        assert!(matches!(
            Workspace::acquire(&root),
            Err(BatchScaleError::Workspace { .. })
        ));
        assert_eq!(fs::read(root.join("thesis.txt")).unwrap(), b"draft");
    }

    #[test]
    fn workspaces_with_the_same_prefix_are_distinct() {
        let parent = tempfile::tempdir().unwrap();
        let first = Workspace::create_in(parent.path(), "clip").unwrap();
        let second = Workspace::create_in(parent.path(), "clip").unwrap();

        assert_ne!(first.root(), second.root());
        assert!(first.root().join(MARKER_FILE).is_file());
        assert!(first.upscaled().is_dir());
        let name = first.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("clip-"), "{name}");

        let root = first.root().to_path_buf();
        first.release();
        assert!(!root.exists());
        assert!(second.root().is_dir());
    }
}
