//! Document handles and scoped temporary workspaces.
//!
//! A [`DocumentHandle`] is an opaque reference to PDF bytes on disk. The
//! engine distinguishes two origins:
//!
//! * **Caller** — a path supplied by the caller. Immutable from the engine's
//!   point of view; the engine never deletes caller input.
//! * **Scratch** — a file the engine produced inside a [`Workspace`]. The
//!   handle keeps the workspace's `TempDir` alive via `Arc`, so the backing
//!   file survives exactly as long as some handle references it and is
//!   removed when the last one drops — on success, failure, and panic alike.
//!
//! This drop-based ownership is the whole resource-lifecycle story: there is
//! no cleanup registry to forget to run. An operation that wants to keep its
//! output promotes the handle to a caller-owned path with
//! [`DocumentHandle::persist`].

use crate::error::EngineError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

/// Where a handle's backing file came from, and therefore who cleans it up.
#[derive(Clone)]
enum Origin {
    /// Caller-supplied input; never deleted by the engine.
    Caller,
    /// Engine-produced file inside a workspace. The `Arc<TempDir>` keeps the
    /// directory (and the file) alive until the last referencing handle drops.
    Scratch(Arc<TempDir>),
}

/// Opaque reference to a PDF's bytes on durable or temporary storage.
#[derive(Clone)]
pub struct DocumentHandle {
    path: PathBuf,
    origin: Origin,
}

impl std::fmt::Debug for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("path", &self.path)
            .field(
                "origin",
                match self.origin {
                    Origin::Caller => &"caller",
                    Origin::Scratch(_) => &"scratch",
                },
            )
            .finish()
    }
}

impl DocumentHandle {
    /// Wrap a caller-supplied path, validating existence, readability, and
    /// the `%PDF` magic bytes so backends get a meaningful error up front
    /// rather than a parser crash.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(EngineError::FileNotFound { path });
        }

        match std::fs::File::open(&path) {
            Ok(mut f) => {
                use std::io::Read;
                let mut magic = [0u8; 4];
                if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                    return Err(EngineError::NotAPdf { path, magic });
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(EngineError::PermissionDenied { path });
            }
            Err(_) => {
                return Err(EngineError::FileNotFound { path });
            }
        }

        debug!("opened caller document: {}", path.display());
        Ok(Self {
            path,
            origin: Origin::Caller,
        })
    }

    /// Write in-memory PDF bytes into `workspace` and return a scratch
    /// handle for them.
    pub fn from_bytes(bytes: &[u8], workspace: &Workspace, name: &str) -> Result<Self, EngineError> {
        let path = workspace.scratch_path(name);
        std::fs::write(&path, bytes).map_err(|e| EngineError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;
        Ok(workspace.adopt(path))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full backing bytes into memory.
    pub fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Promote the document to a caller-owned output file at `dest`.
    ///
    /// Copies rather than renames: a scratch file may be referenced by other
    /// handles, and a rename cannot cross filesystems anyway. The scratch
    /// original is still cleaned up with its workspace.
    pub fn persist(&self, dest: impl AsRef<Path>) -> Result<(), EngineError> {
        let dest = dest.as_ref();
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| EngineError::OutputWriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
            }
        }
        std::fs::copy(&self.path, dest).map_err(|e| EngineError::OutputWriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
        debug!("persisted {} -> {}", self.path.display(), dest.display());
        Ok(())
    }
}

/// A scoped temporary directory for one operation's intermediate artifacts.
///
/// Cloning a workspace clones the `Arc`, not the directory; all clones and
/// all handles adopted from the workspace share the same lifetime. The
/// directory is removed when the last reference drops.
#[derive(Clone)]
pub struct Workspace {
    dir: Arc<TempDir>,
    counter: Arc<std::sync::atomic::AtomicU64>,
}

impl Workspace {
    /// Create a workspace under `root` (or the system temp directory when
    /// `None`), with `label` as the directory-name prefix for debuggability.
    pub fn new(root: Option<&Path>, label: &str) -> Result<Self, EngineError> {
        let prefix = format!("pdfmill-{label}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(r) => builder.tempdir_in(r),
            None => builder.tempdir(),
        }
        .map_err(|e| EngineError::Internal(format!("failed to create workspace: {e}")))?;
        debug!("workspace created: {}", dir.path().display());
        Ok(Self {
            dir: Arc::new(dir),
            counter: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        })
    }

    /// Directory the workspace owns.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh, collision-free path inside the workspace. `name` is a
    /// human-readable stem; a sequence number keeps repeated stems distinct.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.dir.path().join(format!("{n:04}-{name}"))
    }

    /// Take ownership of a file already written inside this workspace,
    /// returning a scratch [`DocumentHandle`] that keeps the workspace alive.
    pub fn adopt(&self, path: PathBuf) -> DocumentHandle {
        debug_assert!(path.starts_with(self.dir.path()));
        DocumentHandle {
            path,
            origin: Origin::Scratch(Arc::clone(&self.dir)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_file_fails() {
        let err = DocumentHandle::open("/no/such/file.pdf").unwrap_err();
        assert!(matches!(err, EngineError::FileNotFound { .. }));
    }

    #[test]
    fn open_rejects_non_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-pdf.pdf");
        std::fs::write(&path, b"hello world").unwrap();
        let err = DocumentHandle::open(&path).unwrap_err();
        assert!(matches!(err, EngineError::NotAPdf { .. }));
    }

    #[test]
    fn open_accepts_pdf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::write(&path, b"%PDF-1.7\n%fake body").unwrap();
        let handle = DocumentHandle::open(&path).unwrap();
        assert_eq!(handle.path(), path);
    }

    #[test]
    fn scratch_file_removed_when_last_handle_drops() {
        let ws = Workspace::new(None, "test").unwrap();
        let handle = DocumentHandle::from_bytes(b"%PDF-1.7\n", &ws, "doc.pdf").unwrap();
        let backing = handle.path().to_path_buf();
        assert!(backing.exists());

        // The workspace value itself can go away while a handle lives.
        drop(ws);
        assert!(backing.exists(), "handle must keep the workspace alive");

        drop(handle);
        assert!(!backing.exists(), "last drop must remove the scratch file");
    }

    #[test]
    fn scratch_paths_do_not_collide() {
        let ws = Workspace::new(None, "test").unwrap();
        let a = ws.scratch_path("chunk.pdf");
        let b = ws.scratch_path("chunk.pdf");
        assert_ne!(a, b);
    }

    #[test]
    fn persist_copies_to_destination() {
        let ws = Workspace::new(None, "test").unwrap();
        let handle = DocumentHandle::from_bytes(b"%PDF-1.7\nbody", &ws, "doc.pdf").unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let dest = out_dir.path().join("nested/out.pdf");
        handle.persist(&dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7\nbody");
        // Original scratch file untouched.
        assert!(handle.path().exists());
    }
}
