//! Per-job filesystem workspaces.
//!
//! Every job and preview gets its own directory tree under the scratch root:
//!
//! ```text
//! <root>/<prefix><id>/
//!     input.<ext>
//!     frames/<tier>/frame_001.txt
//! ```
//!
//! Workspaces never overlap, so the only coordination needed is a
//! collision-free name.

use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use openvac_models::JobId;

use crate::error::MediaResult;

/// Prefix for full-job workspaces.
pub const JOB_PREFIX: &str = "job-";

/// Prefix for disposable preview workspaces.
pub const PREVIEW_PREFIX: &str = "preview-";

/// Name of the frames subdirectory.
pub const FRAMES_DIR: &str = "frames";

/// Default extension for uploads without a usable one.
pub const DEFAULT_INPUT_EXTENSION: &str = "mp4";

/// An allocated workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Unique token embedded in the directory name
    pub id: String,
    /// Workspace directory
    pub root: PathBuf,
    /// Frames directory (`<root>/frames`)
    pub frames_dir: PathBuf,
}

impl Workspace {
    /// Path of a file directly inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path for the uploaded input video, keeping a sane extension.
    pub fn input_path(&self, original_name: Option<&str>) -> PathBuf {
        self.file(&format!("input.{}", input_extension(original_name)))
    }
}

/// Extension taken from an upload file name, or the default.
pub fn input_extension(original_name: Option<&str>) -> &str {
    original_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8)
        .filter(|ext| ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_INPUT_EXTENSION)
}

/// Allocates workspaces under a scratch root.
#[derive(Debug, Clone)]
pub struct WorkspaceFactory {
    root: PathBuf,
}

impl WorkspaceFactory {
    /// Create a factory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scratch root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the scratch root if it does not exist yet.
    pub async fn ensure_root(&self) -> MediaResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Create a fresh workspace named `<prefix><uuid>`.
    pub async fn create_workspace(&self, prefix: &str) -> MediaResult<Workspace> {
        self.create_with_id(prefix, Uuid::new_v4().to_string()).await
    }

    /// Allocate the workspace for a new full job.
    pub async fn create_job_workspace(&self) -> MediaResult<(JobId, Workspace)> {
        let job_id = JobId::new();
        let workspace = self
            .create_with_id(JOB_PREFIX, job_id.as_str().to_string())
            .await?;
        Ok((job_id, workspace))
    }

    /// Create a workspace that is removed unless explicitly kept.
    pub async fn create_scoped(&self, prefix: &str) -> MediaResult<ScopedWorkspace> {
        Ok(ScopedWorkspace::new(self.create_workspace(prefix).await?))
    }

    /// Directory of a job's workspace (which may no longer exist).
    pub fn job_root(&self, job_id: &JobId) -> PathBuf {
        self.root.join(format!("{}{}", JOB_PREFIX, job_id))
    }

    /// Frames directory of a job's workspace.
    pub fn job_frames_dir(&self, job_id: &JobId) -> PathBuf {
        self.job_root(job_id).join(FRAMES_DIR)
    }

    /// Remove workspaces with `prefix` last modified more than `older_than` ago.
    ///
    /// Returns the number of workspaces removed.
    pub async fn sweep(&self, prefix: &str, older_than: Duration) -> MediaResult<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(prefix) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_dir() => m,
                _ => continue,
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age >= older_than {
                debug!(path = %entry.path().display(), age_secs = age.as_secs(), "Sweeping workspace");
                destroy_workspace(&entry.path()).await?;
                removed += 1;
            }
        }

        Ok(removed)
    }

    async fn create_with_id(&self, prefix: &str, id: String) -> MediaResult<Workspace> {
        fs::create_dir_all(&self.root).await?;

        let root = self.root.join(format!("{}{}", prefix, id));
        // create_dir (not create_dir_all) so an existing directory is never reused
        fs::create_dir(&root).await?;

        let frames_dir = root.join(FRAMES_DIR);
        if let Err(e) = fs::create_dir(&frames_dir).await {
            destroy_workspace(&root).await.ok();
            return Err(e.into());
        }

        debug!(workspace = %root.display(), "Created workspace");

        Ok(Workspace {
            id,
            root,
            frames_dir,
        })
    }
}

/// Recursively remove a workspace. Removing a missing workspace succeeds.
pub async fn destroy_workspace(root: &Path) -> MediaResult<()> {
    match fs::remove_dir_all(root).await {
        Ok(()) => {
            debug!(workspace = %root.display(), "Destroyed workspace");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// A workspace that is destroyed on every exit path.
///
/// Call [`ScopedWorkspace::destroy`] on the normal path. If the guard is
/// dropped while still armed (for example because the request future was
/// cancelled) the tree is removed synchronously.
#[derive(Debug)]
pub struct ScopedWorkspace {
    workspace: Workspace,
    armed: bool,
}

impl ScopedWorkspace {
    /// Guard an existing workspace.
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            armed: true,
        }
    }

    /// Destroy the workspace now.
    pub async fn destroy(mut self) -> MediaResult<()> {
        self.armed = false;
        destroy_workspace(&self.workspace.root).await
    }

    /// Keep the workspace and hand it over to its long-lived owner.
    pub fn persist(mut self) -> Workspace {
        self.armed = false;
        self.workspace.clone()
    }
}

impl Deref for ScopedWorkspace {
    type Target = Workspace;

    fn deref(&self) -> &Workspace {
        &self.workspace
    }
}

impl Drop for ScopedWorkspace {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.workspace.root) {
            Ok(()) => info!(workspace = %self.workspace.root.display(), "Removed abandoned workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.workspace.root.display(),
                "Failed to remove abandoned workspace: {}", e
            ),
        }
    }
}
