//! Job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::ConversionSettings;

/// Rejected job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job id: {0}")]
pub struct JobIdError(pub String);

/// Unique identifier for a conversion job.
///
/// Always a UUID string, so it is safe to embed in filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse an untrusted job ID (for example a URL segment).
    pub fn parse(s: &str) -> Result<Self, JobIdError> {
        Uuid::parse_str(s)
            .map(|uuid| Self(uuid.hyphenated().to_string()))
            .map_err(|_| JobIdError(s.to_string()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A full conversion request with its own workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Workspace directory owned by this job
    pub workspace_root: PathBuf,
    /// Uploaded source video inside the workspace
    pub video_path: PathBuf,
    /// Root of the per-tier frame directories
    pub frames_root: PathBuf,
    /// Settings for this invocation
    pub settings: ConversionSettings,
    /// Submission time
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a job record for an allocated workspace.
    pub fn new(
        id: JobId,
        workspace_root: PathBuf,
        video_path: PathBuf,
        frames_root: PathBuf,
        settings: ConversionSettings,
    ) -> Self {
        Self {
            id,
            workspace_root,
            video_path,
            frames_root,
            settings,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ids_are_unique() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert!(JobId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_paths() {
        assert!(JobId::parse("../etc").is_err());
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("job-123").is_err());
    }

    #[test]
    fn test_parse_normalizes_case() {
        let id = JobId::parse("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
        assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }
}
