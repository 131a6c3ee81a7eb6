//! Frame artifact storage.
//!
//! Frames live at `<frames_dir>/<tier>/frame_NNN.txt` with 1-based indices.
//! Readers only ever see the contiguous prefix starting at index 1; a
//! missing file ends the tier. `Done.frame_count` is advisory and may not
//! match any tier's length.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::ser::{Serialize, SerializeMap, Serializer};
use tokio::fs;
use tracing::{debug, warn};

use openvac_models::tier::{frame_file_name, parse_frame_file_name};
use openvac_models::{best_tier, FrameArtifact, FrameTier, JobId, TierCounts, FALLBACK_ORDER};

use crate::error::{MediaError, MediaResult};
use crate::workspace::WorkspaceFactory;

/// Directory holding one tier's frames.
pub fn tier_dir(frames_dir: &Path, tier: FrameTier) -> PathBuf {
    frames_dir.join(tier.as_str())
}

/// Read a single frame. A missing file is `None`.
pub async fn read_frame(
    frames_dir: &Path,
    tier: FrameTier,
    index: u32,
) -> MediaResult<Option<String>> {
    if index == 0 {
        return Ok(None);
    }
    let path = tier_dir(frames_dir, tier).join(frame_file_name(index));
    match fs::read(&path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read a tier's frames in order, stopping at the first missing index.
pub async fn list_tier(frames_dir: &Path, tier: FrameTier) -> MediaResult<Vec<String>> {
    let mut frames = Vec::new();
    let mut index = 1;
    while let Some(text) = read_frame(frames_dir, tier, index).await? {
        frames.push(text);
        index += 1;
    }
    Ok(frames)
}

/// How a tier's files line up with the contiguous-prefix rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierCompleteness {
    /// No frame files at all
    Empty,
    /// Frames 1..=n, no gaps
    Complete(u32),
    /// Files exist past the first gap
    Incomplete { contiguous: u32, highest: u32 },
}

impl TierCompleteness {
    /// Frames a reader will actually get.
    pub fn readable(&self) -> u32 {
        match self {
            TierCompleteness::Empty => 0,
            TierCompleteness::Complete(n) => *n,
            TierCompleteness::Incomplete { contiguous, .. } => *contiguous,
        }
    }
}

/// Inspect a tier directory without reading frame contents.
pub async fn inspect_tier(frames_dir: &Path, tier: FrameTier) -> MediaResult<TierCompleteness> {
    let mut entries = match fs::read_dir(tier_dir(frames_dir, tier)).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(TierCompleteness::Empty),
        Err(e) => return Err(e.into()),
    };

    let mut indices = BTreeSet::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(index) = entry.file_name().to_str().and_then(parse_frame_file_name) {
            indices.insert(index);
        }
    }

    let Some(&highest) = indices.last() else {
        return Ok(TierCompleteness::Empty);
    };

    let contiguous = (1..).take_while(|i| indices.contains(i)).count() as u32;
    if contiguous == highest {
        Ok(TierCompleteness::Complete(highest))
    } else {
        Ok(TierCompleteness::Incomplete {
            contiguous,
            highest,
        })
    }
}

/// Frames per tier, in fallback order, empty tiers omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierFrames {
    tiers: Vec<(FrameTier, Vec<String>)>,
}

impl TierFrames {
    pub fn get(&self, tier: FrameTier) -> Option<&[String]> {
        self.tiers
            .iter()
            .find(|(t, _)| *t == tier)
            .map(|(_, frames)| frames.as_slice())
    }

    /// Tiers present, in order.
    pub fn tiers(&self) -> impl Iterator<Item = FrameTier> + '_ {
        self.tiers.iter().map(|(t, _)| *t)
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }
}

impl Serialize for TierFrames {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tiers.len()))?;
        for (tier, frames) in &self.tiers {
            map.serialize_entry(tier.as_str(), frames)?;
        }
        map.end()
    }
}

/// Read every non-empty tier in the order medium, low, high.
pub async fn load_tiers(frames_dir: &Path) -> MediaResult<TierFrames> {
    let mut tiers = Vec::new();
    for tier in FALLBACK_ORDER {
        let frames = list_tier(frames_dir, tier).await?;
        if !frames.is_empty() {
            tiers.push((tier, frames));
        }
    }
    Ok(TierFrames { tiers })
}

/// Readable frame counts for every tier.
pub async fn tier_counts(frames_dir: &Path) -> MediaResult<TierCounts> {
    let mut counts = TierCounts::default();
    for tier in FALLBACK_ORDER {
        let completeness = inspect_tier(frames_dir, tier).await?;
        if let TierCompleteness::Incomplete {
            contiguous,
            highest,
        } = completeness
        {
            warn!(
                tier = %tier,
                contiguous,
                highest,
                "Tier has a gap, only the contiguous prefix is readable"
            );
        }
        counts.set(tier, completeness.readable() as usize);
    }
    Ok(counts)
}

/// Job-addressed access to persisted frames.
#[derive(Debug, Clone)]
pub struct FrameStore {
    factory: WorkspaceFactory,
}

impl FrameStore {
    pub fn new(factory: WorkspaceFactory) -> Self {
        Self { factory }
    }

    fn frames_dir(&self, job_id: &JobId) -> PathBuf {
        self.factory.job_frames_dir(job_id)
    }

    /// Whether the job's workspace still exists.
    pub async fn job_exists(&self, job_id: &JobId) -> bool {
        fs::try_exists(self.factory.job_root(job_id))
            .await
            .unwrap_or(false)
    }

    /// One frame, or `None` when absent or past a gap in the tier.
    pub async fn read(
        &self,
        job_id: &JobId,
        tier: FrameTier,
        index: u32,
    ) -> MediaResult<Option<FrameArtifact>> {
        let frames_dir = self.frames_dir(job_id);
        let readable = inspect_tier(&frames_dir, tier).await?.readable();
        if index > readable {
            debug!(job_id = %job_id, tier = %tier, index, readable, "Frame outside readable prefix");
            return Ok(None);
        }
        let text = read_frame(&frames_dir, tier, index).await?;
        Ok(text.map(|text| FrameArtifact {
            job_id: job_id.clone(),
            tier,
            index,
            text,
        }))
    }

    /// Read a frame by its file name (`frame_NNN.txt`).
    pub async fn read_file(
        &self,
        job_id: &JobId,
        tier: FrameTier,
        file_name: &str,
    ) -> MediaResult<Option<FrameArtifact>> {
        let index = parse_frame_file_name(file_name)
            .ok_or_else(|| MediaError::InvalidFrameName(file_name.to_string()))?;
        self.read(job_id, tier, index).await
    }

    /// A tier's contiguous frames.
    pub async fn list_tier(&self, job_id: &JobId, tier: FrameTier) -> MediaResult<Vec<String>> {
        list_tier(&self.frames_dir(job_id), tier).await
    }

    pub async fn tier_counts(&self, job_id: &JobId) -> MediaResult<TierCounts> {
        tier_counts(&self.frames_dir(job_id)).await
    }

    /// The best tier to read and its frames.
    ///
    /// `requested` wins when it has frames; otherwise the fallback order
    /// applies. `None` when the job has no frames at all.
    pub async fn best_available(
        &self,
        job_id: &JobId,
        requested: Option<FrameTier>,
    ) -> MediaResult<Option<(FrameTier, Vec<String>)>> {
        let counts = self.tier_counts(job_id).await?;
        let Some(tier) = best_tier(&counts, requested) else {
            debug!(job_id = %job_id, "No frames available");
            return Ok(None);
        };
        let frames = self.list_tier(job_id, tier).await?;
        Ok(Some((tier, frames)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_frames(frames_dir: &Path, tier: FrameTier, indices: &[u32]) {
        let dir = tier_dir(frames_dir, tier);
        fs::create_dir_all(&dir).await.unwrap();
        for i in indices {
            fs::write(dir.join(frame_file_name(*i)), format!("{}-{}", tier, i))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_missing_frame_is_none() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), FrameTier::Medium, &[1, 2, 3]).await;

        assert_eq!(
            read_frame(dir.path(), FrameTier::Medium, 2).await.unwrap(),
            Some("medium-2".to_string())
        );
        assert_eq!(
            read_frame(dir.path(), FrameTier::Medium, 4).await.unwrap(),
            None
        );
        assert_eq!(
            read_frame(dir.path(), FrameTier::High, 1).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_list_stops_at_gap() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), FrameTier::Low, &[1, 2, 4, 5]).await;

        let frames = list_tier(dir.path(), FrameTier::Low).await.unwrap();
        assert_eq!(frames, vec!["low-1", "low-2"]);

        assert_eq!(
            inspect_tier(dir.path(), FrameTier::Low).await.unwrap(),
            TierCompleteness::Incomplete {
                contiguous: 2,
                highest: 5
            }
        );
    }

    #[tokio::test]
    async fn test_inspect_tier() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), FrameTier::Medium, &[1, 2, 3]).await;
        fs::write(tier_dir(dir.path(), FrameTier::Medium).join("notes.txt"), "x")
            .await
            .unwrap();

        assert_eq!(
            inspect_tier(dir.path(), FrameTier::Medium).await.unwrap(),
            TierCompleteness::Complete(3)
        );
        assert_eq!(
            inspect_tier(dir.path(), FrameTier::High).await.unwrap(),
            TierCompleteness::Empty
        );
    }

    #[tokio::test]
    async fn test_load_tiers_order_and_omission() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), FrameTier::High, &[1]).await;
        write_frames(dir.path(), FrameTier::Medium, &[1, 2]).await;
        fs::create_dir_all(tier_dir(dir.path(), FrameTier::Low))
            .await
            .unwrap();

        let tiers = load_tiers(dir.path()).await.unwrap();
        assert_eq!(
            tiers.tiers().collect::<Vec<_>>(),
            vec![FrameTier::Medium, FrameTier::High]
        );
        assert!(tiers.get(FrameTier::Low).is_none());

        let json = serde_json::to_string(&tiers).unwrap();
        assert_eq!(json, r#"{"medium":["medium-1","medium-2"],"high":["high-1"]}"#);
    }

    #[tokio::test]
    async fn test_store_best_available() {
        let dir = TempDir::new().unwrap();
        let factory = WorkspaceFactory::new(dir.path());
        let (job_id, ws) = factory.create_job_workspace().await.unwrap();
        write_frames(&ws.frames_dir, FrameTier::Medium, &[1, 2]).await;
        write_frames(&ws.frames_dir, FrameTier::High, &[1]).await;

        let store = FrameStore::new(factory);

        let (tier, frames) = store.best_available(&job_id, None).await.unwrap().unwrap();
        assert_eq!(tier, FrameTier::Medium);
        assert_eq!(frames.len(), 2);

        let (tier, frames) = store
            .best_available(&job_id, Some(FrameTier::High))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tier, FrameTier::High);
        assert_eq!(frames, vec!["high-1"]);

        let (tier, _) = store
            .best_available(&job_id, Some(FrameTier::Low))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tier, FrameTier::Medium);

        assert!(store
            .best_available(&JobId::new(), None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_store_read_file() {
        let dir = TempDir::new().unwrap();
        let factory = WorkspaceFactory::new(dir.path());
        let (job_id, ws) = factory.create_job_workspace().await.unwrap();
        write_frames(&ws.frames_dir, FrameTier::Medium, &[1, 2, 3]).await;

        let store = FrameStore::new(factory);
        let frame = store
            .read_file(&job_id, FrameTier::Medium, "frame_003.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.index, 3);
        assert_eq!(frame.text, "medium-3");

        assert!(store
            .read_file(&job_id, FrameTier::Medium, "frame_004.txt")
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            store.read_file(&job_id, FrameTier::Medium, "../secret").await,
            Err(MediaError::InvalidFrameName(_))
        ));
    }

    #[tokio::test]
    async fn test_store_read_past_gap_is_none() {
        let dir = TempDir::new().unwrap();
        let factory = WorkspaceFactory::new(dir.path());
        let (job_id, ws) = factory.create_job_workspace().await.unwrap();
        write_frames(&ws.frames_dir, FrameTier::Medium, &[1, 2, 4]).await;

        let store = FrameStore::new(factory);
        assert_eq!(
            store.list_tier(&job_id, FrameTier::Medium).await.unwrap(),
            vec!["medium-1", "medium-2"]
        );
        assert!(store
            .read_file(&job_id, FrameTier::Medium, "frame_002.txt")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .read_file(&job_id, FrameTier::Medium, "frame_004.txt")
            .await
            .unwrap()
            .is_none());
    }
}
