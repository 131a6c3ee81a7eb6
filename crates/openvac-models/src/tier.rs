//! Frame quality tiers and the tier fallback policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::JobId;

/// Quality tier produced by the conversion tool.
///
/// Tiers are populated independently; a tier without artifacts is simply
/// unsupported for that job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameTier {
    Low,
    Medium,
    High,
}

/// Fixed preference order for "best available" lookups.
pub const FALLBACK_ORDER: [FrameTier; 3] = [FrameTier::Medium, FrameTier::Low, FrameTier::High];

/// Width of the zero-padded frame index in file names.
pub const FRAME_INDEX_WIDTH: usize = 3;

impl FrameTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameTier::Low => "low",
            FrameTier::Medium => "medium",
            FrameTier::High => "high",
        }
    }
}

impl fmt::Display for FrameTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(FrameTier::Low),
            "medium" => Ok(FrameTier::Medium),
            "high" => Ok(FrameTier::High),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// One generated text-art frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameArtifact {
    pub job_id: JobId,
    pub tier: FrameTier,
    /// 1-based position within the tier
    pub index: u32,
    pub text: String,
}

/// File name for a frame index, e.g. `frame_007.txt`.
pub fn frame_file_name(index: u32) -> String {
    format!("frame_{:0width$}.txt", index, width = FRAME_INDEX_WIDTH)
}

/// Parse a frame file name back into its 1-based index.
///
/// Only the canonical zero-padded form is accepted, so every index has
/// exactly one file name.
pub fn parse_frame_file_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("frame_")?.strip_suffix(".txt")?;
    if digits.len() < FRAME_INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = digits.parse().ok()?;
    (index >= 1 && frame_file_name(index) == name).then_some(index)
}

/// Number of readable frames per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl TierCounts {
    pub fn get(&self, tier: FrameTier) -> usize {
        match tier {
            FrameTier::Low => self.low,
            FrameTier::Medium => self.medium,
            FrameTier::High => self.high,
        }
    }

    pub fn set(&mut self, tier: FrameTier, count: usize) {
        match tier {
            FrameTier::Low => self.low = count,
            FrameTier::Medium => self.medium = count,
            FrameTier::High => self.high = count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low == 0 && self.medium == 0 && self.high == 0
    }
}

/// Pick the tier a consumer should read.
///
/// An explicitly requested tier wins when it has frames. Otherwise the first
/// non-empty tier in [`FALLBACK_ORDER`] is chosen. Returns `None` when every
/// tier is empty.
pub fn best_tier(counts: &TierCounts, requested: Option<FrameTier>) -> Option<FrameTier> {
    if let Some(tier) = requested.filter(|t| counts.get(*t) > 0) {
        return Some(tier);
    }
    FALLBACK_ORDER.into_iter().find(|t| counts.get(*t) > 0)
}
