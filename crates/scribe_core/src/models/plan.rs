//! Constraint profiles and chunk plans.

use serde::{Deserialize, Serialize};

use super::media::{MediaHandle, MIB};

/// Size/duration policy a chunk must satisfy.
///
/// Read-only once built; the orchestrator derives a stricter copy for the
/// emergency tier with [`ConstraintProfile::with_ceilings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintProfile {
    /// Maximum bytes per chunk.
    pub max_bytes: u64,
    /// Maximum seconds per chunk.
    pub max_duration_secs: u64,
    /// Seconds duplicated on each side of an internal boundary.
    pub overlap_secs: f64,
    /// Bitrate used for chunks of ordinary length (kbps).
    pub base_bitrate_kbps: u32,
    /// Fallback bitrates tried, high to low, when a chunk is still too big.
    pub bitrate_ladder_kbps: Vec<u32>,
}

impl Default for ConstraintProfile {
    fn default() -> Self {
        Self {
            max_bytes: 20 * MIB,
            max_duration_secs: 540,
            overlap_secs: 2.0,
            base_bitrate_kbps: 24,
            bitrate_ladder_kbps: vec![12, 8, 6],
        }
    }
}

impl ConstraintProfile {
    /// Copy of this profile with different size/duration ceilings.
    pub fn with_ceilings(&self, max_bytes: u64, max_duration_secs: u64) -> Self {
        Self {
            max_bytes,
            max_duration_secs,
            ..self.clone()
        }
    }

    /// Ceiling in mebibytes.
    pub fn max_mb(&self) -> f64 {
        self.max_bytes as f64 / MIB as f64
    }

    /// Ladder entries strictly below `current_kbps`, highest first.
    ///
    /// Walking this list always lowers the bitrate, so a retry loop over it
    /// is bounded by the ladder length.
    pub fn ladder_below(&self, current_kbps: u32) -> Vec<u32> {
        let mut ladder: Vec<u32> = self
            .bitrate_ladder_kbps
            .iter()
            .copied()
            .filter(|&kbps| kbps < current_kbps)
            .collect();
        ladder.sort_unstable_by(|a, b| b.cmp(a));
        ladder.dedup();
        ladder
    }
}

/// One planned time range of the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// Zero-based position in the plan.
    pub index: usize,
    /// Start time in seconds (inclusive).
    pub start_secs: f64,
    /// End time in seconds.
    pub end_secs: f64,
    /// Encoding bitrate for this chunk (kbps).
    pub bitrate_kbps: u32,
}

impl ChunkSpec {
    /// Span covered by this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Ordered partition of a source into chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPlan {
    /// Duration of the source the plan covers.
    pub duration_secs: f64,
    /// Target span of each chunk before overlap is added.
    pub target_chunk_secs: f64,
    /// Chunks in playback order.
    pub chunks: Vec<ChunkSpec>,
}

impl ChunkPlan {
    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the plan has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Check that chunks cover `[0, duration]` without gaps and in order.
    pub fn is_contiguous(&self) -> bool {
        let Some(first) = self.chunks.first() else {
            return false;
        };
        let Some(last) = self.chunks.last() else {
            return false;
        };
        if first.start_secs != 0.0 || last.end_secs != self.duration_secs {
            return false;
        }
        self.chunks.windows(2).all(|pair| {
            pair[1].start_secs >= pair[0].start_secs
                && pair[1].end_secs >= pair[0].end_secs
                && pair[1].start_secs <= pair[0].end_secs
        })
    }
}

/// A materialized chunk.
///
/// `handle` is `None` when the chunk could not be encoded at all. Such
/// chunks stay in the list so the orchestrator reports them as missing
/// instead of dropping them silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    /// Zero-based position in the plan.
    pub index: usize,
    /// Encoded chunk file, if encoding succeeded.
    pub handle: Option<MediaHandle>,
    /// Size of the encoded file in bytes (0 when missing).
    pub size_bytes: u64,
    /// Start time of the chunk in the source.
    pub start_secs: f64,
    /// Bitrate the kept file was encoded at (0 for a pass-through input).
    pub bitrate_kbps: u32,
}

impl ChunkResult {
    /// Wrap an input that needs no chunking.
    pub fn passthrough(handle: MediaHandle) -> Self {
        Self {
            index: 0,
            size_bytes: handle.size_bytes,
            handle: Some(handle),
            start_secs: 0.0,
            bitrate_kbps: 0,
        }
    }

    /// Record a chunk that failed to encode.
    pub fn missing(spec: &ChunkSpec) -> Self {
        Self {
            index: spec.index,
            handle: None,
            size_bytes: 0,
            start_secs: spec.start_secs,
            bitrate_kbps: spec.bitrate_kbps,
        }
    }

    /// Whether a file exists for this chunk.
    pub fn is_materialized(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(index: usize, start: f64, end: f64) -> ChunkSpec {
        ChunkSpec {
            index,
            start_secs: start,
            end_secs: end,
            bitrate_kbps: 24,
        }
    }

    #[test]
    fn ladder_below_strictly_decreases() {
        let profile = ConstraintProfile::default();
        assert_eq!(profile.ladder_below(24), vec![12, 8, 6]);
        assert_eq!(profile.ladder_below(12), vec![8, 6]);
        assert!(profile.ladder_below(6).is_empty());
    }

    #[test]
    fn ladder_below_sorts_unordered_config() {
        let profile = ConstraintProfile {
            bitrate_ladder_kbps: vec![6, 12, 8, 12],
            ..Default::default()
        };
        assert_eq!(profile.ladder_below(16), vec![12, 8, 6]);
    }

    #[test]
    fn with_ceilings_keeps_ladder() {
        let profile = ConstraintProfile::default().with_ceilings(10 * MIB, 300);
        assert_eq!(profile.max_bytes, 10 * MIB);
        assert_eq!(profile.max_duration_secs, 300);
        assert_eq!(profile.bitrate_ladder_kbps, vec![12, 8, 6]);
    }

    #[test]
    fn contiguous_plan_detection() {
        let plan = ChunkPlan {
            duration_secs: 100.0,
            target_chunk_secs: 50.0,
            chunks: vec![spec(0, 0.0, 52.0), spec(1, 48.0, 100.0)],
        };
        assert!(plan.is_contiguous());

        let gap = ChunkPlan {
            duration_secs: 100.0,
            target_chunk_secs: 50.0,
            chunks: vec![spec(0, 0.0, 40.0), spec(1, 50.0, 100.0)],
        };
        assert!(!gap.is_contiguous());
    }
}
