//! Chunk plan calculation.
//!
//! Pure functions - no I/O, deterministic output.

use crate::models::{ChunkPlan, ChunkSpec, ConstraintProfile, MediaHandle, MIB};

/// Fraction of the byte ceiling a chunk is planned to use.
pub const SIZE_SAFETY_MARGIN: f64 = 0.9;

/// Below this target span a long input is re-encoded before planning.
pub const MIN_USEFUL_CHUNK_SECS: f64 = 60.0;

/// Inputs shorter than this are never re-encoded before planning.
pub const PREEMPTIVE_MIN_DURATION_SECS: f64 = 180.0;

/// Fraction of the computed bitrate used for the pre-emptive re-encode.
const PREEMPTIVE_BITRATE_FACTOR: f64 = 0.8;
const PREEMPTIVE_MIN_KBPS: u32 = 8;
const PREEMPTIVE_MAX_KBPS: u32 = 128;

/// Chunks longer than this get a reduced bitrate.
const LONG_SPAN_SECS: f64 = 300.0;
/// Chunks longer than this get the lowest span bitrate.
const VERY_LONG_SPAN_SECS: f64 = 450.0;

/// Whether `handle` violates either ceiling of `profile`.
pub fn needs_chunking(handle: &MediaHandle, profile: &ConstraintProfile) -> bool {
    !handle.fits(profile.max_bytes, profile.max_duration_secs)
}

/// Longest span a chunk may cover before overlap is added.
///
/// Two overlaps are reserved so an internal chunk, expanded on both
/// sides, still respects the duration ceiling.
pub fn usable_duration_secs(profile: &ConstraintProfile) -> f64 {
    let max = profile.max_duration_secs as f64;
    (max - 2.0 * profile.overlap_secs).max(max / 2.0)
}

/// Target chunk span from the file's seconds-per-MB density.
///
/// `min(duration ceiling, max MB * seconds per MB * 0.9)`, never below one
/// second.
pub fn target_chunk_secs(duration_secs: f64, size_bytes: u64, profile: &ConstraintProfile) -> f64 {
    let size_mb = (size_bytes as f64 / MIB as f64).max(1.0);
    let secs_per_mb = duration_secs / size_mb;
    let by_size = profile.max_mb() * secs_per_mb * SIZE_SAFETY_MARGIN;
    by_size.min(usable_duration_secs(profile)).max(1.0)
}

/// Whether the naive plan would produce too many tiny chunks.
pub fn should_reencode_first(target_chunk_secs: f64, duration_secs: f64) -> bool {
    target_chunk_secs < MIN_USEFUL_CHUNK_SECS && duration_secs > PREEMPTIVE_MIN_DURATION_SECS
}

/// Bitrate for re-encoding the whole input before planning.
///
/// The bitrate at which a full-length chunk would just fill the byte
/// ceiling, scaled by 0.8 and clamped to 8..=128 kbps.
pub fn preemptive_bitrate_kbps(profile: &ConstraintProfile) -> u32 {
    let bits = profile.max_bytes as f64 * 8.0;
    let kbps = bits / (profile.max_duration_secs.max(1) as f64 * 1000.0) * PREEMPTIVE_BITRATE_FACTOR;
    (kbps as u32).clamp(PREEMPTIVE_MIN_KBPS, PREEMPTIVE_MAX_KBPS)
}

/// Bitrate for a chunk of `span_secs`, stepping down for long spans.
///
/// With the default 24 kbps base: 24 up to 5 minutes, 16 up to 7.5
/// minutes, 12 beyond.
pub fn bitrate_for_span(span_secs: f64, base_kbps: u32) -> u32 {
    if span_secs > VERY_LONG_SPAN_SECS {
        (base_kbps / 2).max(1)
    } else if span_secs > LONG_SPAN_SECS {
        (base_kbps * 2 / 3).max(1)
    } else {
        base_kbps
    }
}

/// Partition `[0, duration]` into chunks of `target_secs`.
///
/// Internal boundaries are widened by the profile's overlap on both
/// sides. The first start is exactly 0 and the last end exactly
/// `duration`.
pub fn build_plan(duration_secs: f64, target_secs: f64, profile: &ConstraintProfile) -> ChunkPlan {
    let duration = duration_secs.max(0.0);
    let target = target_secs.max(1.0);
    let overlap = profile.overlap_secs.max(0.0);

    let mut count = ((duration / target).ceil() as usize).max(1);
    // Guard against float rounding producing an empty trailing chunk.
    while count > 1 && (count - 1) as f64 * target >= duration {
        count -= 1;
    }

    let chunks = (0..count)
        .map(|i| {
            let last = i + 1 == count;
            let start_secs = if i == 0 {
                0.0
            } else {
                (i as f64 * target - overlap).max(0.0)
            };
            let end_secs = if last {
                duration
            } else {
                ((i + 1) as f64 * target + overlap).min(duration)
            };
            ChunkSpec {
                index: i,
                start_secs,
                end_secs,
                bitrate_kbps: bitrate_for_span(end_secs - start_secs, profile.base_bitrate_kbps),
            }
        })
        .collect();

    ChunkPlan {
        duration_secs: duration,
        target_chunk_secs: target,
        chunks,
    }
}
