//! Chunk materialization with bitrate fallback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::plan::{
    build_plan, needs_chunking, preemptive_bitrate_kbps, should_reencode_first, target_chunk_secs,
};
use super::{ChunkingError, ChunkingResult};
use crate::media::commands::{self, Mp3Encode};
use crate::media::{run_to_file, StageContext, ToolError, ToolRunner};
use crate::models::{
    ChunkPlan, ChunkResult, ChunkSpec, ConstraintProfile, Degradation, MediaHandle, MediaKind, MIB,
};

const PREEMPTIVE_NAME: &str = "lower_bitrate.mp3";

/// Output of [`AdaptiveChunker::plan_and_materialize`].
#[derive(Debug, Clone)]
pub struct ChunkingOutput {
    /// One entry per planned chunk, in order. Chunks that could not be
    /// encoded have no handle.
    pub chunks: Vec<ChunkResult>,
    /// The plan, or `None` when the input was passed through.
    pub plan: Option<ChunkPlan>,
    pub warnings: Vec<Degradation>,
}

impl ChunkingOutput {
    pub fn materialized_count(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_materialized()).count()
    }
}

/// Splits audio into chunks that satisfy a [`ConstraintProfile`].
pub struct AdaptiveChunker {
    runner: Arc<dyn ToolRunner>,
    sample_rate: u32,
    file_prefix: String,
}

impl AdaptiveChunker {
    pub fn new(runner: Arc<dyn ToolRunner>, sample_rate: u32) -> Self {
        Self {
            runner,
            sample_rate,
            file_prefix: "chunk".to_string(),
        }
    }

    /// Use a different file name prefix so several chunkers can share a
    /// work directory.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Decide whether `input` needs chunking and, if so, write the chunks
    /// into `work_dir`.
    ///
    /// Inputs within both ceilings come back unchanged as a single chunk.
    /// Fails with [`ChunkingError::NoChunks`] only when every planned chunk
    /// failed to encode.
    pub async fn plan_and_materialize(
        &self,
        input: &MediaHandle,
        profile: &ConstraintProfile,
        work_dir: &Path,
        ctx: StageContext<'_>,
    ) -> ChunkingResult<ChunkingOutput> {
        if !needs_chunking(input, profile) {
            ctx.logger.info(&format!(
                "{} is within limits ({:.2} MB, {}s), no chunking needed",
                input.file_name(),
                input.size_mb(),
                input.duration_secs
            ));
            return Ok(ChunkingOutput {
                chunks: vec![ChunkResult::passthrough(input.clone())],
                plan: None,
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        let duration = input.duration_secs as f64;
        let mut source = input.clone();
        let mut target = target_chunk_secs(duration, source.size_bytes, profile);

        if should_reencode_first(target, duration) {
            let kbps = preemptive_bitrate_kbps(profile);
            ctx.logger.info(&format!(
                "Target chunk length {:.1}s is too short, re-encoding input at {}kbps first",
                target, kbps
            ));
            let output = work_dir.join(format!("{}_{}", self.file_prefix, PREEMPTIVE_NAME));
            let params = Mp3Encode::new(kbps, self.sample_rate);
            let invocation = commands::encode_mp3(&source.path, &output, &params);
            match run_to_file(self.runner.as_ref(), &invocation, ctx).await {
                Ok(size) => {
                    source = MediaHandle::new(&output, size, input.duration_secs, MediaKind::Audio);
                    target = target_chunk_secs(duration, size, profile);
                    warnings.push(Degradation::PreemptiveBitrate { kbps });
                }
                Err(ToolError::Cancelled) => return Err(ChunkingError::Cancelled),
                Err(e) => ctx.logger.warn(&format!("Pre-emptive re-encode failed: {}", e)),
            }
        }

        let plan = build_plan(duration, target, profile);
        ctx.logger.info(&format!(
            "Splitting {:.0}s into {} chunks of ~{:.1}s (limit {:.1} MB)",
            duration,
            plan.len(),
            plan.target_chunk_secs,
            profile.max_mb()
        ));

        let mut chunks = Vec::with_capacity(plan.len());
        for spec in &plan.chunks {
            let result = self
                .materialize(&source, spec, profile, work_dir, ctx, &mut warnings)
                .await?;
            chunks.push(result);
        }

        if source.path != input.path {
            let _ = tokio::fs::remove_file(&source.path).await;
        }

        let output = ChunkingOutput {
            chunks,
            plan: Some(plan),
            warnings,
        };
        if output.materialized_count() == 0 {
            return Err(ChunkingError::NoChunks {
                planned: output.chunks.len(),
            });
        }
        Ok(output)
    }

    /// Encode one chunk, walking down the bitrate ladder while it is too
    /// big. An oversized chunk is kept once the ladder runs out.
    async fn materialize(
        &self,
        source: &MediaHandle,
        spec: &ChunkSpec,
        profile: &ConstraintProfile,
        work_dir: &Path,
        ctx: StageContext<'_>,
        warnings: &mut Vec<Degradation>,
    ) -> ChunkingResult<ChunkResult> {
        let path = self.chunk_path(work_dir, spec.index, spec.bitrate_kbps);
        let mut size = match self.encode(source, spec, spec.bitrate_kbps, &path, ctx).await {
            Ok(size) => size,
            Err(ToolError::Cancelled) => return Err(ChunkingError::Cancelled),
            Err(e) => {
                ctx.logger.warn(&format!("Chunk {} failed to encode: {}", spec.index + 1, e));
                return Ok(ChunkResult::missing(spec));
            }
        };
        let mut kept = (path, spec.bitrate_kbps);

        if size > profile.max_bytes {
            for kbps in profile.ladder_below(spec.bitrate_kbps) {
                ctx.logger.info(&format!(
                    "Chunk {} is {:.2} MB, retrying at {}kbps",
                    spec.index + 1,
                    size as f64 / MIB as f64,
                    kbps
                ));
                let retry_path = self.chunk_path(work_dir, spec.index, kbps);
                match self.encode(source, spec, kbps, &retry_path, ctx).await {
                    Ok(retry_size) => {
                        let _ = tokio::fs::remove_file(&kept.0).await;
                        kept = (retry_path, kbps);
                        size = retry_size;
                        if size <= profile.max_bytes {
                            warnings.push(Degradation::ChunkBitrateReduced {
                                index: spec.index,
                                kbps,
                            });
                            break;
                        }
                    }
                    Err(ToolError::Cancelled) => return Err(ChunkingError::Cancelled),
                    Err(e) => ctx.logger.warn(&format!(
                        "Chunk {} re-encode at {}kbps failed: {}",
                        spec.index + 1,
                        kbps,
                        e
                    )),
                }
            }

            if size > profile.max_bytes {
                ctx.logger.warn(&format!(
                    "Chunk {} still exceeds the limit at {}kbps, keeping it",
                    spec.index + 1,
                    kept.1
                ));
                warnings.push(Degradation::ChunkOversized {
                    index: spec.index,
                    size_bytes: size,
                });
            }
        }

        let duration = spec.duration_secs().ceil() as u64;
        tracing::debug!(
            chunk = spec.index,
            start = spec.start_secs,
            end = spec.end_secs,
            size_bytes = size,
            kbps = kept.1,
            "Chunk materialized"
        );
        Ok(ChunkResult {
            index: spec.index,
            handle: Some(MediaHandle::new(kept.0, size, duration, MediaKind::Audio)),
            size_bytes: size,
            start_secs: spec.start_secs,
            bitrate_kbps: kept.1,
        })
    }

    async fn encode(
        &self,
        source: &MediaHandle,
        spec: &ChunkSpec,
        kbps: u32,
        output: &Path,
        ctx: StageContext<'_>,
    ) -> Result<u64, ToolError> {
        let params = Mp3Encode::new(kbps, self.sample_rate).range(spec.start_secs, spec.end_secs);
        let invocation = commands::encode_mp3(&source.path, output, &params);
        run_to_file(self.runner.as_ref(), &invocation, ctx).await
    }

    fn chunk_path(&self, work_dir: &Path, index: usize, kbps: u32) -> PathBuf {
        work_dir.join(format!("{}_{:03}_{}k.mp3", self.file_prefix, index, kbps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogConfig, RequestLogger};
    use crate::media::testing::FakeRunner;
    use crate::media::{Invocation, Tool};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        dir: TempDir,
        cancel: CancellationToken,
        logger: RequestLogger,
    }

    fn fixture() -> Fixture {
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            cancel: CancellationToken::new(),
            logger: RequestLogger::tracing_only("chunk-test", LogConfig::default()),
        }
    }

    fn input(dir: &Path, size: u64, duration: u64) -> MediaHandle {
        let path = dir.join("conditioned.wav");
        std::fs::write(&path, b"pcm").unwrap();
        MediaHandle::new(path, size, duration, MediaKind::Audio)
    }

    fn bitrate_of(inv: &Invocation) -> Option<u32> {
        let pos = inv.args.iter().position(|a| a == "-b:a")?;
        inv.args[pos + 1].trim_end_matches('k').parse().ok()
    }

    #[tokio::test]
    async fn within_limits_returns_input_unchanged() {
        let f = fixture();
        let runner = Arc::new(FakeRunner::new());
        let chunker = AdaptiveChunker::new(runner.clone(), 16000);
        let handle = input(f.dir.path(), MIB, 5);

        let out = chunker
            .plan_and_materialize(
                &handle,
                &ConstraintProfile::default(),
                f.dir.path(),
                StageContext::new(&f.cancel, &f.logger),
            )
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 1);
        assert_eq!(out.chunks[0].handle.as_ref(), Some(&handle));
        assert!(out.plan.is_none());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn splits_long_input_in_order() {
        let f = fixture();
        let runner = Arc::new(FakeRunner::new());
        let chunker = AdaptiveChunker::new(runner.clone(), 16000);
        let handle = input(f.dir.path(), 40 * MIB, 1200);

        let out = chunker
            .plan_and_materialize(
                &handle,
                &ConstraintProfile::default(),
                f.dir.path(),
                StageContext::new(&f.cancel, &f.logger),
            )
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 3);
        assert!(out.plan.as_ref().unwrap().is_contiguous());
        let indices: Vec<usize> = out.chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(out.chunks.iter().all(|c| c.is_materialized()));
        assert_eq!(out.chunks[1].start_secs, 534.0);
        assert!(out.warnings.is_empty());
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn oversized_chunk_walks_ladder_downwards() {
        let f = fixture();
        let limit = 20 * MIB;
        // Only 6 kbps fits the ceiling.
        let runner = Arc::new(FakeRunner::new().with_sizer(move |inv| {
            bitrate_of(inv).map(|kbps| if kbps > 6 { limit + 1 } else { limit / 2 })
        }));
        let chunker = AdaptiveChunker::new(runner.clone(), 16000);
        let handle = input(f.dir.path(), 30 * MIB, 700);

        let out = chunker
            .plan_and_materialize(
                &handle,
                &ConstraintProfile::default(),
                f.dir.path(),
                StageContext::new(&f.cancel, &f.logger),
            )
            .await
            .unwrap();

        // 700 s at 30 MB plans two chunks: 422 s (16 kbps) and 282 s (24 kbps).
        // Each walks the ladder strictly downwards until 6 kbps fits.
        let bitrates: Vec<u32> = runner.calls().iter().filter_map(bitrate_of).collect();
        assert_eq!(bitrates, vec![16, 12, 8, 6, 24, 12, 8, 6]);

        assert!(out.chunks.iter().all(|c| c.bitrate_kbps == 6));
        assert!(out.chunks.iter().all(|c| c.size_bytes <= limit));
        assert!(out
            .warnings
            .iter()
            .all(|w| matches!(w, Degradation::ChunkBitrateReduced { kbps: 6, .. })));
        // Superseded attempts are removed.
        let leftovers = std::fs::read_dir(f.dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with("chunk_"))
            .count();
        assert_eq!(leftovers, out.chunks.len());
    }

    #[tokio::test]
    async fn exhausted_ladder_keeps_oversized_chunk() {
        let f = fixture();
        let limit = 20 * MIB;
        let runner = Arc::new(FakeRunner::new().with_sizer(move |_| Some(limit * 2)));
        let chunker = AdaptiveChunker::new(runner.clone(), 16000);
        let handle = input(f.dir.path(), 25 * MIB, 200);

        let out = chunker
            .plan_and_materialize(
                &handle,
                &ConstraintProfile::default(),
                f.dir.path(),
                StageContext::new(&f.cancel, &f.logger),
            )
            .await
            .unwrap();

        // 1 initial encode + 3 ladder steps per chunk, then give up.
        assert_eq!(runner.calls().len(), out.chunks.len() * 4);
        assert!(out.chunks.iter().all(|c| c.is_materialized()));
        assert!(out
            .warnings
            .iter()
            .any(|w| matches!(w, Degradation::ChunkOversized { .. })));
    }

    #[tokio::test]
    async fn all_encodes_failing_is_chunking_failed() {
        let f = fixture();
        let runner = Arc::new(FakeRunner::new().failing_tool(Tool::Ffmpeg));
        let chunker = AdaptiveChunker::new(runner, 16000);
        let handle = input(f.dir.path(), 40 * MIB, 1200);

        let err = chunker
            .plan_and_materialize(
                &handle,
                &ConstraintProfile::default(),
                f.dir.path(),
                StageContext::new(&f.cancel, &f.logger),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChunkingError::NoChunks { planned: 3 }));
    }

    #[tokio::test]
    async fn partial_encode_failure_keeps_missing_entry() {
        let f = fixture();
        let runner = Arc::new(FakeRunner::new().failing("chunk_001"));
        let chunker = AdaptiveChunker::new(runner, 16000);
        let handle = input(f.dir.path(), 40 * MIB, 1200);

        let out = chunker
            .plan_and_materialize(
                &handle,
                &ConstraintProfile::default(),
                f.dir.path(),
                StageContext::new(&f.cancel, &f.logger),
            )
            .await
            .unwrap();

        assert_eq!(out.chunks.len(), 3);
        assert!(!out.chunks[1].is_materialized());
        assert_eq!(out.materialized_count(), 2);
    }

    #[tokio::test]
    async fn dense_input_is_reencoded_before_planning() {
        let f = fixture();
        let runner = Arc::new(FakeRunner::new().with_sizer(|inv| {
            // The whole-file re-encode comes out at 60 MB.
            if inv.command_line().contains(PREEMPTIVE_NAME) && !inv.args.contains(&"-ss".to_string()) {
                Some(60 * MIB)
            } else {
                None
            }
        }));
        let chunker = AdaptiveChunker::new(runner.clone(), 16000);
        let handle = input(f.dir.path(), 1500 * MIB, 3600);

        let out = chunker
            .plan_and_materialize(
                &handle,
                &ConstraintProfile::default(),
                f.dir.path(),
                StageContext::new(&f.cancel, &f.logger),
            )
            .await
            .unwrap();

        assert!(matches!(
            out.warnings.first(),
            Some(Degradation::PreemptiveBitrate { kbps: 128 })
        ));
        // 60 MB over an hour: 60 s per MB, 20 MB * 60 * 0.9 = 1080 s, capped at 536 s.
        assert_eq!(out.plan.as_ref().unwrap().target_chunk_secs, 536.0);
        assert_eq!(out.chunks.len(), 7);
        assert!(!f.dir.path().join(format!("chunk_{}", PREEMPTIVE_NAME)).exists());
        let calls = runner.calls();
        assert!(calls[1..]
            .iter()
            .all(|c| c.command_line().contains(PREEMPTIVE_NAME)));
    }
}
