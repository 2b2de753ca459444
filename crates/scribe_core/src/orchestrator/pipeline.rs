//! Per-request transcription state machine.
//!
//! ```text
//! Start → ProbingInput → ConditioningAudio → SizingDecision
//!       → Direct | Chunked | Emergency → Merging → Done
//! ```
//!
//! Direct falls through to Chunked on failure; Chunked escalates to
//! Emergency when no chunk could be encoded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::context::RequestContext;
use super::errors::{TranscribeError, TranscribeResult};
use super::merge::{MergeOptions, TranscriptMerger};
use crate::asr::{build_asr_client, transcribe_with_retry, AsrClient, AsrError, RetryPolicy, UnitRequest};
use crate::chunking::plan::needs_chunking;
use crate::chunking::{AdaptiveChunker, ChunkingError};
use crate::config::Settings;
use crate::logging::LogConfig;
use crate::media::commands::{self, Mp3Encode};
use crate::media::{run_to_file, AudioConditioner, FfmpegRunner, MediaProbe, ToolError, ToolRunner};
use crate::models::{
    ChunkResult, Degradation, MediaHandle, MediaKind, TranscriptionOutcome, TranscriptionPath,
    TranscriptionReport, MIB,
};

/// Drives one file through conditioning, chunking, recognition and merge.
///
/// Holds no per-request state; concurrent calls to
/// [`run_transcription`](Self::run_transcription) share nothing but the
/// injected tool runner and ASR client.
pub struct TranscriptionOrchestrator {
    settings: Settings,
    runner: Arc<dyn ToolRunner>,
    asr: Arc<dyn AsrClient>,
    probe: MediaProbe,
    conditioner: AudioConditioner,
    merger: TranscriptMerger,
    retry: RetryPolicy,
}

impl TranscriptionOrchestrator {
    pub fn new(settings: Settings, runner: Arc<dyn ToolRunner>, asr: Arc<dyn AsrClient>) -> Self {
        let probe = MediaProbe::new(Arc::clone(&runner));
        let conditioner = AudioConditioner::new(
            Arc::clone(&runner),
            settings.conditioning.clone(),
            settings.tools.rnnoise_model.clone(),
        );
        let merger = TranscriptMerger::new(MergeOptions {
            dedupe_overlap: settings.chunking.dedupe_overlap,
        });
        let retry = settings.asr.retry_policy();
        Self {
            settings,
            runner,
            asr,
            probe,
            conditioner,
            merger,
            retry,
        }
    }

    /// Wire up ffmpeg and the configured ASR client.
    pub fn from_settings(settings: Settings) -> TranscribeResult<Self> {
        let runner: Arc<dyn ToolRunner> = Arc::new(FfmpegRunner::from_settings(&settings.tools));
        let asr = build_asr_client(&settings.asr)
            .map_err(|e| TranscribeError::setup_failed(e.to_string()))?;
        Ok(Self::new(settings, runner, asr))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Name of the ASR client in use.
    pub fn asr_name(&self) -> &'static str {
        self.asr.name()
    }

    /// Transcribe `path`.
    ///
    /// `language` of `None`, empty or `"auto"` lets the service detect it.
    /// Returns a possibly partial report; partial reports name their
    /// missing chunks in the text and in `failed_chunk_indices`.
    pub async fn run_transcription(
        &self,
        path: &Path,
        language: Option<&str>,
        cancel: CancellationToken,
    ) -> TranscribeResult<TranscriptionReport> {
        let request_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let logs_folder = PathBuf::from(&self.settings.paths.logs_folder);
        let log_dir = self.settings.logging.request_logs.then_some(logs_folder.as_path());

        let ctx = RequestContext::new(
            request_id,
            Path::new(&self.settings.paths.temp_root),
            log_dir,
            LogConfig::from_settings(&self.settings.logging),
            cancel,
        )?;

        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("auto"));
        ctx.logger.info(&format!(
            "Transcribing {} (language: {}, client: {})",
            path.display(),
            language.unwrap_or("auto"),
            self.asr.name()
        ));

        let mut run = Run {
            units: Units {
                orchestrator: self,
                ctx: &ctx,
                language,
            },
            source: path,
            warnings: Vec::new(),
            duration_secs: 0,
        };
        let result = run.drive().await;

        match &result {
            Ok(report) => ctx.logger.success(&format!(
                "Done via {} path: {} units, {} failed, {} chars",
                report.path,
                report.unit_count,
                report.failed_chunk_indices.len(),
                report.merged_text.len()
            )),
            Err(e) => ctx.logger.error(&format!("Transcription failed: {}", e)),
        }
        ctx.logger.flush();
        result
    }
}

enum State {
    Start,
    ProbingInput,
    ConditioningAudio {
        input: MediaHandle,
    },
    SizingDecision {
        audio: MediaHandle,
    },
    DirectTranscription {
        audio: MediaHandle,
    },
    ChunkedTranscription {
        audio: MediaHandle,
    },
    EmergencyFallback {
        audio: MediaHandle,
    },
    Merging {
        outcomes: Vec<TranscriptionOutcome>,
        path: TranscriptionPath,
    },
    Done(TranscriptionReport),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Start => "Start",
            State::ProbingInput => "Probing input",
            State::ConditioningAudio { .. } => "Conditioning audio",
            State::SizingDecision { .. } => "Sizing decision",
            State::DirectTranscription { .. } => "Direct transcription",
            State::ChunkedTranscription { .. } => "Chunked transcription",
            State::EmergencyFallback { .. } => "Emergency fallback",
            State::Merging { .. } => "Merging",
            State::Done(_) => "Done",
        }
    }
}

struct Run<'a> {
    units: Units<'a>,
    source: &'a Path,
    warnings: Vec<Degradation>,
    duration_secs: u64,
}

impl Run<'_> {
    async fn drive(&mut self) -> TranscribeResult<TranscriptionReport> {
        let ctx = self.units.ctx;
        let mut state = State::Start;
        loop {
            if let State::Done(report) = state {
                return Ok(report);
            }
            if ctx.is_cancelled() && !matches!(state, State::Merging { .. }) {
                ctx.logger.warn(&format!("Cancelled before '{}'", state.name()));
                return Err(TranscribeError::cancelled());
            }
            ctx.logger.phase(state.name());
            state = self.step(state).await?;
        }
    }

    async fn step(&mut self, state: State) -> TranscribeResult<State> {
        let orchestrator = self.units.orchestrator;
        let ctx = self.units.ctx;

        match state {
            State::Start => Ok(State::ProbingInput),

            State::ProbingInput => {
                let input = orchestrator.probe.probe(self.source, ctx.stage()).await?;
                ctx.logger.info(&format!(
                    "Input is {} ({:.2} MB, {}s)",
                    input.kind,
                    input.size_mb(),
                    input.duration_secs
                ));
                self.duration_secs = input.duration_secs;
                Ok(State::ConditioningAudio { input })
            }

            State::ConditioningAudio { input } => {
                let conditioned = orchestrator
                    .conditioner
                    .condition(&input, ctx.work_dir(), ctx.stage())
                    .await?;
                self.warnings.extend(conditioned.warnings);

                let probed = orchestrator
                    .probe
                    .probe(&conditioned.handle.path, ctx.stage())
                    .await?;
                // The probe can fall back to a default; never shrink below
                // what the original input reported.
                let audio = MediaHandle::new(
                    probed.path,
                    probed.size_bytes,
                    probed.duration_secs.max(input.duration_secs),
                    MediaKind::Audio,
                );
                Ok(State::SizingDecision { audio })
            }

            State::SizingDecision { audio } => {
                let limits = &orchestrator.settings.orchestration;
                let asr = &orchestrator.settings.asr;
                let forced = audio.size_bytes > limits.force_chunk_mb * MIB
                    || audio.duration_secs > limits.force_chunk_duration_secs;

                if forced || !audio.fits(asr.max_bytes, asr.max_duration_secs) {
                    ctx.logger.info(&format!(
                        "Conditioned audio is {:.2} MB / {}s, chunking",
                        audio.size_mb(),
                        audio.duration_secs
                    ));
                    Ok(State::ChunkedTranscription { audio })
                } else {
                    ctx.logger.info(&format!(
                        "Conditioned audio is {:.2} MB / {}s, transcribing directly",
                        audio.size_mb(),
                        audio.duration_secs
                    ));
                    Ok(State::DirectTranscription { audio })
                }
            }

            State::DirectTranscription { audio } => {
                let outcome = self.transcribe_whole(&audio).await?;
                if outcome.succeeded {
                    return Ok(State::Merging {
                        outcomes: vec![outcome],
                        path: TranscriptionPath::Direct,
                    });
                }
                let detail = outcome.error_detail.unwrap_or_default();
                ctx.logger.warn(&format!(
                    "Direct transcription failed ({}), falling back to chunking",
                    detail
                ));
                self.warnings.push(Degradation::DirectAttemptFailed { detail });
                Ok(State::ChunkedTranscription { audio })
            }

            State::ChunkedTranscription { audio } => {
                let profile = orchestrator.settings.chunking.profile_for(audio.size_bytes);
                let chunker = AdaptiveChunker::new(
                    Arc::clone(&orchestrator.runner),
                    orchestrator.settings.conditioning.sample_rate,
                );
                match chunker
                    .plan_and_materialize(&audio, &profile, ctx.work_dir(), ctx.stage())
                    .await
                {
                    Ok(output) => {
                        self.warnings.extend(output.warnings);
                        let outcomes = self
                            .transcribe_units(&output.chunks, TranscriptionPath::Chunked)
                            .await?;
                        Ok(State::Merging {
                            outcomes,
                            path: TranscriptionPath::Chunked,
                        })
                    }
                    Err(ChunkingError::Cancelled) => Err(TranscribeError::cancelled()),
                    Err(e) => {
                        let err = TranscribeError::from(e);
                        ctx.logger.error(&format!("{}, trying emergency encoding", err));
                        Ok(State::EmergencyFallback { audio })
                    }
                }
            }

            State::EmergencyFallback { audio } => self.emergency(&audio).await,

            State::Merging { outcomes, path } => Ok(State::Done(self.finish(&outcomes, path))),

            State::Done(report) => Ok(State::Done(report)),
        }
    }

    /// Whole-file encode at the emergency bitrate, transcribed directly
    /// when small enough, else chunked again under tighter ceilings.
    async fn emergency(&mut self, audio: &MediaHandle) -> TranscribeResult<State> {
        let orchestrator = self.units.orchestrator;
        let ctx = self.units.ctx;
        let limits = &orchestrator.settings.orchestration;
        let kbps = limits.emergency_bitrate_kbps;
        let sample_rate = limits.emergency_sample_rate;

        let output = ctx.work_dir().join("emergency.mp3");
        let params = Mp3Encode::new(kbps, sample_rate).minimal();
        let invocation = commands::encode_mp3(&audio.path, &output, &params);
        let size = match run_to_file(orchestrator.runner.as_ref(), &invocation, ctx.stage()).await {
            Ok(size) => size,
            Err(ToolError::Cancelled) => return Err(TranscribeError::cancelled()),
            Err(e) => {
                ctx.logger.show_tail("emergency encode");
                return Err(TranscribeError::unrecoverable(format!(
                    "emergency encode failed: {}",
                    e
                )));
            }
        };
        self.warnings.push(Degradation::EmergencyEncoding { kbps });
        let emergency = MediaHandle::new(&output, size, audio.duration_secs, MediaKind::Audio);
        ctx.logger.info(&format!(
            "Emergency file is {:.2} MB at {}kbps",
            emergency.size_mb(),
            kbps
        ));

        let mut profile = orchestrator
            .settings
            .chunking
            .profile_for(size)
            .with_ceilings(limits.emergency_chunk_mb * MIB, limits.emergency_chunk_duration_secs);
        profile.base_bitrate_kbps = kbps;

        if size < limits.emergency_direct_limit_mb * MIB {
            let outcome = self.transcribe_whole(&emergency).await?;
            if outcome.succeeded || !needs_chunking(&emergency, &profile) {
                return Ok(State::Merging {
                    outcomes: vec![outcome],
                    path: TranscriptionPath::Emergency,
                });
            }
            ctx.logger.warn("Emergency file failed to transcribe, chunking it further");
        }

        let chunker = AdaptiveChunker::new(Arc::clone(&orchestrator.runner), sample_rate)
            .with_prefix("emergency");
        match chunker
            .plan_and_materialize(&emergency, &profile, ctx.work_dir(), ctx.stage())
            .await
        {
            Ok(output) => {
                self.warnings.extend(output.warnings);
                let outcomes = self
                    .transcribe_units(&output.chunks, TranscriptionPath::Emergency)
                    .await?;
                Ok(State::Merging {
                    outcomes,
                    path: TranscriptionPath::Emergency,
                })
            }
            Err(ChunkingError::Cancelled) => Err(TranscribeError::cancelled()),
            Err(e) => Err(TranscribeError::unrecoverable(format!(
                "emergency chunking failed: {}",
                e
            ))),
        }
    }

    async fn transcribe_whole(&mut self, audio: &MediaHandle) -> TranscribeResult<TranscriptionOutcome> {
        let unit = self
            .units
            .transcribe(&ChunkResult::passthrough(audio.clone()), 1)
            .await
            .map_err(|_| TranscribeError::cancelled())?;
        self.warnings.extend(unit.warning);
        Ok(unit.outcome)
    }

    /// Transcribe `chunks` with bounded parallelism, returning outcomes in
    /// chunk order.
    ///
    /// On cancellation the finished units are returned inside the error as
    /// a partial report; unfinished ones are listed as failed.
    async fn transcribe_units(
        &mut self,
        chunks: &[ChunkResult],
        path: TranscriptionPath,
    ) -> TranscribeResult<Vec<TranscriptionOutcome>> {
        let units = self.units;
        let total = chunks.len();
        let parallel = units.orchestrator.settings.asr.parallel_chunks.max(1);
        let mut slots: Vec<Option<TranscriptionOutcome>> = vec![None; total];
        let mut cancelled = false;

        let mut results = stream::iter(chunks.iter().enumerate().map(|(slot, chunk)| async move {
            (slot, units.transcribe(chunk, total).await)
        }))
        .buffer_unordered(parallel);

        while let Some((slot, result)) = results.next().await {
            match result {
                Ok(unit) => {
                    self.warnings.extend(unit.warning);
                    slots[slot] = Some(unit.outcome);
                }
                Err(_) => {
                    cancelled = true;
                    break;
                }
            }
        }
        drop(results);

        if cancelled {
            let done = slots.iter().filter(|s| s.is_some()).count();
            units.ctx.logger.warn(&format!(
                "Cancelled with {}/{} units transcribed",
                done, total
            ));
            if done == 0 {
                return Err(TranscribeError::cancelled());
            }
            let outcomes: Vec<TranscriptionOutcome> = slots
                .into_iter()
                .zip(chunks)
                .map(|(slot, chunk)| {
                    slot.unwrap_or_else(|| TranscriptionOutcome::failure(chunk.index, "cancelled"))
                })
                .collect();
            return Err(TranscribeError::cancelled_with(self.finish(&outcomes, path)));
        }

        Ok(slots
            .into_iter()
            .zip(chunks)
            .map(|(slot, chunk)| {
                slot.unwrap_or_else(|| TranscriptionOutcome::failure(chunk.index, "not transcribed"))
            })
            .collect())
    }

    fn finish(&mut self, outcomes: &[TranscriptionOutcome], path: TranscriptionPath) -> TranscriptionReport {
        let mut report = self.units.orchestrator.merger.merge(outcomes);
        report.path = path;
        report.duration_secs = self.duration_secs;
        report.warnings = std::mem::take(&mut self.warnings);
        if !report.is_complete() {
            self.units.ctx.logger.warn(&format!(
                "{} of {} units could not be transcribed",
                report.failed_chunk_indices.len(),
                report.unit_count
            ));
        }
        report
    }
}

/// Result of one unit of recognition work.
struct UnitOutput {
    outcome: TranscriptionOutcome,
    warning: Option<Degradation>,
}

impl UnitOutput {
    fn failed(index: usize, detail: impl Into<String>) -> Self {
        Self {
            outcome: TranscriptionOutcome::failure(index, detail),
            warning: None,
        }
    }
}

/// Borrowed view used by concurrent unit futures.
#[derive(Clone, Copy)]
struct Units<'a> {
    orchestrator: &'a TranscriptionOrchestrator,
    ctx: &'a RequestContext,
    language: Option<&'a str>,
}

impl Units<'_> {
    /// Transcribe one chunk. Only cancellation is an error.
    async fn transcribe(self, chunk: &ChunkResult, total: usize) -> Result<UnitOutput, AsrError> {
        let index = chunk.index;
        let Some(handle) = chunk.handle.as_ref() else {
            self.ctx
                .logger
                .warn(&format!("Unit {}/{} has no audio, skipping", index + 1, total));
            return Ok(UnitOutput::failed(index, "chunk could not be encoded"));
        };
        if self.ctx.is_cancelled() {
            return Err(AsrError::Cancelled);
        }

        let settings = &self.orchestrator.settings;
        let max_bytes = settings.asr.max_bytes;
        let mut path = handle.path.clone();
        let mut warning = None;

        if chunk.size_bytes > max_bytes {
            if let Some((small, size)) = self.compress(handle).await? {
                path = small;
                warning = Some(Degradation::ChunkAggressivelyCompressed {
                    index,
                    size_bytes: size,
                });
            }
        }

        let audio = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.ctx
                    .logger
                    .warn(&format!("Cannot read unit {}: {}", index + 1, e));
                return Ok(UnitOutput::failed(index, format!("cannot read audio: {}", e)));
            }
        };
        if audio.len() as u64 > max_bytes {
            let err = AsrError::PayloadTooLarge(format!(
                "{:.2} MB exceeds the {:.2} MB request limit",
                audio.len() as f64 / MIB as f64,
                max_bytes as f64 / MIB as f64
            ));
            self.ctx
                .logger
                .warn(&format!("Unit {}/{} not sent: {}", index + 1, total, err));
            return Ok(UnitOutput {
                outcome: TranscriptionOutcome::failure(index, err.to_string()),
                warning,
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| handle.file_name());
        self.ctx.logger.info(&format!(
            "Transcribing unit {}/{} ({}, {:.2} MB)",
            index + 1,
            total,
            file_name,
            audio.len() as f64 / MIB as f64
        ));

        let request = UnitRequest {
            index,
            audio: &audio,
            file_name: &file_name,
            language: self.language,
        };
        let outcome = transcribe_with_retry(
            self.orchestrator.asr.as_ref(),
            &self.orchestrator.retry,
            request,
            &self.ctx.cancel,
        )
        .await?;

        if outcome.succeeded {
            self.ctx.logger.debug(&format!(
                "Unit {}/{} returned {} chars",
                index + 1,
                total,
                outcome.text.len()
            ));
        } else {
            self.ctx.logger.warn(&format!(
                "Unit {}/{} failed: {}",
                index + 1,
                total,
                outcome.error_detail.as_deref().unwrap_or("unknown error")
            ));
        }
        Ok(UnitOutput { outcome, warning })
    }

    /// Last-ditch re-encode of an oversized unit at the emergency rate.
    /// Returns the smaller file, or `None` if it did not help.
    async fn compress(self, handle: &MediaHandle) -> Result<Option<(PathBuf, u64)>, AsrError> {
        let limits = &self.orchestrator.settings.orchestration;
        let stem = handle
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unit".to_string());
        let output = self.ctx.work_dir().join(format!("small_{}.mp3", stem));
        let params = Mp3Encode::new(limits.emergency_bitrate_kbps, limits.emergency_sample_rate).minimal();
        let invocation = commands::encode_mp3(&handle.path, &output, &params);

        self.ctx.logger.warn(&format!(
            "{} is still {:.2} MB, compressing to {}kbps",
            handle.file_name(),
            handle.size_mb(),
            limits.emergency_bitrate_kbps
        ));
        match run_to_file(self.orchestrator.runner.as_ref(), &invocation, self.ctx.stage()).await {
            Ok(size) if size < handle.size_bytes => Ok(Some((output, size))),
            Ok(size) => {
                self.ctx
                    .logger
                    .warn(&format!("Compression did not help ({} bytes)", size));
                let _ = tokio::fs::remove_file(&output).await;
                Ok(None)
            }
            Err(ToolError::Cancelled) => Err(AsrError::Cancelled),
            Err(e) => {
                self.ctx.logger.warn(&format!("Compression failed: {}", e));
                Ok(None)
            }
        }
    }
}
