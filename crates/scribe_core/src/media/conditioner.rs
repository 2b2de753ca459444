//! Extract, normalize and denoise audio before recognition.
//!
//! Only extraction is fatal. Normalization and noise reduction fall back
//! to passing their input through and record a [`Degradation`] instead.

use std::path::Path;
use std::sync::Arc;

use super::commands::{self, DenoiseFilter, LoudnessTarget};
use super::runner::{run_checked, run_to_file, StageContext, ToolError, ToolRunner};
use super::{MediaError, MediaResult};
use crate::config::ConditioningSettings;
use crate::models::{Degradation, MediaHandle, MediaKind};

const EXTRACTED_NAME: &str = "extracted.wav";
const NORMALIZED_NAME: &str = "normalized.wav";
const DENOISED_NAME: &str = "denoised.wav";

/// Output of the conditioning pipeline.
#[derive(Debug, Clone)]
pub struct ConditionedAudio {
    /// Final mono PCM file.
    pub handle: MediaHandle,
    /// Stages that fell back to pass-through.
    pub warnings: Vec<Degradation>,
}

/// Runs the extract → normalize → denoise chain.
pub struct AudioConditioner {
    runner: Arc<dyn ToolRunner>,
    settings: ConditioningSettings,
    rnnoise_model: String,
}

impl AudioConditioner {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        settings: ConditioningSettings,
        rnnoise_model: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            settings,
            rnnoise_model: rnnoise_model.into(),
        }
    }

    /// Condition `input`, writing intermediates into `work_dir`.
    ///
    /// Superseded intermediates are deleted as soon as the next stage
    /// produces its file.
    pub async fn condition(
        &self,
        input: &MediaHandle,
        work_dir: &Path,
        ctx: StageContext<'_>,
    ) -> MediaResult<ConditionedAudio> {
        let mut warnings = Vec::new();

        let extracted = self.extract(input, work_dir, ctx).await?;

        let normalized = if self.settings.normalize {
            self.normalize(&extracted, work_dir, ctx, &mut warnings).await?
        } else {
            extracted.clone()
        };
        discard_superseded(&extracted, &normalized).await;

        let denoised = if self.settings.denoise {
            self.denoise(&normalized, work_dir, ctx, &mut warnings).await?
        } else {
            normalized.clone()
        };
        discard_superseded(&normalized, &denoised).await;

        ctx.logger.info(&format!(
            "Conditioned audio: {} ({:.2} MB)",
            denoised.file_name(),
            denoised.size_mb()
        ));
        Ok(ConditionedAudio {
            handle: denoised,
            warnings,
        })
    }

    async fn extract(
        &self,
        input: &MediaHandle,
        work_dir: &Path,
        ctx: StageContext<'_>,
    ) -> MediaResult<MediaHandle> {
        let output = work_dir.join(EXTRACTED_NAME);
        let invocation = commands::extract_pcm(&input.path, &output, self.settings.sample_rate);

        match run_to_file(self.runner.as_ref(), &invocation, ctx).await {
            Ok(size) => Ok(derived(&output, size, input)),
            Err(ToolError::Cancelled) => Err(MediaError::Cancelled),
            Err(e) => {
                ctx.logger.show_tail("extract");
                Err(MediaError::ExtractionFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn normalize(
        &self,
        input: &MediaHandle,
        work_dir: &Path,
        ctx: StageContext<'_>,
        warnings: &mut Vec<Degradation>,
    ) -> MediaResult<MediaHandle> {
        let target = LoudnessTarget::from_settings(&self.settings);
        let output = work_dir.join(NORMALIZED_NAME);

        let measure = commands::loudnorm_measure(&input.path, &target);
        let reason = match run_checked(self.runner.as_ref(), &measure, ctx).await {
            Ok(out) => match commands::parse_loudnorm_stats(&out.stderr) {
                Some(stats) => {
                    let apply = commands::loudnorm_apply(
                        &input.path,
                        &output,
                        &target,
                        &stats,
                        self.settings.sample_rate,
                    );
                    match run_to_file(self.runner.as_ref(), &apply, ctx).await {
                        Ok(size) => return Ok(derived(&output, size, input)),
                        Err(e) => absorb(e)?,
                    }
                }
                None => "loudness measurement could not be parsed".to_string(),
            },
            Err(e) => absorb(e)?,
        };

        ctx.logger.warn(&format!("Loudness normalization failed: {}", reason));
        warnings.push(Degradation::NormalizationSkipped {
            reason: reason.clone(),
        });

        let fallback = commands::copy(&input.path, &output);
        match run_to_file(self.runner.as_ref(), &fallback, ctx).await {
            Ok(size) => Ok(derived(&output, size, input)),
            Err(e) => {
                let detail = absorb(e)?;
                ctx.logger.warn(&format!("Copy fallback failed, keeping input: {}", detail));
                Ok(input.clone())
            }
        }
    }

    async fn denoise(
        &self,
        input: &MediaHandle,
        work_dir: &Path,
        ctx: StageContext<'_>,
        warnings: &mut Vec<Degradation>,
    ) -> MediaResult<MediaHandle> {
        let measure = commands::volume_detect(&input.path);
        let mean_volume = match run_checked(self.runner.as_ref(), &measure, ctx).await {
            Ok(out) => commands::parse_mean_volume(&out.stderr),
            Err(e) => {
                let detail = absorb(e)?;
                ctx.logger.debug(&format!("Volume detection failed: {}", detail));
                None
            }
        };

        let Some(mean_volume) = mean_volume else {
            ctx.logger.debug("Mean volume unknown, skipping noise reduction");
            return Ok(input.clone());
        };
        if mean_volume <= self.settings.noise_floor_threshold_db {
            ctx.logger.debug(&format!(
                "Mean volume {:.1} dB within threshold, no noise reduction",
                mean_volume
            ));
            return Ok(input.clone());
        }

        ctx.logger.info(&format!("Mean volume {:.1} dB, applying noise reduction", mean_volume));
        let output = work_dir.join(DENOISED_NAME);
        let mut last_error = String::new();
        for filter in self.denoise_filters(ctx).await? {
            let invocation = commands::denoise(&input.path, &output, &filter);
            match run_to_file(self.runner.as_ref(), &invocation, ctx).await {
                Ok(size) => return Ok(derived(&output, size, input)),
                Err(e) => last_error = absorb(e)?,
            }
        }

        ctx.logger.warn(&format!("Noise reduction failed: {}", last_error));
        warnings.push(Degradation::DenoiseSkipped { reason: last_error });
        Ok(input.clone())
    }

    /// Filters to try in order: the neural one when ffmpeg has `arnndn`
    /// and the model file exists, then the classic chain.
    async fn denoise_filters(&self, ctx: StageContext<'_>) -> MediaResult<Vec<DenoiseFilter>> {
        let listing = match run_checked(self.runner.as_ref(), &commands::list_filters(), ctx).await {
            Ok(out) => out.stdout,
            Err(e) => {
                absorb(e)?;
                String::new()
            }
        };

        let mut filters = Vec::with_capacity(2);
        if commands::has_filter(&listing, "arnndn") && Path::new(&self.rnnoise_model).exists() {
            filters.push(DenoiseFilter::Neural {
                model: self.rnnoise_model.clone(),
            });
        }
        filters.push(DenoiseFilter::Classic);
        Ok(filters)
    }
}

/// Propagate cancellation, turn anything else into a reason string.
fn absorb(err: ToolError) -> MediaResult<String> {
    if err.is_cancelled() {
        Err(MediaError::Cancelled)
    } else {
        Ok(err.to_string())
    }
}

fn derived(path: &Path, size: u64, source: &MediaHandle) -> MediaHandle {
    MediaHandle::new(path, size, source.duration_secs, MediaKind::Audio)
}

async fn discard_superseded(previous: &MediaHandle, current: &MediaHandle) {
    if previous.path != current.path {
        let _ = tokio::fs::remove_file(&previous.path).await;
    }
}
