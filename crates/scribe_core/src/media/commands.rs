//! ffmpeg / ffprobe command builders and output parsers.
//!
//! Builders are pure: they only assemble argument lists. Parsers read the
//! text ffmpeg prints on its diagnostic stream.

use std::path::Path;

use serde::Deserialize;

use super::runner::{Invocation, Tool};
use crate::config::ConditioningSettings;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn ffmpeg(args: Vec<String>, output: Option<&Path>) -> Invocation {
    let mut full = vec!["-hide_banner".to_string(), "-nostdin".to_string(), "-y".to_string()];
    full.extend(args);
    Invocation::new(Tool::Ffmpeg, full, output.map(Path::to_path_buf))
}

// =============================================================================
// Conditioning
// =============================================================================

/// Loudness normalization targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessTarget {
    /// Integrated loudness (LUFS).
    pub integrated: f64,
    /// True peak ceiling (dBTP).
    pub true_peak: f64,
    /// Loudness range (LU).
    pub range: f64,
}

impl LoudnessTarget {
    pub fn from_settings(settings: &ConditioningSettings) -> Self {
        Self {
            integrated: settings.target_lufs,
            true_peak: settings.true_peak_db,
            range: settings.loudness_range,
        }
    }

    fn filter_prefix(&self) -> String {
        format!("loudnorm=I={}:TP={}:LRA={}", self.integrated, self.true_peak, self.range)
    }
}

/// Decode any input to mono 16-bit PCM WAV.
pub fn extract_pcm(input: &Path, output: &Path, sample_rate: u32) -> Invocation {
    ffmpeg(
        vec![
            "-i".into(),
            path_arg(input),
            "-vn".into(),
            "-ar".into(),
            sample_rate.to_string(),
            "-ac".into(),
            "1".into(),
            "-sample_fmt".into(),
            "s16".into(),
            path_arg(output),
        ],
        Some(output),
    )
}

/// First loudnorm pass: measure only, statistics go to stderr as JSON.
pub fn loudnorm_measure(input: &Path, target: &LoudnessTarget) -> Invocation {
    ffmpeg(
        vec![
            "-i".into(),
            path_arg(input),
            "-af".into(),
            format!("{}:print_format=json", target.filter_prefix()),
            "-f".into(),
            "null".into(),
            "-".into(),
        ],
        None,
    )
}

/// Second loudnorm pass using the first pass's measurements.
pub fn loudnorm_apply(
    input: &Path,
    output: &Path,
    target: &LoudnessTarget,
    stats: &LoudnormStats,
    sample_rate: u32,
) -> Invocation {
    let filter = format!(
        "{}:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:offset={}:linear=true:print_format=json",
        target.filter_prefix(),
        stats.input_i,
        stats.input_tp,
        stats.input_lra,
        stats.input_thresh,
        stats.target_offset,
    );
    ffmpeg(
        vec![
            "-i".into(),
            path_arg(input),
            "-af".into(),
            filter,
            "-ar".into(),
            sample_rate.to_string(),
            "-ac".into(),
            "1".into(),
            path_arg(output),
        ],
        Some(output),
    )
}

/// Plain transcode/copy, used when a filter stage cannot run.
pub fn copy(input: &Path, output: &Path) -> Invocation {
    ffmpeg(vec!["-i".into(), path_arg(input), path_arg(output)], Some(output))
}

/// Measure mean volume.
pub fn volume_detect(input: &Path) -> Invocation {
    ffmpeg(
        vec![
            "-i".into(),
            path_arg(input),
            "-af".into(),
            "volumedetect".into(),
            "-f".into(),
            "null".into(),
            "-".into(),
        ],
        None,
    )
}

/// List the filters compiled into ffmpeg.
pub fn list_filters() -> Invocation {
    Invocation::new(Tool::Ffmpeg, vec!["-hide_banner".into(), "-filters".into()], None)
}

/// Noise reduction filter chain.
#[derive(Debug, Clone, PartialEq)]
pub enum DenoiseFilter {
    /// RNNoise neural denoiser with a model file.
    Neural { model: String },
    /// High-pass plus non-local-means denoiser.
    Classic,
}

impl DenoiseFilter {
    pub fn filter_graph(&self) -> String {
        match self {
            DenoiseFilter::Neural { model } => format!("arnndn=m={}", model),
            DenoiseFilter::Classic => "highpass=f=200,anlmdn".to_string(),
        }
    }
}

pub fn denoise(input: &Path, output: &Path, filter: &DenoiseFilter) -> Invocation {
    ffmpeg(
        vec![
            "-i".into(),
            path_arg(input),
            "-af".into(),
            filter.filter_graph(),
            path_arg(output),
        ],
        Some(output),
    )
}

// =============================================================================
// Encoding
// =============================================================================

/// MP3 encode parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Mp3Encode {
    /// Time range `[start, end]` in seconds; `None` encodes everything.
    pub range: Option<(f64, f64)>,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    /// Strip metadata and use the lowest VBR quality.
    pub minimal: bool,
}

impl Mp3Encode {
    pub fn new(bitrate_kbps: u32, sample_rate: u32) -> Self {
        Self {
            range: None,
            bitrate_kbps,
            sample_rate,
            minimal: false,
        }
    }

    pub fn range(mut self, start_secs: f64, end_secs: f64) -> Self {
        self.range = Some((start_secs, end_secs));
        self
    }

    pub fn minimal(mut self) -> Self {
        self.minimal = true;
        self
    }
}

/// Mono libmp3lame encode, optionally restricted to a time range.
pub fn encode_mp3(input: &Path, output: &Path, params: &Mp3Encode) -> Invocation {
    let mut args = vec!["-i".to_string(), path_arg(input)];
    if let Some((start, end)) = params.range {
        args.extend([
            "-ss".to_string(),
            format!("{:.3}", start),
            "-to".to_string(),
            format!("{:.3}", end),
        ]);
    }
    args.push("-vn".into());
    if params.minimal {
        args.extend(["-map_metadata".to_string(), "-1".to_string()]);
    }
    args.extend([
        "-ac".to_string(),
        "1".to_string(),
        "-ar".to_string(),
        params.sample_rate.to_string(),
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        format!("{}k", params.bitrate_kbps),
    ]);
    if params.minimal {
        args.extend(["-q:a".to_string(), "9".to_string()]);
    }
    args.push(path_arg(output));
    ffmpeg(args, Some(output))
}

// =============================================================================
// Probing
// =============================================================================

/// Structured duration and stream types.
pub fn probe_format(input: &Path) -> Invocation {
    Invocation::new(
        Tool::Ffprobe,
        vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration:stream=codec_type".into(),
            "-of".into(),
            "json".into(),
            path_arg(input),
        ],
        None,
    )
}

/// Input-only ffmpeg run whose banner carries a `Duration:` line.
///
/// ffmpeg exits non-zero here (no output given); only stderr matters.
pub fn probe_banner(input: &Path) -> Invocation {
    Invocation::new(
        Tool::Ffmpeg,
        vec!["-nostdin".into(), "-i".into(), path_arg(input), "-hide_banner".into()],
        None,
    )
}

// =============================================================================
// Parsers
// =============================================================================

/// First-pass loudnorm measurements, kept as printed by ffmpeg.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoudnormStats {
    pub input_i: String,
    pub input_tp: String,
    pub input_lra: String,
    pub input_thresh: String,
    pub target_offset: String,
}

impl LoudnormStats {
    fn is_finite(&self) -> bool {
        [
            &self.input_i,
            &self.input_tp,
            &self.input_lra,
            &self.input_thresh,
            &self.target_offset,
        ]
        .iter()
        .all(|v| v.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false))
    }
}

/// Extract the loudnorm JSON block from the end of stderr.
///
/// Silent inputs report `-inf`; those are rejected since the second pass
/// cannot use them.
pub fn parse_loudnorm_stats(stderr: &str) -> Option<LoudnormStats> {
    let start = stderr.rfind('{')?;
    let end = stderr.rfind('}')?;
    if end < start {
        return None;
    }
    let stats: LoudnormStats = serde_json::from_str(&stderr[start..=end]).ok()?;
    stats.is_finite().then_some(stats)
}

/// Parse `mean_volume: -31.2 dB` from volumedetect output.
pub fn parse_mean_volume(stderr: &str) -> Option<f64> {
    let rest = &stderr[stderr.find("mean_volume:")? + "mean_volume:".len()..];
    let value = rest.split_whitespace().next()?;
    value.parse().ok()
}

/// Parse `Duration: HH:MM:SS.xx` from the ffmpeg banner.
pub fn parse_banner_duration(stderr: &str) -> Option<f64> {
    let rest = &stderr[stderr.find("Duration:")? + "Duration:".len()..];
    let stamp = rest.trim_start().split([',', ' ']).next()?;

    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parsed ffprobe output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub duration_secs: Option<f64>,
    pub has_video: bool,
}

#[derive(Deserialize)]
struct FfprobeJson {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
}

pub fn parse_ffprobe(stdout: &str) -> Option<ProbeInfo> {
    let parsed: FfprobeJson = serde_json::from_str(stdout).ok()?;
    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite());
    let has_video = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("video"));
    Some(ProbeInfo {
        duration_secs,
        has_video,
    })
}

/// Whether `ffmpeg -filters` output lists `name`.
pub fn has_filter(filters_output: &str, name: &str) -> bool {
    filters_output
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}
