//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::asr::RetryPolicy;
use crate::logging::LogLevel;
use crate::models::{ConstraintProfile, MIB};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Working directories.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// External tool locations and limits.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Extract / normalize / denoise parameters.
    #[serde(default)]
    pub conditioning: ConditioningSettings,

    /// Chunk sizing.
    #[serde(default)]
    pub chunking: ChunkingSettings,

    /// Speech recognition service.
    #[serde(default)]
    pub asr: AsrSettings,

    /// Tier selection thresholds.
    #[serde(default)]
    pub orchestration: OrchestrationSettings,
}

/// Identifies a config section for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Tools,
    Conditioning,
    Chunking,
    Asr,
    Orchestration,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 7] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Tools,
        ConfigSection::Conditioning,
        ConfigSection::Chunking,
        ConfigSection::Asr,
        ConfigSection::Orchestration,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Tools => "tools",
            ConfigSection::Conditioning => "conditioning",
            ConfigSection::Chunking => "chunking",
            ConfigSection::Asr => "asr",
            ConfigSection::Orchestration => "orchestration",
        }
    }

    /// Comment written above the section in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Working directories",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Tools => "ffmpeg / ffprobe locations and timeouts",
            ConfigSection::Conditioning => "Audio conditioning before recognition",
            ConfigSection::Chunking => "Adaptive chunking limits",
            ConfigSection::Asr => "Speech recognition service",
            ConfigSection::Orchestration => "Direct / chunked / emergency thresholds",
        }
    }
}

/// Path configuration for temp files, logs and stored transcripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder for per-request scratch directories.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Folder where stored transcripts are written.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

fn default_temp_root() -> String {
    ".temp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_store_dir() -> String {
    "transcripts".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            logs_folder: default_logs_folder(),
            store_dir: default_store_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,

    /// Write one log file per transcription request.
    #[serde(default = "default_true")]
    pub request_logs: bool,

    /// Number of tool output lines kept for error diagnosis.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Prefix request log lines with a timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            request_logs: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

/// External tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// ffmpeg executable.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    /// ffprobe executable.
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,

    /// Kill any single tool invocation after this many seconds.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,

    /// RNNoise model used by the arnndn filter.
    #[serde(default = "default_rnnoise_model")]
    pub rnnoise_model: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_tool_timeout() -> u64 {
    600
}

fn default_rnnoise_model() -> String {
    "./rnnoise-models/bd.rnnn".to_string()
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            timeout_secs: default_tool_timeout(),
            rnnoise_model: default_rnnoise_model(),
        }
    }
}

impl ToolSettings {
    /// Per-invocation timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Audio conditioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditioningSettings {
    /// Sample rate of the canonical PCM stream.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Run two-pass loudness normalization.
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Integrated loudness target (LUFS).
    #[serde(default = "default_target_lufs")]
    pub target_lufs: f64,

    /// True peak ceiling (dBTP).
    #[serde(default = "default_true_peak")]
    pub true_peak_db: f64,

    /// Loudness range target (LU).
    #[serde(default = "default_loudness_range")]
    pub loudness_range: f64,

    /// Run noise reduction when the input is noisy.
    #[serde(default = "default_true")]
    pub denoise: bool,

    /// Mean volume above which the input counts as noisy (dB).
    #[serde(default = "default_noise_threshold")]
    pub noise_floor_threshold_db: f64,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_target_lufs() -> f64 {
    -16.0
}

fn default_true_peak() -> f64 {
    -1.5
}

fn default_loudness_range() -> f64 {
    11.0
}

fn default_noise_threshold() -> f64 {
    -25.0
}

impl Default for ConditioningSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            normalize: true,
            target_lufs: default_target_lufs(),
            true_peak_db: default_true_peak(),
            loudness_range: default_loudness_range(),
            denoise: true,
            noise_floor_threshold_db: default_noise_threshold(),
        }
    }
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    /// Chunk size ceiling for ordinary inputs (MiB).
    #[serde(default = "default_max_chunk_mb")]
    pub max_chunk_mb: u64,

    /// Chunk size ceiling for very large inputs (MiB).
    #[serde(default = "default_large_input_chunk_mb")]
    pub large_input_chunk_mb: u64,

    /// Inputs above this size use the smaller chunk ceiling (MiB).
    #[serde(default = "default_large_input_threshold_mb")]
    pub large_input_threshold_mb: u64,

    /// Chunk duration ceiling in seconds.
    #[serde(default = "default_max_chunk_duration")]
    pub max_chunk_duration_secs: u64,

    /// Overlap added on each side of internal boundaries.
    #[serde(default = "default_overlap")]
    pub overlap_secs: f64,

    /// Bitrate for chunks of ordinary length (kbps).
    #[serde(default = "default_base_bitrate")]
    pub base_bitrate_kbps: u32,

    /// Fallback bitrates for oversized chunks (kbps, high to low).
    #[serde(default = "default_ladder")]
    pub bitrate_ladder_kbps: Vec<u32>,

    /// Drop words repeated across chunk boundaries when merging.
    #[serde(default)]
    pub dedupe_overlap: bool,
}

fn default_max_chunk_mb() -> u64 {
    20
}

fn default_large_input_chunk_mb() -> u64 {
    15
}

fn default_large_input_threshold_mb() -> u64 {
    50
}

fn default_max_chunk_duration() -> u64 {
    540
}

fn default_overlap() -> f64 {
    2.0
}

fn default_base_bitrate() -> u32 {
    24
}

fn default_ladder() -> Vec<u32> {
    vec![12, 8, 6]
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chunk_mb: default_max_chunk_mb(),
            large_input_chunk_mb: default_large_input_chunk_mb(),
            large_input_threshold_mb: default_large_input_threshold_mb(),
            max_chunk_duration_secs: default_max_chunk_duration(),
            overlap_secs: default_overlap(),
            base_bitrate_kbps: default_base_bitrate(),
            bitrate_ladder_kbps: default_ladder(),
            dedupe_overlap: false,
        }
    }
}

impl ChunkingSettings {
    /// Build the constraint profile for an input of `input_bytes`.
    ///
    /// Inputs above the large-input threshold get the smaller ceiling.
    pub fn profile_for(&self, input_bytes: u64) -> ConstraintProfile {
        let chunk_mb = if input_bytes > self.large_input_threshold_mb * MIB {
            self.large_input_chunk_mb
        } else {
            self.max_chunk_mb
        };
        ConstraintProfile {
            max_bytes: chunk_mb * MIB,
            max_duration_secs: self.max_chunk_duration_secs,
            overlap_secs: self.overlap_secs.max(0.0),
            base_bitrate_kbps: self.base_bitrate_kbps,
            bitrate_ladder_kbps: self.bitrate_ladder_kbps.clone(),
        }
    }
}

/// Which ASR backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrProvider {
    /// OpenAI-compatible transcription endpoint.
    #[default]
    OpenAi,
    /// Canned transcript, no network.
    Demo,
}

/// Speech recognition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrSettings {
    /// Backend selection.
    #[serde(default)]
    pub provider: AsrProvider,

    /// Model name sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Transcription endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Hard request size limit of the service (bytes).
    #[serde(default = "default_asr_max_bytes")]
    pub max_bytes: u64,

    /// Duration the service accepts per request (seconds).
    #[serde(default = "default_asr_max_duration")]
    pub max_duration_secs: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Additional attempts after the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Rate-limit backoff grows by this many seconds per retry.
    #[serde(default = "default_rate_limit_step")]
    pub rate_limit_step_secs: u64,

    /// Upper bound on a single rate-limit wait.
    #[serde(default = "default_rate_limit_cap")]
    pub rate_limit_cap_secs: u64,

    /// Wait before retrying any other transient error.
    #[serde(default = "default_transient_delay")]
    pub transient_delay_secs: u64,

    /// Chunks transcribed concurrently (1 = strictly sequential).
    #[serde(default = "default_parallel_chunks")]
    pub parallel_chunks: usize,
}

fn default_model() -> String {
    "whisper-1".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/audio/transcriptions".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_asr_max_bytes() -> u64 {
    25 * MIB
}

fn default_asr_max_duration() -> u64 {
    600
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_rate_limit_step() -> u64 {
    5
}

fn default_rate_limit_cap() -> u64 {
    30
}

fn default_transient_delay() -> u64 {
    2
}

fn default_parallel_chunks() -> usize {
    1
}

impl Default for AsrSettings {
    fn default() -> Self {
        Self {
            provider: AsrProvider::OpenAi,
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            max_bytes: default_asr_max_bytes(),
            max_duration_secs: default_asr_max_duration(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
            rate_limit_step_secs: default_rate_limit_step(),
            rate_limit_cap_secs: default_rate_limit_cap(),
            transient_delay_secs: default_transient_delay(),
            parallel_chunks: default_parallel_chunks(),
        }
    }
}

impl AsrSettings {
    /// Retry policy applied to every ASR call.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            rate_limit_step: Duration::from_secs(self.rate_limit_step_secs),
            rate_limit_cap: Duration::from_secs(self.rate_limit_cap_secs),
            transient_delay: Duration::from_secs(self.transient_delay_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

/// Thresholds that pick the transcription tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationSettings {
    /// Conditioned files above this size are always chunked (MiB).
    #[serde(default = "default_force_chunk_mb")]
    pub force_chunk_mb: u64,

    /// Conditioned files longer than this are always chunked (seconds).
    #[serde(default = "default_force_chunk_duration")]
    pub force_chunk_duration_secs: u64,

    /// Bitrate of the emergency and last-ditch chunk encodings (kbps).
    #[serde(default = "default_emergency_bitrate")]
    pub emergency_bitrate_kbps: u32,

    /// Sample rate of the emergency encodings.
    #[serde(default = "default_emergency_sample_rate")]
    pub emergency_sample_rate: u32,

    /// Emergency file is sent directly only below this size (MiB).
    #[serde(default = "default_emergency_direct_limit")]
    pub emergency_direct_limit_mb: u64,

    /// Chunk size ceiling for emergency re-chunking (MiB).
    #[serde(default = "default_emergency_chunk_mb")]
    pub emergency_chunk_mb: u64,

    /// Chunk duration ceiling for emergency re-chunking (seconds).
    #[serde(default = "default_emergency_chunk_duration")]
    pub emergency_chunk_duration_secs: u64,
}

fn default_force_chunk_mb() -> u64 {
    20
}

fn default_force_chunk_duration() -> u64 {
    600
}

fn default_emergency_bitrate() -> u32 {
    8
}

fn default_emergency_sample_rate() -> u32 {
    8000
}

fn default_emergency_direct_limit() -> u64 {
    20
}

fn default_emergency_chunk_mb() -> u64 {
    10
}

fn default_emergency_chunk_duration() -> u64 {
    300
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            force_chunk_mb: default_force_chunk_mb(),
            force_chunk_duration_secs: default_force_chunk_duration(),
            emergency_bitrate_kbps: default_emergency_bitrate(),
            emergency_sample_rate: default_emergency_sample_rate(),
            emergency_direct_limit_mb: default_emergency_direct_limit(),
            emergency_chunk_mb: default_emergency_chunk_mb(),
            emergency_chunk_duration_secs: default_emergency_chunk_duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.chunking.max_chunk_duration_secs, 540);
        assert_eq!(settings.chunking.bitrate_ladder_kbps, vec![12, 8, 6]);
        assert_eq!(settings.asr.max_bytes, 25 * MIB);
        assert_eq!(settings.asr.max_retries, 3);
        assert_eq!(settings.orchestration.emergency_chunk_duration_secs, 300);
        assert_eq!(settings.conditioning.target_lufs, -16.0);
    }

    #[test]
    fn large_inputs_get_smaller_chunks() {
        let chunking = ChunkingSettings::default();
        assert_eq!(chunking.profile_for(40 * MIB).max_bytes, 20 * MIB);
        assert_eq!(chunking.profile_for(60 * MIB).max_bytes, 15 * MIB);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str("[asr]\nprovider = \"demo\"\nmax_retries = 1\n").unwrap();
        assert_eq!(settings.asr.provider, AsrProvider::Demo);
        assert_eq!(settings.asr.max_retries, 1);
        assert_eq!(settings.asr.model, "whisper-1");
        assert_eq!(settings.paths.temp_root, ".temp");
    }

    #[test]
    fn retry_policy_from_settings() {
        let policy = AsrSettings::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.rate_limit_step, Duration::from_secs(5));
        assert_eq!(policy.rate_limit_cap, Duration::from_secs(30));
        assert_eq!(policy.transient_delay, Duration::from_secs(2));
    }
}
