//! Configuration management for Scribe.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use scribe_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new("scribe.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Chunk ceiling: {} MiB", config.settings().chunking.max_chunk_mb);
//!
//! config.settings_mut().asr.parallel_chunks = 2;
//! config.update_section(ConfigSection::Asr).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    AsrProvider, AsrSettings, ChunkingSettings, ConditioningSettings, ConfigSection,
    LoggingSettings, OrchestrationSettings, PathSettings, Settings, ToolSettings,
};
