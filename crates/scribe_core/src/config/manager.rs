//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Validation on load (drops unknown sections, fills defaults)
//! - Preserves comments in untouched sections with toml_edit

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages the settings file.
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Create a manager for the given path. Nothing is read until `load*`.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Changes stay in memory until `save()` or `update_section()`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Consume the manager and return the loaded settings.
    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Load config from file. Fails if the file does not exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        self.settings = toml::from_str(&content)?;
        Ok(())
    }

    /// Load config from file, creating it with defaults if missing.
    ///
    /// Files with unknown sections or missing keys are rewritten.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = parse_validate_and_clean(&content)?;
            self.settings = settings;

            if was_modified {
                tracing::info!("Rewriting config {} with defaults filled in", self.config_path.display());
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
        }
        Ok(())
    }

    /// Create the temp, logs and store directories.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        let paths = &self.settings.paths;
        for dir in [&paths.temp_root, &paths.logs_folder, &paths.store_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Save the entire config atomically.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a single section on disk, leaving the rest of the file as is.
    ///
    /// The file is re-read first so edits made by other sections (or by
    /// hand) survive.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_doc: DocumentMut = self.section_toml(section)?.parse()?;
        doc[section.table_name()] = Item::Table(section_doc.as_table().clone());

        self.atomic_write(&doc.to_string())?;
        Ok(())
    }

    fn section_toml(&self, section: ConfigSection) -> ConfigResult<String> {
        let s = &self.settings;
        let content = match section {
            ConfigSection::Paths => toml::to_string_pretty(&s.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&s.logging)?,
            ConfigSection::Tools => toml::to_string_pretty(&s.tools)?,
            ConfigSection::Conditioning => toml::to_string_pretty(&s.conditioning)?,
            ConfigSection::Chunking => toml::to_string_pretty(&s.chunking)?,
            ConfigSection::Asr => toml::to_string_pretty(&s.asr)?,
            ConfigSection::Orchestration => toml::to_string_pretty(&s.orchestration)?,
        };
        Ok(content)
    }

    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut output = String::new();
        output.push_str("# Scribe Configuration\n");
        output.push_str("# The API key is read from the environment variable named by asr.api_key_env.\n\n");

        for section in ConfigSection::ALL {
            output.push_str(&format!("# {}\n", section.comment()));
            output.push_str(&format!("[{}]\n", section.table_name()));
            for line in self.section_toml(section)?.lines() {
                output.push_str(line);
                output.push('\n');
            }
            output.push('\n');
        }

        Ok(output)
    }

    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.config_path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.config_path)?;
        Ok(())
    }
}

/// Parse content and report whether it differs from a clean rendering.
fn parse_validate_and_clean(content: &str) -> ConfigResult<(Settings, bool)> {
    let doc: DocumentMut = content.parse()?;
    let settings: Settings = toml::from_str(content)?;

    let valid: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
    let has_unknown = doc.iter().any(|(key, _)| !valid.contains(&key));

    // A section missing keys deserializes with defaults; compare key counts
    // against a full rendering to detect that.
    let full: DocumentMut = toml::to_string_pretty(&settings)?.parse()?;
    let missing_keys = full.iter().any(|(name, item)| {
        let expected = item.as_table().map(|t| t.len()).unwrap_or(0);
        let actual = doc
            .get(name)
            .and_then(|i| i.as_table())
            .map(|t| t.len())
            .unwrap_or(0);
        actual < expected
    });

    Ok((settings, has_unknown || missing_keys))
}
