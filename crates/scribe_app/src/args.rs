//! Command-line argument parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};

pub const USAGE: &str = "\
Usage: scribe <FILE> [OPTIONS]

Transcribe an audio or video file.

Options:
  -l, --language CODE   Spoken language (ISO code, or 'auto')
  -c, --config PATH     Config file (default: scribe.toml, created if missing)
      --store           Persist the transcript in the configured store
      --json            Print the full report as JSON
  -h, --help            Show this help
  -V, --version         Show version";

/// Default config path, relative to the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("scribe.toml")
}

/// Parsed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Transcribe(Options),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub input: PathBuf,
    pub language: Option<String>,
    pub config: PathBuf,
    pub store: bool,
    pub json: bool,
}

impl Command {
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut input: Option<PathBuf> = None;
        let mut language = None;
        let mut config = None;
        let mut store = false;
        let mut json = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Self::Help),
                "-V" | "--version" => return Ok(Self::Version),
                "-l" | "--language" => {
                    language = Some(value_for(&arg, args.next())?);
                }
                "-c" | "--config" => {
                    config = Some(PathBuf::from(value_for(&arg, args.next())?));
                }
                "--store" => store = true,
                "--json" => json = true,
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    bail!("unknown option '{}'", flag);
                }
                _ => {
                    if let Some(existing) = &input {
                        bail!(
                            "unexpected argument '{}' (input already set to '{}')",
                            arg,
                            existing.display()
                        );
                    }
                    input = Some(PathBuf::from(arg));
                }
            }
        }

        let input = input.ok_or_else(|| anyhow!("missing input file"))?;
        Ok(Self::Transcribe(Options {
            input,
            language,
            config: config.unwrap_or_else(default_config_path),
            store,
            json,
        }))
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.starts_with('-') => Ok(v),
        _ => bail!("option '{}' requires a value", flag),
    }
}
