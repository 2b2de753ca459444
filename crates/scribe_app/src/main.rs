//! Scribe - command-line entry point
//!
//! Handles:
//! - Configuration loading (defaults are written on first run)
//! - Application-level logging initialization
//! - Ctrl-C cancellation
//! - Printing the transcript or the JSON report

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use scribe_core::config::{ConfigManager, Settings};
use scribe_core::logging::init_tracing;
use scribe_core::models::TranscriptionReport;
use scribe_core::orchestrator::{TranscribeError, TranscriptionOrchestrator};
use scribe_core::storage::{JsonFileStore, ServiceError, TranscriptionService};

mod args;

use args::{Command, Options, USAGE};

#[tokio::main]
async fn main() -> ExitCode {
    let opts = match Command::parse(std::env::args().skip(1)) {
        Ok(Command::Transcribe(opts)) => opts,
        Ok(Command::Help) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Ok(Command::Version) => {
            println!("scribe {}", scribe_core::version());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            return ExitCode::from(2);
        }
    };

    match run(opts).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(opts: Options) -> Result<()> {
    // Config first: it names the logs directory
    let mut config_manager = ConfigManager::new(&opts.config);
    if let Err(e) = config_manager.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }

    let logs_dir = PathBuf::from(&config_manager.settings().paths.logs_folder);
    let _log_guard = init_tracing(config_manager.settings().logging.level, Some(&logs_dir));

    tracing::info!("Scribe starting");
    tracing::info!("Config: {}", opts.config.display());
    tracing::info!("Core version: {}", scribe_core::version());

    if let Err(e) = config_manager.ensure_dirs_exist() {
        tracing::error!("Failed to create directories: {}", e);
        eprintln!("Warning: Failed to create directories: {}", e);
    }
    let settings = config_manager.into_settings();

    let orchestrator = TranscriptionOrchestrator::from_settings(settings.clone())
        .context("Failed to set up the transcription pipeline")?;
    tracing::info!("ASR provider: {}", orchestrator.asr_name());

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let language = opts.language.as_deref();
    if opts.store {
        transcribe_and_store(&opts, &settings, orchestrator, language, cancel).await
    } else {
        match orchestrator.run_transcription(&opts.input, language, cancel).await {
            Ok(report) => print_report(&report, opts.json),
            Err(e) => Err(report_failure(e, opts.json)),
        }
    }
}

async fn transcribe_and_store(
    opts: &Options,
    settings: &Settings,
    orchestrator: TranscriptionOrchestrator,
    language: Option<&str>,
    cancel: CancellationToken,
) -> Result<()> {
    let store = Arc::new(JsonFileStore::new(&settings.paths.store_dir));
    let service = TranscriptionService::new(Arc::new(orchestrator), store);

    let original_name = display_name(&opts.input);
    match service
        .process_and_store(&opts.input, &original_name, language, cancel)
        .await
    {
        Ok(stored) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&stored)?);
            } else {
                println!("{}", stored.transcript);
                print_warnings(&stored.report);
                eprintln!(
                    "Stored transcript {} in {}",
                    stored.transcript_id, settings.paths.store_dir
                );
            }
            Ok(())
        }
        Err(ServiceError::Transcribe(e)) => Err(report_failure(e, opts.json)),
        Err(e) => Err(e.into()),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            eprintln!("Cancelling...");
            cancel.cancel();
        }
    });
}

fn print_report(report: &TranscriptionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.merged_text);
        print_warnings(report);
    }
    Ok(())
}

fn print_warnings(report: &TranscriptionReport) {
    if report.warnings.is_empty() {
        return;
    }
    eprintln!("Completed via {} path with warnings:", report.path);
    for warning in &report.warnings {
        eprintln!("  - {}", warning);
    }
}

/// Print whatever a cancelled run produced, then hand back the error.
fn report_failure(error: TranscribeError, json: bool) -> anyhow::Error {
    if let Some(partial) = error.partial_report() {
        eprintln!("Partial transcript ({} of {} units):", partial_done(partial), partial.unit_count);
        if let Err(e) = print_report(partial, json) {
            tracing::error!("Failed to print partial report: {}", e);
        }
    }
    error.into()
}

fn partial_done(report: &TranscriptionReport) -> usize {
    report
        .unit_count
        .saturating_sub(report.failed_chunk_indices.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_uses_file_name() {
        assert_eq!(display_name(Path::new("/media/in/Talk.MP4")), "Talk.MP4");
        assert_eq!(display_name(Path::new("/")), "/");
    }

    #[test]
    fn partial_done_counts_successes() {
        let mut report = TranscriptionReport {
            unit_count: 4,
            ..Default::default()
        };
        report.failed_chunk_indices.insert(1);
        report.failed_chunk_indices.insert(3);
        assert_eq!(partial_done(&report), 2);
    }
}
