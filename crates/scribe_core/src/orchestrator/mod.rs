//! Transcription orchestration.
//!
//! [`TranscriptionOrchestrator`] runs one request through a small state
//! machine. Each request gets its own [`RequestContext`] (work directory,
//! logger, cancellation token), so concurrent requests share nothing.
//!
//! # Example
//!
//! ```no_run
//! use scribe_core::config::Settings;
//! use scribe_core::orchestrator::TranscriptionOrchestrator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = TranscriptionOrchestrator::from_settings(Settings::default())?;
//! let report = orchestrator
//!     .run_transcription("talk.mp4".as_ref(), Some("en"), CancellationToken::new())
//!     .await?;
//! println!("{}", report.merged_text);
//! # Ok(())
//! # }
//! ```

mod context;
mod errors;
mod merge;
mod pipeline;

pub use context::RequestContext;
pub use errors::{TranscribeError, TranscribeResult};
pub use merge::{MergeOptions, TranscriptMerger, MAX_OVERLAP_WORDS};
pub use pipeline::TranscriptionOrchestrator;
