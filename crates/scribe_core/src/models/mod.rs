//! Data models for Scribe.
//!
//! Plain records passed by value between pipeline components:
//! - Media handles and kinds (what a pipeline stage produced)
//! - Constraint profiles and chunk plans (how a file gets split)
//! - Per-unit outcomes and the final transcription report
//! - Supported input format tables

pub mod formats;
mod media;
mod plan;
mod transcript;

pub use media::{MediaHandle, MediaKind, MIB};
pub use plan::{ChunkPlan, ChunkResult, ChunkSpec, ConstraintProfile};
pub use transcript::{Degradation, TranscriptionOutcome, TranscriptionPath, TranscriptionReport};
