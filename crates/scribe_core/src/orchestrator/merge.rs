//! Reassembly of per-unit transcripts.

use std::collections::BTreeSet;

use crate::models::{TranscriptionOutcome, TranscriptionReport};

/// Longest word run considered a duplicated overlap.
pub const MAX_OVERLAP_WORDS: usize = 12;

/// Merge behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Drop words at the start of a fragment that repeat the end of the
    /// previous fragment.
    pub dedupe_overlap: bool,
}

/// Joins ordered outcomes into one transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptMerger {
    options: MergeOptions,
}

impl TranscriptMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Merge `outcomes`, which must already be in chunk order.
    ///
    /// Successful texts are joined by single spaces. Failed units are
    /// listed (1-based) in a trailing note so a partial transcript is never
    /// mistaken for a complete one.
    pub fn merge(&self, outcomes: &[TranscriptionOutcome]) -> TranscriptionReport {
        let mut fragments: Vec<&str> = Vec::with_capacity(outcomes.len());
        let mut failed = BTreeSet::new();

        for outcome in outcomes {
            if outcome.succeeded {
                fragments.push(&outcome.text);
            } else {
                failed.insert(outcome.index);
            }
        }

        let joined = if self.options.dedupe_overlap {
            join_deduplicated(&fragments)
        } else {
            fragments.join(" ")
        };
        let mut merged_text = collapse_whitespace(&joined);

        if !failed.is_empty() {
            let numbers: Vec<String> = failed.iter().map(|i| (i + 1).to_string()).collect();
            let note = format!(
                "[Note: Some parts of the audio (chunks {}) could not be transcribed.]",
                numbers.join(", ")
            );
            if merged_text.is_empty() {
                merged_text = note;
            } else {
                merged_text.push_str("\n\n");
                merged_text.push_str(&note);
            }
        }

        TranscriptionReport {
            merged_text,
            failed_chunk_indices: failed,
            unit_count: outcomes.len(),
            ..Default::default()
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn join_deduplicated(fragments: &[&str]) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous: Vec<&str> = Vec::new();

    for fragment in fragments {
        let words: Vec<&str> = fragment.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        let skip = overlap_len(&previous, &words);
        if skip > 0 {
            tracing::debug!(words = skip, "Dropping repeated words at chunk boundary");
        }
        out.extend_from_slice(&words[skip..]);
        previous = words;
    }
    out.join(" ")
}

/// Longest `k` such that the last `k` words of `previous` equal the first
/// `k` words of `next`.
fn overlap_len(previous: &[&str], next: &[&str]) -> usize {
    let limit = MAX_OVERLAP_WORDS.min(previous.len()).min(next.len());
    (1..=limit)
        .rev()
        .find(|&k| {
            let tail = &previous[previous.len() - k..];
            let head = &next[..k];
            tail.iter()
                .zip(head)
                .all(|(a, b)| normalize_word(a) == normalize_word(b))
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(index: usize, text: &str) -> TranscriptionOutcome {
        TranscriptionOutcome::success(index, text)
    }

    #[test]
    fn joins_and_collapses_whitespace() {
        let merger = TranscriptMerger::default();
        let report = merger.merge(&[ok(0, "  Hello   there. "), ok(1, "\nGeneral\tKenobi ")]);
        assert_eq!(report.merged_text, "Hello there. General Kenobi");
        assert!(report.is_complete());
        assert_eq!(report.unit_count, 2);
    }

    #[test]
    fn failed_chunks_are_noted_one_based() {
        let merger = TranscriptMerger::default();
        let report = merger.merge(&[
            ok(0, "first"),
            TranscriptionOutcome::failure(1, "rate limited"),
            TranscriptionOutcome::failure(2, "timeout"),
            ok(3, "last"),
        ]);
        assert_eq!(
            report.merged_text,
            "first last\n\n[Note: Some parts of the audio (chunks 2, 3) could not be transcribed.]"
        );
        assert_eq!(report.failed_chunk_indices.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn empty_input_has_no_note() {
        let report = TranscriptMerger::default().merge(&[]);
        assert_eq!(report.merged_text, "");
        assert!(report.is_complete());
    }

    #[test]
    fn all_failed_still_produces_note() {
        let report = TranscriptMerger::default().merge(&[TranscriptionOutcome::failure(0, "x")]);
        assert_eq!(
            report.merged_text,
            "[Note: Some parts of the audio (chunks 1) could not be transcribed.]"
        );
        assert!(!report.is_complete());
    }

    #[test]
    fn merge_is_idempotent() {
        let outcomes = vec![ok(0, "a  b"), TranscriptionOutcome::failure(1, "x"), ok(2, "c")];
        let merger = TranscriptMerger::default();
        assert_eq!(merger.merge(&outcomes), merger.merge(&outcomes));
    }

    #[test]
    fn overlap_is_kept_by_default() {
        let report = TranscriptMerger::default().merge(&[ok(0, "we went to the"), ok(1, "to the store")]);
        assert_eq!(report.merged_text, "we went to the to the store");
    }

    #[test]
    fn dedupe_drops_repeated_boundary_words() {
        let merger = TranscriptMerger::new(MergeOptions { dedupe_overlap: true });
        let report = merger.merge(&[ok(0, "We went to the"), ok(1, "To the, store today.")]);
        assert_eq!(report.merged_text, "We went to the store today.");
    }

    #[test]
    fn dedupe_ignores_unrelated_fragments() {
        let merger = TranscriptMerger::new(MergeOptions { dedupe_overlap: true });
        let report = merger.merge(&[ok(0, "one two"), ok(1, "three four")]);
        assert_eq!(report.merged_text, "one two three four");
    }
}
