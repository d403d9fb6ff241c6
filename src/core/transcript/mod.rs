//! Transcript reconciliation.
//!
//! Merges incremental per-role text into finalized, deduplicated and
//! normalized [`Turn`](crate::core::realtime::Turn)s.

mod merge;
mod normalize;
mod reconciler;

pub use merge::merge_incremental;
pub use normalize::{
    DEFAULT_MISHEARINGS, DEFAULT_WAKE_WORD, PhraseSubstitution, TranscriptNormalizer,
    default_phrase_substitutions, is_english,
};
pub use reconciler::{DEFAULT_DEDUP_WINDOW_MS, ReconcilerConfig, TranscriptReconciler};
