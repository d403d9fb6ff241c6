use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::merge::merge_incremental;
use super::normalize::{
    DEFAULT_MISHEARINGS, DEFAULT_WAKE_WORD, PhraseSubstitution, TranscriptNormalizer,
    default_phrase_substitutions,
};
use crate::core::realtime::{DEFAULT_TRANSCRIPTION_LANGUAGE, RealtimeResult, TranscriptRole, Turn};

/// Default window during which an identical turn is treated as a duplicate.
pub const DEFAULT_DEDUP_WINDOW_MS: u64 = 2500;

/// Number of finalized assistant response ids remembered.
const FINALIZED_RESPONSE_HISTORY: usize = 64;

/// Reconciler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Duplicate suppression window in milliseconds
    pub dedup_window_ms: u64,
    /// Canonical spelling of the assistant's name
    pub wake_word: String,
    /// Mishearings rewritten to the wake word
    pub mishearings: Vec<String>,
    /// Literal phrase rewrites
    pub phrase_substitutions: Vec<PhraseSubstitution>,
    /// Expected transcription language; `None` disables the language guard
    pub expected_language: Option<String>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
            wake_word: DEFAULT_WAKE_WORD.to_string(),
            mishearings: DEFAULT_MISHEARINGS.iter().map(|s| s.to_string()).collect(),
            phrase_substitutions: default_phrase_substitutions(),
            expected_language: Some(DEFAULT_TRANSCRIPTION_LANGUAGE.to_string()),
        }
    }
}

/// Last emission per role, used to drop repeated deliveries.
#[derive(Debug, Clone)]
struct DedupRecord {
    last_normalized_text: String,
    last_emit: Instant,
}

/// Turns a noisy stream of transcript events into a clean conversation log.
///
/// Two paths produce turns:
/// - delta fragments accumulate in a per-role pending buffer that is flushed
///   on a finalization event
/// - complete conversation items bypass the buffer and discard whatever
///   partial text it holds for that role
///
/// Both paths share the dedup, normalize, language-check pipeline.
#[derive(Debug)]
pub struct TranscriptReconciler {
    normalizer: TranscriptNormalizer,
    dedup_window: Duration,
    pending: HashMap<TranscriptRole, String>,
    dedup: HashMap<TranscriptRole, DedupRecord>,
    finalized_responses: VecDeque<String>,
    turns: Vec<Turn>,
}

impl TranscriptReconciler {
    pub fn new(config: &ReconcilerConfig) -> RealtimeResult<Self> {
        let normalizer = TranscriptNormalizer::new(
            &config.wake_word,
            &config.mishearings,
            &config.phrase_substitutions,
            config.expected_language.as_deref(),
        )?;
        Ok(Self::with_normalizer(
            normalizer,
            Duration::from_millis(config.dedup_window_ms),
        ))
    }

    pub fn with_normalizer(normalizer: TranscriptNormalizer, dedup_window: Duration) -> Self {
        Self {
            normalizer,
            dedup_window,
            pending: HashMap::new(),
            dedup: HashMap::new(),
            finalized_responses: VecDeque::new(),
            turns: Vec::new(),
        }
    }

    /// Merge an incremental fragment into the role's pending buffer.
    pub fn append_delta(&mut self, role: TranscriptRole, fragment: &str) {
        let buffer = self.pending.entry(role).or_default();
        *buffer = merge_incremental(buffer, fragment);
        trace!("Pending {} text: {}", role, buffer);
    }

    /// Merge the final fragment into the pending buffer and flush it.
    pub fn finalize(&mut self, role: TranscriptRole, final_text: &str, now: Instant) -> Option<Turn> {
        let buffered = self.pending.remove(&role).unwrap_or_default();
        let text = merge_incremental(&buffered, final_text);
        self.emit(role, &text, now)
    }

    /// Finalize assistant text for a response.
    ///
    /// Only the first finalization per response id produces a turn; later
    /// variants for the same response only clear the buffer.
    pub fn finalize_assistant(
        &mut self,
        response_id: Option<&str>,
        final_text: &str,
        now: Instant,
    ) -> Option<Turn> {
        if let Some(id) = response_id
            && self.finalized_responses.iter().any(|done| done == id)
        {
            debug!("Response {} already finalized, clearing assistant buffer", id);
            self.pending.remove(&TranscriptRole::Assistant);
            return None;
        }

        let buffered = self
            .pending
            .remove(&TranscriptRole::Assistant)
            .unwrap_or_default();
        let text = merge_incremental(&buffered, final_text);
        if text.is_empty() {
            return None;
        }

        if let Some(id) = response_id {
            if self.finalized_responses.len() >= FINALIZED_RESPONSE_HISTORY {
                self.finalized_responses.pop_front();
            }
            self.finalized_responses.push_back(id.to_string());
        }
        self.emit(TranscriptRole::Assistant, &text, now)
    }

    /// Emit a directly delivered complete item.
    ///
    /// The complete item wins over any partial text buffered for the role,
    /// which is discarded so a later flush cannot duplicate it.
    pub fn complete_item(&mut self, role: TranscriptRole, text: &str, now: Instant) -> Option<Turn> {
        if let Some(stale) = self.pending.remove(&role)
            && !stale.is_empty()
        {
            debug!("Discarding pending {} text superseded by complete item", role);
        }
        self.emit(role, text, now)
    }

    fn emit(&mut self, role: TranscriptRole, text: &str, now: Instant) -> Option<Turn> {
        let rewritten = self.normalizer.rewrite(text.trim());
        let key = dedup_key(&rewritten);
        if key.is_empty() {
            return None;
        }

        if let Some(record) = self.dedup.get(&role)
            && record.last_normalized_text == key
            && now.saturating_duration_since(record.last_emit) < self.dedup_window
        {
            debug!("Suppressing duplicate {} turn: {}", role, rewritten);
            return None;
        }

        if !self.normalizer.admit(&rewritten) {
            return None;
        }
        let turn = Turn::new(role, rewritten);
        self.turns.push(turn.clone());
        self.dedup.insert(
            role,
            DedupRecord {
                last_normalized_text: key,
                last_emit: now,
            },
        );
        debug!("Appended {} turn: {}", role, turn.text);
        Some(turn)
    }

    /// Current pending text for a role.
    pub fn pending(&self, role: TranscriptRole) -> &str {
        self.pending.get(&role).map(String::as_str).unwrap_or_default()
    }

    /// Finalized turns in order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Clear buffers and dedup state, keeping the conversation log.
    pub fn reset_buffers(&mut self) {
        self.pending.clear();
        self.dedup.clear();
        self.finalized_responses.clear();
    }

    /// Clear everything, including the conversation log.
    pub fn clear(&mut self) {
        self.reset_buffers();
        self.turns.clear();
    }
}

/// Lowercased, whitespace-collapsed text used for duplicate detection.
fn dedup_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
