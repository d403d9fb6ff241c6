//! Turn text normalization.
//!
//! Finalized text goes through two fixed rewrites before it is stored:
//! literal phrase substitutions, then whole-word replacement of known
//! mishearings of the assistant's wake word. After rewriting, the language
//! guard decides whether the turn is kept at all.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::realtime::{RealtimeError, RealtimeResult};

/// Canonical spelling of the assistant's name.
pub const DEFAULT_WAKE_WORD: &str = "Durmah";

/// Known phonetic confusions of the wake word.
pub const DEFAULT_MISHEARINGS: &[&str] = &[
    "Denmark", "Dharma", "Darma", "Durma", "Derma", "Doormah", "Duma",
];

/// Minimum share of Latin-script letters for a turn to count as English.
const MIN_LATIN_RATIO: f32 = 0.5;

/// Whether a language tag names English (`en`, `en-US`, `en_GB`).
pub fn is_english(tag: &str) -> bool {
    tag.trim()
        .split(['-', '_'])
        .next()
        .is_some_and(|primary| primary.eq_ignore_ascii_case("en"))
}

/// Check applied to rewritten text before it becomes a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LanguageGuard {
    /// Reject text whose letters are mostly outside the Latin script
    Latin,
    Off,
}

/// Literal phrase rewrite applied before wake-word normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseSubstitution {
    pub from: String,
    pub to: String,
}

impl PhraseSubstitution {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Default literal substitutions.
pub fn default_phrase_substitutions() -> Vec<PhraseSubstitution> {
    vec![
        PhraseSubstitution::new("Hi Denmark", "Hi Durmah"),
        PhraseSubstitution::new("Hey Denmark", "Hey Durmah"),
        PhraseSubstitution::new("Hello Denmark", "Hello Durmah"),
    ]
}

/// Compiled normalization rules.
#[derive(Debug, Clone)]
pub struct TranscriptNormalizer {
    wake_word: String,
    mishearing_pattern: Option<Regex>,
    substitutions: Vec<(Regex, String)>,
    expected_language: Option<String>,
    guard: LanguageGuard,
}

impl TranscriptNormalizer {
    /// Compile the rules.
    ///
    /// Mishearings match whole words, case-insensitively. Substitutions match
    /// their literal phrase case-insensitively.
    pub fn new(
        wake_word: &str,
        mishearings: &[String],
        substitutions: &[PhraseSubstitution],
        expected_language: Option<&str>,
    ) -> RealtimeResult<Self> {
        let words: Vec<String> = mishearings
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty() && !w.eq_ignore_ascii_case(wake_word))
            .map(regex::escape)
            .collect();

        let mishearing_pattern = if words.is_empty() || wake_word.trim().is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)\b(?:{})\b", words.join("|"));
            Some(Regex::new(&pattern).map_err(|e| {
                RealtimeError::InvalidConfiguration(format!("Invalid mishearing pattern: {e}"))
            })?)
        };

        let substitutions = substitutions
            .iter()
            .filter(|s| !s.from.trim().is_empty())
            .map(|s| {
                let pattern = format!("(?i){}", regex::escape(s.from.trim()));
                Regex::new(&pattern)
                    .map(|re| (re, s.to.clone()))
                    .map_err(|e| {
                        RealtimeError::InvalidConfiguration(format!(
                            "Invalid phrase substitution '{}': {e}",
                            s.from
                        ))
                    })
            })
            .collect::<RealtimeResult<Vec<_>>>()?;

        let expected_language = expected_language
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_lowercase);
        let guard = match expected_language.as_deref() {
            Some(lang) if is_english(lang) => LanguageGuard::Latin,
            Some(lang) => {
                warn!(
                    "No language check available for '{}', accepting every turn",
                    lang
                );
                LanguageGuard::Off
            }
            None => LanguageGuard::Off,
        };

        Ok(Self {
            wake_word: wake_word.trim().to_string(),
            mishearing_pattern,
            substitutions,
            expected_language,
            guard,
        })
    }

    /// Rewrite phrase substitutions, then wake-word mishearings.
    pub fn rewrite(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (pattern, replacement) in &self.substitutions {
            out = pattern
                .replace_all(&out, regex::NoExpand(replacement))
                .into_owned();
        }
        if let Some(pattern) = &self.mishearing_pattern {
            out = pattern
                .replace_all(&out, regex::NoExpand(&self.wake_word))
                .into_owned();
        }
        out
    }

    /// Whether the text is acceptable for the expected language.
    ///
    /// Only English (any `en-*` tag) is enforced: text whose letters are
    /// mostly outside the Latin script is rejected. Text without letters
    /// passes.
    pub fn accepts_language(&self, text: &str) -> bool {
        match self.guard {
            LanguageGuard::Latin => {
                latin_ratio(text).is_none_or(|ratio| ratio >= MIN_LATIN_RATIO)
            }
            LanguageGuard::Off => true,
        }
    }

    /// Language check on already rewritten text, logging drops.
    pub fn admit(&self, rewritten: &str) -> bool {
        if self.accepts_language(rewritten) {
            return true;
        }
        warn!(
            "Dropping turn outside expected language {:?}: {}",
            self.expected_language, rewritten
        );
        false
    }

    /// Full pipeline: rewrite, then check the language.
    ///
    /// Returns `None` when the turn must be dropped.
    pub fn normalize(&self, text: &str) -> Option<String> {
        let rewritten = self.rewrite(text.trim());
        if rewritten.is_empty() || !self.admit(&rewritten) {
            return None;
        }
        Some(rewritten)
    }
}

impl Default for TranscriptNormalizer {
    fn default() -> Self {
        let mishearings: Vec<String> = DEFAULT_MISHEARINGS.iter().map(|s| s.to_string()).collect();
        match Self::new(
            DEFAULT_WAKE_WORD,
            &mishearings,
            &default_phrase_substitutions(),
            Some("en"),
        ) {
            Ok(normalizer) => normalizer,
            // Defaults are escaped literals and always compile
            Err(_) => Self {
                wake_word: DEFAULT_WAKE_WORD.to_string(),
                mishearing_pattern: None,
                substitutions: Vec::new(),
                expected_language: Some("en".to_string()),
                guard: LanguageGuard::Latin,
            },
        }
    }
}

/// Share of alphabetic characters that are Latin script, or `None` when the
/// text has no letters.
fn latin_ratio(text: &str) -> Option<f32> {
    let mut letters = 0usize;
    let mut latin = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if is_latin(c) {
            latin += 1;
        }
    }
    (letters > 0).then(|| latin as f32 / letters as f32)
}

fn is_latin(c: char) -> bool {
    matches!(c,
        'a'..='z'
        | 'A'..='Z'
        | '\u{00C0}'..='\u{024F}'
        | '\u{1E00}'..='\u{1EFF}')
}
