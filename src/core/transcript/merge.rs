//! Incremental transcript merging.
//!
//! The remote service sends deltas that may repeat, overlap or resend a
//! superset of earlier text. The merge rule is monotonic so repeated or
//! resent fragments never duplicate content.

/// Characters that attach to the previous fragment without a space.
const ATTACHING_PUNCTUATION: [char; 6] = [',', '.', '!', '?', ';', ':'];

/// Merge an incoming fragment into the current pending text.
///
/// - empty incoming: current is kept
/// - empty current: incoming replaces it
/// - case-insensitively equal: current is kept
/// - one is a case-insensitive prefix of the other: the longer wins
/// - otherwise the two are joined with a space, unless incoming starts
///   with punctuation
pub fn merge_incremental(current: &str, incoming: &str) -> String {
    let incoming = incoming.trim();
    let current = current.trim();

    if incoming.is_empty() {
        return current.to_string();
    }
    if current.is_empty() {
        return incoming.to_string();
    }

    let current_lower = current.to_lowercase();
    let incoming_lower = incoming.to_lowercase();

    if current_lower == incoming_lower {
        return current.to_string();
    }
    if incoming_lower.starts_with(&current_lower) {
        return incoming.to_string();
    }
    if current_lower.starts_with(&incoming_lower) {
        return current.to_string();
    }

    if incoming.starts_with(ATTACHING_PUNCTUATION) {
        format!("{current}{incoming}")
    } else {
        format!("{current} {incoming}")
    }
}
