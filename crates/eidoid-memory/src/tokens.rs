//! Token estimation.
//!
//! A cheap, deterministic proxy for LLM token counts used only for
//! budgeting. Roughly four characters per token, bumped by 20 % for text
//! with little whitespace (code, URLs, scripts without word spacing), which
//! the character heuristic under-counts.

/// Estimate the token count of `text`.
///
/// * `0` for empty text.
/// * `max(1, chars / 4)` otherwise.
/// * Multiplied by `1.2` and rounded when the number of
///   whitespace-separated words is at most `max(1, chars / 12)`.
pub fn token_estimate(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count();
    let base = (chars / 4).max(1);
    let words = text.split_whitespace().count();
    let estimate = if words <= (chars / 12).max(1) {
        (base as f64 * 1.2).round() as usize
    } else {
        base
    };
    u32::try_from(estimate).unwrap_or(u32::MAX)
}
