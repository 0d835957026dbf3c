//! Relevance Ranker.
//!
//! Scores a persona's entries against a free-text query with a lexical,
//! recency and importance model:
//!
//! ```text
//! score = recency + importance + category + query
//!
//! recency    = 1 / (1 + age_seconds / 86400)          age floored at 1 s
//! importance = 0.75 × importance
//! category   = +0.5 if a filter is given and matches,
//!              −0.5 if a filter is given and does not match, else 0
//! query      = 0.6 × (distinct query tokens found in the text)
//!            + 0.8 if the whole query occurs in the text
//! ```
//!
//! Query tokens are the query split on non-word characters, lower-cased and
//! de-duplicated; a token counts when it occurs anywhere in the lower-cased
//! entry text. Equal scores prefer the newer entry.

use chrono::{DateTime, Utc};
use eidoid_types::{Category, MemoryEntry};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 25;

const SECONDS_PER_DAY: f64 = 86_400.0;
const IMPORTANCE_WEIGHT: f64 = 0.75;
const CATEGORY_BONUS: f64 = 0.5;
const TOKEN_WEIGHT: f64 = 0.6;
const SUBSTRING_BONUS: f64 = 0.8;

/// A recall request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallQuery {
    /// Free text; `None` or blank disables the query term.
    pub query: Option<String>,
    /// Requested result count, clamped to `[1, 25]` when ranking.
    pub top_k: usize,
    /// Soft category filter: matching entries gain, others lose.
    pub categories: Vec<Category>,
}

impl Default for RecallQuery {
    fn default() -> Self {
        Self {
            query: None,
            top_k: DEFAULT_TOP_K,
            categories: Vec::new(),
        }
    }
}

impl RecallQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_category(mut self, category: impl Into<Category>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn effective_top_k(&self) -> usize {
        self.top_k.clamp(1, MAX_TOP_K)
    }
}

/// Lower-cased, de-duplicated word tokens of `query`, in first-seen order.
pub fn query_tokens(query: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for token in query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

struct PreparedQuery<'a> {
    phrase: Option<String>,
    tokens: Vec<String>,
    categories: &'a [Category],
}

impl<'a> PreparedQuery<'a> {
    fn new(query: &'a RecallQuery) -> Self {
        let phrase = query
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let tokens = phrase.as_deref().map(query_tokens).unwrap_or_default();
        Self {
            phrase,
            tokens,
            categories: &query.categories,
        }
    }
}

fn score_prepared(entry: &MemoryEntry, query: &PreparedQuery<'_>, now: DateTime<Utc>) -> f64 {
    let age = ((now - entry.created_at).num_milliseconds() as f64 / 1000.0).max(1.0);
    let mut score = 1.0 / (1.0 + age / SECONDS_PER_DAY);

    score += IMPORTANCE_WEIGHT * f64::from(entry.importance);

    if !query.categories.is_empty() {
        if query.categories.contains(&entry.category) {
            score += CATEGORY_BONUS;
        } else {
            score -= CATEGORY_BONUS;
        }
    }

    if let Some(phrase) = &query.phrase {
        let text = entry.text.to_lowercase();
        let matches = query.tokens.iter().filter(|t| text.contains(t.as_str())).count();
        score += TOKEN_WEIGHT * matches as f64;
        if text.contains(phrase.as_str()) {
            score += SUBSTRING_BONUS;
        }
    }
    score
}

/// Relevance score of a single entry.
pub fn score(entry: &MemoryEntry, query: &RecallQuery, now: DateTime<Utc>) -> f64 {
    score_prepared(entry, &PreparedQuery::new(query), now)
}

/// Rank `entries` for `query` and keep the best `effective_top_k()`.
///
/// Each element of the returned vector is `(entry, score)`, highest score
/// first.
pub fn rank(entries: Vec<MemoryEntry>, query: &RecallQuery, now: DateTime<Utc>) -> Vec<(MemoryEntry, f64)> {
    let prepared = PreparedQuery::new(query);
    let mut scored: Vec<(MemoryEntry, f64)> = entries
        .into_iter()
        .map(|e| {
            let s = score_prepared(&e, &prepared, now);
            (e, s)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| b.0.created_at.cmp(&a.0.created_at))
            .then_with(|| b.0.id.cmp(&a.0.id))
    });
    scored.truncate(query.effective_top_k());
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use eidoid_types::EntryId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
    }

    fn entry(id: i64, text: &str, category: Category, importance: f32, age_secs: i64) -> MemoryEntry {
        let created = now() - Duration::seconds(age_secs);
        MemoryEntry {
            id: EntryId(id),
            persona_id: "alexa".into(),
            text: text.into(),
            category,
            importance,
            created_at: created,
            last_accessed_at: created,
            token_estimate: 1,
            tags: vec![],
        }
    }

    #[test]
    fn tokens_split_on_non_word_characters() {
        assert_eq!(
            query_tokens("What's the WEATHER, weather?"),
            vec!["what", "s", "the", "weather"]
        );
        assert!(query_tokens("  ...  ").is_empty());
    }

    #[test]
    fn recency_decays_over_days() {
        let q = RecallQuery::new();
        let fresh = score(&entry(1, "x", Category::Fact, 0.0, 0), &q, now());
        let day_old = score(&entry(2, "x", Category::Fact, 0.0, 86_400), &q, now());
        assert!(fresh > 0.99);
        assert!((day_old - 0.5).abs() < 1e-3);
    }

    #[test]
    fn category_filter_is_soft() {
        let q = RecallQuery::new().with_category("reflection");
        let hit = score(&entry(1, "x", Category::Reflection, 0.5, 0), &q, now());
        let miss = score(&entry(2, "x", Category::Fact, 0.5, 0), &q, now());
        assert!((hit - miss - 1.0).abs() < 1e-6);
    }

    #[test]
    fn query_term_counts_tokens_and_phrase() {
        let q = RecallQuery::text("green tea");
        let e = entry(1, "She drinks green tea daily", Category::Fact, 0.0, 0);
        let base = score(&e, &RecallQuery::new(), now());
        // two tokens + literal phrase
        assert!((score(&e, &q, now()) - base - (1.2 + 0.8)).abs() < 1e-6);
    }

    #[test]
    fn blank_query_adds_nothing() {
        let e = entry(1, "anything", Category::Fact, 0.3, 10);
        assert_eq!(
            score(&e, &RecallQuery::text("   "), now()),
            score(&e, &RecallQuery::new(), now())
        );
    }

    #[test]
    fn weather_scenario_orders_weather_entries_first() {
        let entries = vec![
            entry(1, "the weather is nice", Category::Fact, 0.9, 30),
            entry(2, "I like cats", Category::Preference, 0.9, 20),
            entry(3, "weather forecast says rain", Category::Fact, 0.2, 10),
        ];
        let ranked = rank(entries, &RecallQuery::text("weather").with_top_k(2), now());
        let ids: Vec<i64> = ranked.iter().map(|(e, _)| e.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn ties_prefer_newer_entries() {
        let entries = vec![
            entry(1, "same", Category::Fact, 0.5, 5),
            entry(2, "same", Category::Fact, 0.5, 5),
        ];
        let ranked = rank(entries, &RecallQuery::new(), now());
        assert_eq!(ranked[0].0.id, EntryId(2));
    }

    #[test]
    fn top_k_is_clamped() {
        let entries: Vec<MemoryEntry> = (0..30)
            .map(|i| entry(i, "m", Category::Fact, 0.5, i))
            .collect();
        assert_eq!(rank(entries.clone(), &RecallQuery::new().with_top_k(0), now()).len(), 1);
        assert_eq!(rank(entries.clone(), &RecallQuery::new().with_top_k(99), now()).len(), 25);
        assert_eq!(rank(entries[..3].to_vec(), &RecallQuery::new().with_top_k(10), now()).len(), 3);
    }
}
