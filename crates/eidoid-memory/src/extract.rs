//! Utterance extraction.
//!
//! Pulls durable facts, preferences and emotional cues out of what the user
//! says so they survive as their own, categorised entries. Matching is
//! pattern-based and case-insensitive; captured values keep the user's own
//! spelling.
//!
//! | Pattern | Entry | Category | Importance |
//! |---|---|---|---|
//! | `my name is X`, `call me X` | `User's name is X` | fact | 1.0 |
//! | `I'm allergic to X` | `User is allergic to X` | fact | 1.0 |
//! | `I'm N years old` | `User is N years old` | fact | 0.75 |
//! | `I live in X` | `User lives in X` | fact | 0.75 |
//! | `I work as/at X` | `User works as/at X` | fact | 0.75 |
//! | `my favourite K is X` | `User's favorite K is X` | preference | 0.75 |
//! | `I like/love/enjoy/prefer X` | `User likes X` | preference | 0.5 |
//! | `I dislike/hate X`, `I don't like X` | `User dislikes X` | preference | 0.5 |
//! | `I'm learning X` | `User is learning X` | interest | 0.5 |
//! | `I want to X` | `User wants to X` | goal | 0.5 |
//! | emotion keyword | `User expressed feeling E` | emotion | 0.5 |

use std::sync::LazyLock;

use eidoid_types::{Category, ImportanceLevel, NewEntry};
use regex::Regex;

/// Tag carried by every extracted entry.
pub const EXTRACTED_TAG: &str = "extracted";

const FACT_TAG: &str = "user_fact";
const PREFERENCE_TAG: &str = "user_preference";
const EMOTION_TAG: &str = "emotion";

/// Captured values stop at sentence punctuation.
const VALUE: &str = r"([^.,!?;\n]{2,80})";

struct Rule {
    pattern: Regex,
    /// `$1`/`$2`-style template expanded against the captures.
    template: &'static str,
    category: Category,
    importance: ImportanceLevel,
    tag: &'static str,
}

impl Rule {
    fn new(
        pattern: &str,
        template: &'static str,
        category: Category,
        importance: ImportanceLevel,
        tag: &'static str,
    ) -> Self {
        let pattern = pattern.replace("{VALUE}", VALUE);
        Self {
            pattern: Regex::new(&format!("(?i){pattern}")).unwrap(),
            template,
            category,
            importance,
            tag,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    use ImportanceLevel::{Critical, High, Medium};
    vec![
        Rule::new(r"\b(?:my name is|call me)\s+([a-z][a-z'\-]+)", "User's name is ${1}", Category::Fact, Critical, FACT_TAG),
        Rule::new(r"\bi(?:'m| am) (?:allergic|intolerant) to\s+{VALUE}", "User is allergic to ${1}", Category::Fact, Critical, FACT_TAG),
        Rule::new(r"\bi(?:'m| am) (\d{1,3}) years old\b", "User is ${1} years old", Category::Fact, High, FACT_TAG),
        Rule::new(r"\bi (?:live|am living) in\s+{VALUE}", "User lives in ${1}", Category::Fact, High, FACT_TAG),
        Rule::new(r"\bi (?:work|am working) (?:as|at)\s+{VALUE}", "User works as/at ${1}", Category::Fact, High, FACT_TAG),
        Rule::new(r"\bmy (?:favorite|favourite)\s+(\w+)\s+is\s+{VALUE}", "User's favorite ${1} is ${2}", Category::Preference, High, PREFERENCE_TAG),
        Rule::new(r"\bi (?:really )?(?:like|love|enjoy|prefer)\s+{VALUE}", "User likes ${1}", Category::Preference, Medium, PREFERENCE_TAG),
        Rule::new(r"\bi (?:dislike|hate|don't like|do not like)\s+{VALUE}", "User dislikes ${1}", Category::Preference, Medium, PREFERENCE_TAG),
        Rule::new(r"\bi(?:'m| am) (?:learning|studying)\s+{VALUE}", "User is learning ${1}", Category::parse("interest"), Medium, PREFERENCE_TAG),
        Rule::new(r"\bi (?:want|would like) to\s+{VALUE}", "User wants to ${1}", Category::parse("goal"), Medium, PREFERENCE_TAG),
    ]
});

static EMOTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(happy|excited|sad|angry|frustrated|pleased|disappointed|worried|upset)\b").unwrap()
});

/// Entries worth keeping from one user utterance, in pattern order and
/// without duplicates. Empty when nothing matched.
pub fn derive_entries(utterance: &str) -> Vec<NewEntry> {
    let mut texts: Vec<(String, &Rule)> = Vec::new();
    for rule in RULES.iter() {
        for caps in rule.pattern.captures_iter(utterance) {
            let mut text = String::new();
            caps.expand(rule.template, &mut text);
            let text = text.trim().to_string();
            if !texts.iter().any(|(t, _)| t.eq_ignore_ascii_case(&text)) {
                texts.push((text, rule));
            }
        }
    }

    let mut out: Vec<NewEntry> = texts
        .into_iter()
        .map(|(text, rule)| {
            NewEntry::new(text)
                .with_category(rule.category.clone())
                .with_importance(rule.importance.value())
                .with_tag(EXTRACTED_TAG)
                .with_tag(rule.tag)
        })
        .collect();

    let mut felt: Vec<String> = Vec::new();
    for m in EMOTION_PATTERN.find_iter(utterance) {
        let emotion = m.as_str().to_lowercase();
        if !felt.contains(&emotion) {
            felt.push(emotion);
        }
    }
    out.extend(felt.into_iter().map(|emotion| {
        NewEntry::new(format!("User expressed feeling {emotion}"))
            .with_category(Category::Emotion)
            .with_importance(ImportanceLevel::Medium.value())
            .with_tag(EXTRACTED_TAG)
            .with_tag(EMOTION_TAG)
            .with_tag(emotion)
    }));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(utterance: &str) -> Vec<String> {
        derive_entries(utterance).into_iter().map(|e| e.text).collect()
    }

    #[test]
    fn plain_chatter_yields_nothing() {
        assert!(derive_entries("What's the weather like today?").is_empty());
        assert!(derive_entries("").is_empty());
    }

    #[test]
    fn name_keeps_user_spelling() {
        let entries = derive_entries("Hi there, my name is Sam.");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "User's name is Sam");
        assert_eq!(entries[0].category, Some(Category::Fact));
        assert_eq!(entries[0].importance, Some(1.0));
        assert_eq!(entries[0].tags, vec![EXTRACTED_TAG.to_string(), FACT_TAG.to_string()]);
    }

    #[test]
    fn preferences_stop_at_punctuation() {
        assert_eq!(
            texts("I love green tea, but I hate coffee!"),
            vec!["User likes green tea", "User dislikes coffee"]
        );
        assert_eq!(texts("My favourite colour is teal."), vec!["User's favorite colour is teal"]);
    }

    #[test]
    fn dont_like_is_not_a_like() {
        assert_eq!(texts("I don't like mondays"), vec!["User dislikes mondays"]);
    }

    #[test]
    fn facts_cover_age_location_and_allergy() {
        assert_eq!(
            texts("I'm 34 years old and I live in Lisbon. I am allergic to peanuts"),
            vec![
                "User is allergic to peanuts",
                "User is 34 years old",
                "User lives in Lisbon",
            ]
        );
    }

    #[test]
    fn open_categories_for_goals_and_learning() {
        let entries = derive_entries("I'm learning Rust and I want to build a robot");
        let cats: Vec<&str> = entries
            .iter()
            .map(|e| e.category.as_ref().map(Category::as_str).unwrap_or_default())
            .collect();
        assert_eq!(cats, vec!["interest", "goal"]);
    }

    #[test]
    fn emotions_are_tagged_once_each() {
        let entries = derive_entries("I'm so happy! Really HAPPY, a bit worried though.");
        let got: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(got, vec!["User expressed feeling happy", "User expressed feeling worried"]);
        assert_eq!(entries[0].category, Some(Category::Emotion));
        assert!(entries[0].tags.contains(&"happy".to_string()));
    }

    #[test]
    fn emotion_words_inside_other_words_do_not_count() {
        assert!(derive_entries("The sadhu sat quietly").is_empty());
    }
}
