//! `eidoid-types` – shared data model for the Eidoid persona memory.
//!
//! Every crate in the workspace speaks in these types: the memory engine
//! persists them, the CLI renders them, and the session loop hands them to
//! the conversational API through the [`tools`] argument types.

pub mod tools;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Importance assigned when neither the caller nor the category supplies one.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Maximum length of a persona identifier.
pub const MAX_PERSONA_ID_LEN: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of a [`MemoryEntry`], unique within one persona namespace.
///
/// Assigned monotonically by the persona's partition and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(EntryId)
    }
}

/// Rejected persona identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidPersonaId {
    #[error("persona id must not be empty")]
    Empty,
    #[error("persona id is longer than {MAX_PERSONA_ID_LEN} characters")]
    TooLong,
    #[error("persona id {0:?} may only contain ASCII letters, digits, '-' and '_'")]
    BadCharacter(String),
}

/// Partition key isolating one character's memory from another's.
///
/// Persona ids are also used as file stems for the on-disk partitions, so
/// they are restricted to `[A-Za-z0-9_-]{1,64}` and folded to lower case:
/// `Alexa` and `alexa` name the same persona on every filesystem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PersonaId(String);

impl PersonaId {
    /// Validate, lower-case and wrap `raw` (surrounding whitespace is
    /// ignored).
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidPersonaId> {
        let raw = raw.into();
        let id = raw.trim();
        if id.is_empty() {
            return Err(InvalidPersonaId::Empty);
        }
        if id.chars().count() > MAX_PERSONA_ID_LEN {
            return Err(InvalidPersonaId::TooLong);
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(InvalidPersonaId::BadCharacter(id.to_string()));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PersonaId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PersonaId {
    type Error = InvalidPersonaId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PersonaId::new(value)
    }
}

impl From<PersonaId> for String {
    fn from(id: PersonaId) -> Self {
        id.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Category
// ─────────────────────────────────────────────────────────────────────────────

/// Open classification tag of a memory entry.
///
/// The well-known variants drive importance defaults; anything else is kept
/// verbatim (trimmed, lower-cased) as [`Category::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Fact,
    Preference,
    Experience,
    Emotion,
    Reflection,
    Observation,
    Note,
    Skill,
    Personality,
    Other(String),
}

impl Category {
    /// Parse a free-form tag. Empty input means [`Category::Fact`].
    pub fn parse(raw: &str) -> Self {
        let tag = raw.trim().to_lowercase();
        match tag.as_str() {
            "" | "fact" => Category::Fact,
            "preference" => Category::Preference,
            "experience" => Category::Experience,
            "emotion" => Category::Emotion,
            "reflection" => Category::Reflection,
            "observation" => Category::Observation,
            "note" => Category::Note,
            "skill" => Category::Skill,
            "personality" => Category::Personality,
            _ => Category::Other(tag),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Fact => "fact",
            Category::Preference => "preference",
            Category::Experience => "experience",
            Category::Emotion => "emotion",
            Category::Reflection => "reflection",
            Category::Observation => "observation",
            Category::Note => "note",
            Category::Skill => "skill",
            Category::Personality => "personality",
            Category::Other(tag) => tag,
        }
    }

    /// Importance used when the caller does not supply one.
    pub fn default_importance(&self) -> f32 {
        match self {
            Category::Reflection => 0.7,
            Category::Preference | Category::Emotion => 0.6,
            Category::Observation | Category::Note => 0.4,
            _ => DEFAULT_IMPORTANCE,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::parse(&value)
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Category::parse(value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role
// ─────────────────────────────────────────────────────────────────────────────

/// Speaker of a recorded utterance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Note,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        let role = raw.trim().to_lowercase();
        match role.as_str() {
            "user" => Role::User,
            "assistant" | "model" => Role::Assistant,
            "system" => Role::System,
            "" | "note" => Role::Note,
            _ => Role::Other(role),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Note => "note",
            Role::Other(role) => role,
        }
    }

    /// Category an utterance from this role is filed under when the caller
    /// gives none.
    pub fn default_category(&self) -> Category {
        match self {
            Role::User => Category::Observation,
            Role::Assistant | Role::System | Role::Note => Category::Note,
            Role::Other(role) => Category::parse(role),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::parse(&value)
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::parse(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Importance
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse importance labels used by the `store_important_memory` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ImportanceLevel {
    pub fn value(self) -> f32 {
        match self {
            ImportanceLevel::Low => 0.25,
            ImportanceLevel::Medium => 0.5,
            ImportanceLevel::High => 0.75,
            ImportanceLevel::Critical => 1.0,
        }
    }
}

/// Clamp `value` into `[0, 1]`; non-finite input yields `fallback`.
pub fn clamp_importance(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback.clamp(0.0, 1.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryEntry
// ─────────────────────────────────────────────────────────────────────────────

/// A single persisted memory of one persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: EntryId,
    pub persona_id: String,
    /// Trimmed, non-empty content.
    pub text: String,
    pub category: Category,
    /// Always within `[0.0, 1.0]`.
    pub importance: f32,
    /// Insertion time; never changes.
    pub created_at: DateTime<Utc>,
    /// Refreshed whenever the entry is part of a read result.
    /// Never earlier than `created_at`.
    pub last_accessed_at: DateTime<Utc>,
    /// Computed once from `text` at insertion.
    pub token_estimate: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Caller-supplied content of an entry that is about to be recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEntry {
    pub text: String,
    pub category: Option<Category>,
    pub importance: Option<f32>,
    pub tags: Vec<String>,
}

impl NewEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<Category>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Effective category: the explicit one, or [`Category::Fact`].
    pub fn resolved_category(&self) -> Category {
        self.category.clone().unwrap_or(Category::Fact)
    }

    /// Effective importance: the explicit one (clamped), or the category
    /// default.
    pub fn resolved_importance(&self) -> f32 {
        let fallback = self.resolved_category().default_importance();
        match self.importance {
            Some(v) => clamp_importance(v, fallback),
            None => fallback,
        }
    }

    /// Trimmed, de-duplicated tags in first-seen order.
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !out.iter().any(|t| t == tag) {
                out.push(tag.to_string());
            }
        }
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PersonaProfile
// ─────────────────────────────────────────────────────────────────────────────

/// Small evolving record describing who a persona is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub persona_id: String,
    pub display_name: Option<String>,
    pub world_description: Option<String>,
    pub personality: Option<String>,
    pub voice: Option<String>,
    /// Ordered set: first-seen order, no duplicates.
    #[serde(default)]
    pub traits: Vec<String>,
    pub style_notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PersonaProfile {
    pub fn empty(persona_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            persona_id: persona_id.into(),
            display_name: None,
            world_description: None,
            personality: None,
            voice: None,
            traits: Vec::new(),
            style_notes: None,
            updated_at: now,
        }
    }
}

/// Partial profile write. `None` fields are left untouched; `traits` are
/// union-merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub world_description: Option<String>,
    pub personality: Option<String>,
    pub voice: Option<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    pub style_notes: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.world_description.is_none()
            && self.personality.is_none()
            && self.voice.is_none()
            && self.traits.is_empty()
            && self.style_notes.is_none()
    }
}

/// Personality change applied by an evolution step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraitDelta {
    #[serde(default)]
    pub traits: Vec<String>,
    pub style_notes: Option<String>,
}

impl TraitDelta {
    pub fn new<I, S>(traits: I, style_notes: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            traits: traits.into_iter().map(Into::into).collect(),
            style_notes: style_notes.map(str::to_string),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PersonaStats
// ─────────────────────────────────────────────────────────────────────────────

/// Status snapshot of one persona's store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaStats {
    pub persona_id: String,
    pub count: u64,
    pub token_sum: u64,
    /// `0.0` when the store is empty.
    pub avg_importance: f32,
    /// Smallest `created_at`.
    pub oldest: Option<DateTime<Utc>>,
    /// Largest `created_at`.
    pub newest: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persona_id_accepts_simple_names() {
        let id = PersonaId::new("  jarvis_v2 ").unwrap();
        assert_eq!(id.as_str(), "jarvis_v2");
    }

    #[test]
    fn persona_id_is_case_insensitive() {
        let upper = PersonaId::new("Alexa").unwrap();
        assert_eq!(upper.as_str(), "alexa");
        assert_eq!(upper, PersonaId::new("alexa").unwrap());
    }

    #[test]
    fn persona_id_rejects_path_like_names() {
        assert_eq!(PersonaId::new(""), Err(InvalidPersonaId::Empty));
        assert!(matches!(
            PersonaId::new("../etc"),
            Err(InvalidPersonaId::BadCharacter(_))
        ));
        assert_eq!(PersonaId::new("a".repeat(65)), Err(InvalidPersonaId::TooLong));
    }

    #[test]
    fn category_parse_keeps_unknown_tags() {
        assert_eq!(Category::parse(" Preference "), Category::Preference);
        assert_eq!(Category::parse(""), Category::Fact);
        assert_eq!(
            Category::parse("Relationship"),
            Category::Other("relationship".to_string())
        );
    }

    #[test]
    fn category_serializes_as_plain_string() {
        let json = serde_json::to_string(&Category::Other("dream".into())).unwrap();
        assert_eq!(json, "\"dream\"");
        let back: Category = serde_json::from_str("\"reflection\"").unwrap();
        assert_eq!(back, Category::Reflection);
    }

    #[test]
    fn role_folds_into_category() {
        assert_eq!(Role::parse("assistant").default_category(), Category::Note);
        assert_eq!(Role::parse("USER").default_category(), Category::Observation);
        assert_eq!(
            Role::parse("narrator").default_category(),
            Category::Other("narrator".into())
        );
    }

    #[test]
    fn importance_is_clamped() {
        assert_eq!(NewEntry::new("x").with_importance(4.0).resolved_importance(), 1.0);
        assert_eq!(NewEntry::new("x").with_importance(-1.0).resolved_importance(), 0.0);
        assert_eq!(
            NewEntry::new("x").with_importance(f32::NAN).resolved_importance(),
            DEFAULT_IMPORTANCE
        );
    }

    #[test]
    fn importance_defaults_follow_category() {
        let e = NewEntry::new("x").with_category("reflection");
        assert!((e.resolved_importance() - 0.7).abs() < f32::EPSILON);
        assert!((NewEntry::new("x").resolved_importance() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let e = NewEntry::new("x").with_tags([" a", "b", "a", "  "]);
        assert_eq!(e.normalized_tags(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn importance_levels_map_to_scores() {
        assert_eq!(ImportanceLevel::Critical.value(), 1.0);
        assert!(ImportanceLevel::Low.value() < ImportanceLevel::Medium.value());
    }

    #[test]
    fn entry_id_parses_from_text() {
        assert_eq!("42".parse::<EntryId>().unwrap(), EntryId(42));
        assert!("x".parse::<EntryId>().is_err());
    }
}
