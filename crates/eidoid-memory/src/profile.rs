//! Profile/Trait Ledger.
//!
//! Pure merge and render logic for [`PersonaProfile`]; persistence lives in
//! the [`store`](crate::store) and locking in the [`engine`](crate::engine).

use chrono::{DateTime, Utc};
use eidoid_types::{Category, NewEntry, PersonaProfile, ProfileUpdate, TraitDelta};

/// Traits shown by [`render_summary`] unless the caller asks otherwise.
pub const DEFAULT_SUMMARY_TRAITS: usize = 8;
/// Style notes longer than this are cut in rendered summaries.
pub const STYLE_NOTES_PREVIEW_CHARS: usize = 220;
/// Importance of the reflection entry written by a personality update.
pub const REFLECTION_IMPORTANCE: f32 = 0.7;
pub const PERSONALITY_UPDATE_TAG: &str = "personality_update";

/// Cut `text` to at most `max_chars` characters, ending in `…` when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

fn set_scalar(field: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        let v = v.trim();
        *field = if v.is_empty() { None } else { Some(v.to_string()) };
    }
}

/// Union-merge `incoming` into `traits`, keeping first-seen order and at most
/// `max_traits` entries. Returns the traits that were actually added.
pub fn merge_traits(traits: &mut Vec<String>, incoming: &[String], max_traits: usize) -> Vec<String> {
    let mut added = Vec::new();
    for t in incoming {
        let t = t.trim();
        if t.is_empty() || traits.iter().any(|existing| existing == t) {
            continue;
        }
        if traits.len() >= max_traits {
            break;
        }
        traits.push(t.to_string());
        added.push(t.to_string());
    }
    added
}

/// Apply `update` to `current` (or to a fresh profile when there is none).
///
/// Scalar fields are last-write-wins (a blank value clears the field),
/// absent fields are untouched, and traits are union-merged.
pub fn merge(
    current: Option<PersonaProfile>,
    persona_id: &str,
    update: &ProfileUpdate,
    max_traits: usize,
    now: DateTime<Utc>,
) -> PersonaProfile {
    let mut profile = current.unwrap_or_else(|| PersonaProfile::empty(persona_id, now));
    set_scalar(&mut profile.display_name, &update.display_name);
    set_scalar(&mut profile.world_description, &update.world_description);
    set_scalar(&mut profile.personality, &update.personality);
    set_scalar(&mut profile.voice, &update.voice);
    set_scalar(&mut profile.style_notes, &update.style_notes);
    merge_traits(&mut profile.traits, &update.traits, max_traits);
    profile.updated_at = now;
    profile
}

/// The reflection entry that records a personality change, or `None` when
/// the delta carries neither traits nor style notes.
///
/// Style notes are previewed at [`STYLE_NOTES_PREVIEW_CHARS`] and the whole
/// text is kept within `max_chars`, so the entry always passes the store's
/// length check.
pub fn reflection_for(delta: &TraitDelta, max_chars: usize) -> Option<NewEntry> {
    let traits: Vec<&str> = delta
        .traits
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    let style = delta.style_notes.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let mut bits = Vec::new();
    if !traits.is_empty() {
        bits.push(format!("Traits updated: {}", traits.join(", ")));
    }
    if let Some(style) = style {
        let style = style.replace('\n', " ");
        bits.push(format!(
            "Style notes: {}",
            truncate_with_ellipsis(&style, STYLE_NOTES_PREVIEW_CHARS)
        ));
    }
    if bits.is_empty() || max_chars == 0 {
        return None;
    }
    Some(
        NewEntry::new(truncate_with_ellipsis(&bits.join("; "), max_chars))
            .with_category(Category::Reflection)
            .with_importance(REFLECTION_IMPORTANCE)
            .with_tag(PERSONALITY_UPDATE_TAG),
    )
}

/// Prompt-ready rendering of a profile. Empty when nothing is set.
pub fn render_summary(profile: &PersonaProfile, max_traits: usize) -> String {
    let mut lines = Vec::new();
    if let Some(name) = &profile.display_name {
        lines.push(format!("- Name: {name}"));
    }
    if let Some(world) = &profile.world_description {
        lines.push(format!("- World: {}", world.replace('\n', " ")));
    }
    if !profile.traits.is_empty() && max_traits > 0 {
        let shown: Vec<&str> = profile.traits.iter().take(max_traits).map(String::as_str).collect();
        lines.push(format!("- Traits: {}", shown.join(", ")));
    }
    if let Some(style) = &profile.style_notes {
        let style = style.replace('\n', " ");
        lines.push(format!(
            "- Style Notes: {}",
            truncate_with_ellipsis(&style, STYLE_NOTES_PREVIEW_CHARS)
        ));
    }
    if lines.is_empty() {
        return String::new();
    }
    format!("Persona Profile:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn truncation_respects_char_budget() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        let cut = truncate_with_ellipsis("abcdefghij", 5);
        assert_eq!(cut, "abcd…");
        assert_eq!(cut.chars().count(), 5);
        assert_eq!(truncate_with_ellipsis("äöüäöü", 3), "äö…");
    }

    #[test]
    fn traits_merge_as_ordered_set() {
        let mut traits = strings(&["warm"]);
        let added = merge_traits(&mut traits, &strings(&["direct", "warm", " curious ", ""]), 32);
        assert_eq!(traits, strings(&["warm", "direct", "curious"]));
        assert_eq!(added, strings(&["direct", "curious"]));
    }

    #[test]
    fn trait_list_is_capped() {
        let mut traits = strings(&["a", "b"]);
        merge_traits(&mut traits, &strings(&["c", "d"]), 3);
        assert_eq!(traits, strings(&["a", "b", "c"]));
    }

    #[test]
    fn merge_is_last_write_wins_for_scalars() {
        let first = merge(
            None,
            "jarvis",
            &ProfileUpdate {
                display_name: Some("Jarvis".into()),
                world_description: Some("A workshop".into()),
                traits: strings(&["dry"]),
                ..Default::default()
            },
            32,
            now(),
        );
        let second = merge(
            Some(first),
            "jarvis",
            &ProfileUpdate {
                display_name: Some("J.A.R.V.I.S.".into()),
                traits: strings(&["loyal"]),
                ..Default::default()
            },
            32,
            now(),
        );
        assert_eq!(second.display_name.as_deref(), Some("J.A.R.V.I.S."));
        assert_eq!(second.world_description.as_deref(), Some("A workshop"));
        assert_eq!(second.traits, strings(&["dry", "loyal"]));
    }

    #[test]
    fn blank_scalar_clears_field() {
        let mut base = PersonaProfile::empty("alexa", now());
        base.voice = Some("Aoede".into());
        let merged = merge(
            Some(base),
            "alexa",
            &ProfileUpdate {
                voice: Some("  ".into()),
                ..Default::default()
            },
            32,
            now(),
        );
        assert_eq!(merged.voice, None);
    }

    #[test]
    fn reflection_mentions_traits_and_style() {
        let delta = TraitDelta::new(["warm", "direct"], Some("uses short sentences"));
        let entry = reflection_for(&delta, 8192).unwrap();
        assert_eq!(
            entry.text,
            "Traits updated: warm, direct; Style notes: uses short sentences"
        );
        assert_eq!(entry.category, Some(Category::Reflection));
        assert_eq!(entry.importance, Some(REFLECTION_IMPORTANCE));
        assert_eq!(entry.tags, strings(&[PERSONALITY_UPDATE_TAG]));
    }

    #[test]
    fn empty_delta_has_no_reflection() {
        assert!(reflection_for(&TraitDelta::default(), 8192).is_none());
        assert!(reflection_for(&TraitDelta::new([" "], Some("")), 8192).is_none());
    }

    #[test]
    fn reflection_text_stays_bounded() {
        let delta = TraitDelta::new(["warm"], Some("short sentences ".repeat(600).as_str()));
        let entry = reflection_for(&delta, 8192).unwrap();
        assert!(entry.text.starts_with("Traits updated: warm; Style notes: short sentences"));
        assert!(entry.text.ends_with('…'));
        assert!(entry.text.chars().count() <= "Traits updated: warm; Style notes: ".len() + STYLE_NOTES_PREVIEW_CHARS);

        let many: Vec<String> = (0..500).map(|i| format!("trait-{i}")).collect();
        let entry = reflection_for(&TraitDelta::new(many, None), 64).unwrap();
        assert_eq!(entry.text.chars().count(), 64);
    }

    #[test]
    fn summary_renders_known_fields_only() {
        let mut profile = PersonaProfile::empty("alexa", now());
        assert_eq!(render_summary(&profile, 8), "");

        profile.display_name = Some("Alexa".into());
        profile.traits = (0..10).map(|i| format!("t{i}")).collect();
        profile.style_notes = Some("x".repeat(300));
        let text = render_summary(&profile, 2);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Persona Profile:");
        assert_eq!(lines[1], "- Name: Alexa");
        assert_eq!(lines[2], "- Traits: t0, t1");
        assert!(lines[3].starts_with("- Style Notes: xxx"));
        assert!(lines[3].ends_with('…'));
        assert_eq!(lines.len(), 4);
    }
}
