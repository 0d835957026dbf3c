//! Short-term session context.
//!
//! A bounded, in-process buffer of the latest conversation turns of one
//! persona. It is never persisted: it lives as long as the engine (or until
//! cleared) and is kept apart from the long-term entries in the store.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use eidoid_types::Role;
use serde::{Deserialize, Serialize};

use crate::profile::truncate_with_ellipsis;

/// Turns kept per persona unless configured otherwise.
pub const DEFAULT_SESSION_TURNS: usize = 12;
/// Per-turn character cap when rendering.
pub const SESSION_TURN_CHARS: usize = 300;

/// One utterance of the running conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Ring buffer of the most recent [`Turn`]s; the oldest turn drops out
/// once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct SessionBuffer {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl SessionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity.min(DEFAULT_SESSION_TURNS * 4)),
            capacity,
        }
    }

    pub fn push(&mut self, role: Role, text: &str, at: DateTime<Utc>) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            role,
            text: text.trim().to_string(),
            at,
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The last `max_turns` turns, oldest first.
    pub fn recent(&self, max_turns: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(max_turns);
        self.turns.iter().skip(skip).cloned().collect()
    }

    /// Text of the newest user turn, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text.as_str())
    }

    /// `User: …` / `Assistant: …` lines for the last `max_turns` turns.
    /// Empty when the buffer is.
    pub fn render(&self, max_turns: usize) -> String {
        self.recent(max_turns)
            .iter()
            .map(|turn| {
                let flat = turn.text.replace('\n', " ");
                format!(
                    "{}: {}",
                    speaker(&turn.role),
                    truncate_with_ellipsis(&flat, SESSION_TURN_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn speaker(role: &Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::System => "System",
        _ => "Assistant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_turn_drops_out_at_capacity() {
        let mut buf = SessionBuffer::new(3);
        for text in ["one", "two", "three", "four"] {
            buf.push(Role::User, text, Utc::now());
        }
        assert_eq!(buf.len(), 3);
        let texts: Vec<String> = buf.recent(10).into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["two", "three", "four"]);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut buf = SessionBuffer::new(0);
        buf.push(Role::User, "hello", Utc::now());
        assert!(buf.is_empty());
        assert_eq!(buf.render(6), "");
    }

    #[test]
    fn render_labels_speakers_and_cuts_long_turns() {
        let mut buf = SessionBuffer::new(12);
        buf.push(Role::User, "hi\nthere", Utc::now());
        buf.push(Role::Assistant, &"x".repeat(400), Utc::now());
        let text = buf.render(6);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "User: hi there");
        assert!(lines[1].starts_with("Assistant: xxx"));
        assert_eq!(lines[1].chars().count(), "Assistant: ".len() + SESSION_TURN_CHARS);
        assert!(lines[1].ends_with('…'));
    }

    #[test]
    fn render_keeps_only_the_latest_turns() {
        let mut buf = SessionBuffer::new(12);
        for i in 0..8 {
            buf.push(Role::User, &format!("turn {i}"), Utc::now());
        }
        assert_eq!(buf.render(2), "User: turn 6\nUser: turn 7");
    }

    #[test]
    fn last_user_text_skips_assistant_turns() {
        let mut buf = SessionBuffer::new(12);
        assert_eq!(buf.last_user_text(), None);
        buf.push(Role::User, "tell me about tea", Utc::now());
        buf.push(Role::Assistant, "sure", Utc::now());
        assert_eq!(buf.last_user_text(), Some("tell me about tea"));
        buf.clear();
        assert!(buf.is_empty());
    }
}
