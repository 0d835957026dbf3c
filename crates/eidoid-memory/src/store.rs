//! Entry Store – one durable SQLite partition per persona.
//!
//! Persists [`MemoryEntry`] records and the persona's [`PersonaProfile`].
//! Entries are only ever inserted, touched (their `last_accessed_at`
//! refreshed) or deleted by quota eviction, `forget`, or a persona reset.
//!
//! # Storage layout
//!
//! Table `memory_entries`:
//!
//! | column           | type    | description                                   |
//! |------------------|---------|-----------------------------------------------|
//! | id               | INTEGER | `AUTOINCREMENT` key, never reused             |
//! | persona_id       | TEXT    | Owning persona                                |
//! | text             | TEXT    | Trimmed content                               |
//! | category         | TEXT    | Open category tag                             |
//! | importance       | REAL    | Clamped to `[0, 1]`                           |
//! | created_at       | TEXT    | RFC-3339 UTC, nanosecond precision            |
//! | last_accessed_at | TEXT    | RFC-3339 UTC, nanosecond precision            |
//! | token_estimate   | INTEGER | Computed once at insert                       |
//! | tags             | TEXT    | JSON array of strings                         |
//!
//! Table `persona_profile` holds at most one row (the persona's profile,
//! traits as a JSON array).
//!
//! Timestamps are written in a fixed-width format so that lexical order in
//! SQL equals chronological order and a reload reproduces them exactly.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use eidoid_memory::store::{PersonaStore, StoreLimits};
//! use eidoid_types::NewEntry;
//!
//! let mut store = PersonaStore::open_in_memory("jarvis", StoreLimits::default()).unwrap();
//! let outcome = store
//!     .append(&NewEntry::new("The user's cat is called Miso.").with_category("fact"), Utc::now())
//!     .unwrap();
//! assert!(outcome.evicted.is_empty());
//! assert_eq!(store.stats().unwrap().count, 1);
//! ```

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use eidoid_types::{Category, EntryId, MemoryEntry, NewEntry, PersonaProfile, PersonaStats};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::MemoryError;
use crate::quota::{self, Quota};
use crate::tokens::token_estimate;

const ENTRY_COLUMNS: &str = "id, persona_id, text, category, importance, created_at, \
                             last_accessed_at, token_estimate, tags";

// ─────────────────────────────────────────────────────────────────────────────
// Limits / outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Per-partition limits, fixed when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    pub quota: Quota,
    /// Longest accepted entry text, in characters.
    pub max_text_chars: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            quota: Quota::default(),
            max_text_chars: 8192,
        }
    }
}

/// Result of a successful [`PersonaStore::append`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    /// The entry as persisted.
    pub entry: MemoryEntry,
    /// Entries removed by the quota pass, in eviction order. May contain
    /// the new entry itself when the token budget is smaller than it.
    pub evicted: Vec<EntryId>,
}

impl AppendOutcome {
    /// `false` when the quota pass removed the entry that was just inserted.
    pub fn retained(&self) -> bool {
        !self.evicted.contains(&self.entry.id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timestamp helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn decode_json_list(idx: usize, raw: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoryEntry> {
    let created: String = row.get(5)?;
    let accessed: String = row.get(6)?;
    let tags: String = row.get(8)?;
    let importance: f64 = row.get(4)?;
    let token_estimate: i64 = row.get(7)?;
    Ok(MemoryEntry {
        id: EntryId(row.get(0)?),
        persona_id: row.get(1)?,
        text: row.get(2)?,
        category: Category::parse(&row.get::<_, String>(3)?),
        importance: importance as f32,
        created_at: decode_ts(5, &created)?,
        last_accessed_at: decode_ts(6, &accessed)?,
        token_estimate: u32::try_from(token_estimate).unwrap_or(0),
        tags: decode_json_list(8, &tags)?,
    })
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<PersonaProfile> {
    let traits: String = row.get(5)?;
    let updated: String = row.get(7)?;
    Ok(PersonaProfile {
        persona_id: row.get(0)?,
        display_name: row.get(1)?,
        world_description: row.get(2)?,
        personality: row.get(3)?,
        voice: row.get(4)?,
        traits: decode_json_list(5, &traits)?,
        style_notes: row.get(6)?,
        updated_at: decode_ts(7, &updated)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// PersonaStore
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite-backed memory partition of a single persona.
pub struct PersonaStore {
    conn: Connection,
    persona_id: String,
    limits: StoreLimits,
}

impl PersonaStore {
    /// Open (or create) the partition database at `path`.
    pub fn open(path: &Path, persona_id: &str, limits: StoreLimits) -> Result<Self, MemoryError> {
        let conn = Connection::open(path)?;
        // WAL + FULL sync: a committed append survives a crash or power cut.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        Self::init(conn, persona_id, limits)
    }

    /// Open a temporary in-memory partition (useful for testing).
    pub fn open_in_memory(persona_id: &str, limits: StoreLimits) -> Result<Self, MemoryError> {
        Self::init(Connection::open_in_memory()?, persona_id, limits)
    }

    fn init(conn: Connection, persona_id: &str, limits: StoreLimits) -> Result<Self, MemoryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memory_entries (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                persona_id       TEXT NOT NULL,
                text             TEXT NOT NULL,
                category         TEXT NOT NULL,
                importance       REAL NOT NULL,
                created_at       TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                token_estimate   INTEGER NOT NULL,
                tags             TEXT NOT NULL DEFAULT '[]'
            );
            CREATE INDEX IF NOT EXISTS idx_memory_access
                ON memory_entries (last_accessed_at, created_at);
            CREATE TABLE IF NOT EXISTS persona_profile (
                persona_id        TEXT NOT NULL PRIMARY KEY,
                display_name      TEXT,
                world_description TEXT,
                personality       TEXT,
                voice             TEXT,
                traits            TEXT NOT NULL DEFAULT '[]',
                style_notes       TEXT,
                updated_at        TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn,
            persona_id: persona_id.to_string(),
            limits,
        })
    }

    pub fn persona_id(&self) -> &str {
        &self.persona_id
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Insert a new entry, enforce the quota, and commit.
    ///
    /// Returns [`MemoryError::Validation`] for empty or oversized text; no
    /// row is written in that case.
    pub fn append(&mut self, new: &NewEntry, now: DateTime<Utc>) -> Result<AppendOutcome, MemoryError> {
        let prepared = self.prepare_entry(new, now)?;
        let tx = self.conn.transaction()?;
        let outcome = insert_and_enforce(&tx, prepared, &self.limits.quota)?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Persist `profile` and, when given, append `reflection` – atomically.
    pub fn save_profile_with_reflection(
        &mut self,
        profile: &PersonaProfile,
        reflection: Option<&NewEntry>,
        now: DateTime<Utc>,
    ) -> Result<Option<AppendOutcome>, MemoryError> {
        let prepared = reflection
            .map(|r| self.prepare_entry(r, now))
            .transpose()?;
        let tx = self.conn.transaction()?;
        write_profile(&tx, profile)?;
        let outcome = match prepared {
            Some(entry) => Some(insert_and_enforce(&tx, entry, &self.limits.quota)?),
            None => None,
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn prepare_entry(&self, new: &NewEntry, now: DateTime<Utc>) -> Result<MemoryEntry, MemoryError> {
        let text = new.text.trim();
        if text.is_empty() {
            return Err(MemoryError::Validation("memory text is empty".to_string()));
        }
        let chars = text.chars().count();
        if chars > self.limits.max_text_chars {
            return Err(MemoryError::Validation(format!(
                "memory text is {chars} characters, limit is {}",
                self.limits.max_text_chars
            )));
        }
        Ok(MemoryEntry {
            id: EntryId(0),
            persona_id: self.persona_id.clone(),
            text: text.to_string(),
            category: new.resolved_category(),
            importance: new.resolved_importance(),
            created_at: now,
            last_accessed_at: now,
            token_estimate: token_estimate(text),
            tags: new.normalized_tags(),
        })
    }

    /// Newest entries first (by `created_at`), touching each one returned.
    pub fn list_by_recency(&mut self, limit: usize, now: DateTime<Utc>) -> Result<Vec<MemoryEntry>, MemoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut entries = {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries
                 ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))?;
            stmt.query_map(params![limit], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?
        };
        self.touch(&mut entries, now)?;
        Ok(entries)
    }

    /// Every entry, oldest first. Read-only: recency is not touched.
    pub fn all_entries(&self) -> Result<Vec<MemoryEntry>, MemoryError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM memory_entries ORDER BY created_at ASC, id ASC"
        ))?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Refresh `last_accessed_at` of `entries` to `now` (never earlier than
    /// their `created_at`), both on disk and in the given values.
    pub fn touch(&mut self, entries: &mut [MemoryEntry], now: DateTime<Utc>) -> Result<(), MemoryError> {
        if entries.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE memory_entries SET last_accessed_at = ?1 WHERE id = ?2",
            )?;
            for entry in entries.iter_mut() {
                let ts = now.max(entry.created_at);
                stmt.execute(params![encode_ts(ts), entry.id.0])?;
                entry.last_accessed_at = ts;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete one entry. Returns `false` when no such entry exists.
    pub fn forget(&mut self, id: EntryId) -> Result<bool, MemoryError> {
        let removed = self
            .conn
            .execute("DELETE FROM memory_entries WHERE id = ?1", params![id.0])?;
        Ok(removed > 0)
    }

    /// Count, token sum, mean importance and creation range. Read-only.
    pub fn stats(&self) -> Result<PersonaStats, MemoryError> {
        let (count, tokens, avg, oldest, newest) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(token_estimate), 0), COALESCE(AVG(importance), 0.0),
                    MIN(created_at), MAX(created_at)
             FROM memory_entries",
            [],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, f64>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            },
        )?;
        Ok(PersonaStats {
            persona_id: self.persona_id.clone(),
            count: u64::try_from(count).unwrap_or(0),
            token_sum: u64::try_from(tokens).unwrap_or(0),
            avg_importance: avg as f32,
            oldest: oldest.map(|s| decode_ts(3, &s)).transpose()?,
            newest: newest.map(|s| decode_ts(4, &s)).transpose()?,
        })
    }

    /// Latest timestamp recorded anywhere in the partition.
    pub fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, MemoryError> {
        let raw: Option<String> = self.conn.query_row(
            "SELECT MAX(last_accessed_at) FROM memory_entries",
            [],
            |r| r.get(0),
        )?;
        Ok(raw.map(|s| decode_ts(0, &s)).transpose()?)
    }

    pub fn load_profile(&self) -> Result<Option<PersonaProfile>, MemoryError> {
        let profile = self
            .conn
            .query_row(
                "SELECT persona_id, display_name, world_description, personality, voice,
                        traits, style_notes, updated_at
                 FROM persona_profile WHERE persona_id = ?1",
                params![self.persona_id],
                row_to_profile,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn save_profile(&mut self, profile: &PersonaProfile) -> Result<(), MemoryError> {
        write_profile(&self.conn, profile)
    }
}

fn insert_and_enforce(
    conn: &Connection,
    mut entry: MemoryEntry,
    quota: &Quota,
) -> Result<AppendOutcome, MemoryError> {
    conn.execute(
        "INSERT INTO memory_entries
             (persona_id, text, category, importance, created_at, last_accessed_at,
              token_estimate, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.persona_id,
            entry.text,
            entry.category.as_str(),
            f64::from(entry.importance),
            encode_ts(entry.created_at),
            encode_ts(entry.last_accessed_at),
            i64::from(entry.token_estimate),
            serde_json::to_string(&entry.tags)?,
        ],
    )?;
    entry.id = EntryId(conn.last_insert_rowid());
    let evicted = quota::enforce(conn, quota)?;
    Ok(AppendOutcome { entry, evicted })
}

fn write_profile(conn: &Connection, profile: &PersonaProfile) -> Result<(), MemoryError> {
    conn.execute(
        "INSERT OR REPLACE INTO persona_profile
             (persona_id, display_name, world_description, personality, voice,
              traits, style_notes, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            profile.persona_id,
            profile.display_name,
            profile.world_description,
            profile.personality,
            profile.voice,
            serde_json::to_string(&profile.traits)?,
            profile.style_notes,
            encode_ts(profile.updated_at),
        ],
    )?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
