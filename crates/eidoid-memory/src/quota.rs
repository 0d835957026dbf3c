//! Quota Enforcer.
//!
//! Keeps a persona partition within its item ceiling and token budget by
//! deleting the least-recently-accessed entries. Runs inside the same SQLite
//! transaction as the insertion that triggered it, so the quota holds as
//! soon as the append commits.
//!
//! # Policy
//!
//! Eviction order is `(last_accessed_at, created_at, id)` ascending: the
//! entry nobody has read for the longest time goes first. Category and
//! importance never exempt an entry. Two independent passes run on every
//! call:
//!
//! 1. **Item pass** – if `count > max_items`, delete `count - max_items`
//!    entries in eviction order.
//! 2. **Token pass** – while the token sum exceeds `max_tokens`, delete the
//!    single next entry in eviction order.
//!
//! A budget smaller than one entry's estimate empties the partition.

use eidoid_types::EntryId;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

const EVICTION_ORDER: &str = "ORDER BY last_accessed_at ASC, created_at ASC, id ASC";

/// Item ceiling and token budget of one persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub max_items: u64,
    pub max_tokens: u64,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            max_items: 2000,
            max_tokens: 200_000,
        }
    }
}

/// Apply `quota` to the entries visible through `conn`.
///
/// Returns the ids of every evicted entry, in eviction order.
pub fn enforce(conn: &Connection, quota: &Quota) -> Result<Vec<EntryId>, rusqlite::Error> {
    let mut evicted = evict_by_count(conn, quota.max_items)?;
    evicted.extend(evict_by_tokens(conn, quota.max_tokens)?);
    if !evicted.is_empty() {
        debug!(count = evicted.len(), "evicted least-recently-accessed memories");
    }
    Ok(evicted)
}

fn evict_by_count(conn: &Connection, max_items: u64) -> Result<Vec<EntryId>, rusqlite::Error> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_entries", [], |r| r.get(0))?;
    let count = u64::try_from(count).unwrap_or(0);
    if count <= max_items {
        return Ok(Vec::new());
    }
    let excess = i64::try_from(count - max_items).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM memory_entries {EVICTION_ORDER} LIMIT ?1"
    ))?;
    let ids = stmt
        .query_map(params![excess], |r| r.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut delete = conn.prepare_cached("DELETE FROM memory_entries WHERE id = ?1")?;
    for id in &ids {
        delete.execute(params![id])?;
    }
    Ok(ids.into_iter().map(EntryId).collect())
}

fn evict_by_tokens(conn: &Connection, max_tokens: u64) -> Result<Vec<EntryId>, rusqlite::Error> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(token_estimate), 0) FROM memory_entries",
        [],
        |r| r.get(0),
    )?;
    let mut total = u64::try_from(total).unwrap_or(0);
    let mut evicted = Vec::new();
    if total <= max_tokens {
        return Ok(evicted);
    }

    let mut oldest = conn.prepare(&format!(
        "SELECT id, token_estimate FROM memory_entries {EVICTION_ORDER} LIMIT 1"
    ))?;
    let mut delete = conn.prepare_cached("DELETE FROM memory_entries WHERE id = ?1")?;
    while total > max_tokens {
        let next = oldest
            .query_row([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))
            .optional()?;
        let Some((id, tokens)) = next else {
            break;
        };
        delete.execute(params![id])?;
        total = total.saturating_sub(u64::try_from(tokens).unwrap_or(0));
        evicted.push(EntryId(id));
    }
    Ok(evicted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with(rows: &[(&str, i64)]) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE memory_entries (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at       TEXT NOT NULL,
                last_accessed_at TEXT NOT NULL,
                token_estimate   INTEGER NOT NULL
            );",
        )
        .unwrap();
        for (i, (accessed, tokens)) in rows.iter().enumerate() {
            conn.execute(
                "INSERT INTO memory_entries (created_at, last_accessed_at, token_estimate)
                 VALUES (?1, ?2, ?3)",
                params![format!("2026-01-01T00:00:0{i}Z"), accessed, tokens],
            )
            .unwrap();
        }
        conn
    }

    fn remaining(conn: &Connection) -> Vec<i64> {
        let mut stmt = conn.prepare("SELECT id FROM memory_entries ORDER BY id").unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn within_quota_evicts_nothing() {
        let conn = conn_with(&[("2026-01-01T00:00:00Z", 1), ("2026-01-01T00:00:01Z", 1)]);
        let quota = Quota { max_items: 2, max_tokens: 2 };
        assert!(enforce(&conn, &quota).unwrap().is_empty());
        assert_eq!(remaining(&conn), vec![1, 2]);
    }

    #[test]
    fn item_pass_removes_least_recently_accessed() {
        // Entry 1 was read most recently, so entry 2 is the oldest access.
        let conn = conn_with(&[
            ("2026-01-01T00:09:00Z", 1),
            ("2026-01-01T00:00:01Z", 1),
            ("2026-01-01T00:00:02Z", 1),
        ]);
        let quota = Quota { max_items: 2, max_tokens: 100 };
        assert_eq!(enforce(&conn, &quota).unwrap(), vec![EntryId(2)]);
        assert_eq!(remaining(&conn), vec![1, 3]);
    }

    #[test]
    fn ties_fall_back_to_creation_order() {
        let same = "2026-01-01T00:05:00Z";
        let conn = conn_with(&[(same, 1), (same, 1), (same, 1)]);
        let quota = Quota { max_items: 1, max_tokens: 100 };
        assert_eq!(enforce(&conn, &quota).unwrap(), vec![EntryId(1), EntryId(2)]);
    }

    #[test]
    fn token_pass_runs_until_under_budget() {
        let conn = conn_with(&[
            ("2026-01-01T00:00:00Z", 1),
            ("2026-01-01T00:00:01Z", 10),
        ]);
        let quota = Quota { max_items: 10, max_tokens: 10 };
        assert_eq!(enforce(&conn, &quota).unwrap(), vec![EntryId(1)]);
        assert_eq!(remaining(&conn), vec![2]);
    }

    #[test]
    fn both_passes_can_fire_in_one_call() {
        let conn = conn_with(&[
            ("2026-01-01T00:00:00Z", 5),
            ("2026-01-01T00:00:01Z", 5),
            ("2026-01-01T00:00:02Z", 5),
        ]);
        let quota = Quota { max_items: 2, max_tokens: 5 };
        assert_eq!(enforce(&conn, &quota).unwrap(), vec![EntryId(1), EntryId(2)]);
        assert_eq!(remaining(&conn), vec![3]);
    }

    #[test]
    fn budget_below_one_entry_empties_partition() {
        let conn = conn_with(&[("2026-01-01T00:00:00Z", 12)]);
        let quota = Quota { max_items: 10, max_tokens: 5 };
        assert_eq!(enforce(&conn, &quota).unwrap(), vec![EntryId(1)]);
        assert!(remaining(&conn).is_empty());
    }
}
