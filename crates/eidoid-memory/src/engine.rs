//! Memory Engine Facade.
//!
//! [`MemoryEngine`] is the single entry point the session loop, prompt
//! composition and operator tooling use. It owns one lazily opened
//! [`PersonaStore`] per persona, each behind its own async mutex, so work on
//! distinct personas never contends while every operation on one persona
//! (recall included, because it touches recency) is serialised.
//!
//! The conversational paths ([`record`](MemoryEngine::record),
//! [`recall`](MemoryEngine::recall), [`render_context`](MemoryEngine::render_context))
//! never fail: errors are logged and the call degrades to a no-op or an
//! empty result. Administrative paths return [`MemoryError`].
//!
//! # Example
//!
//! ```rust
//! use eidoid_memory::{EngineConfig, MemoryEngine, RecallQuery};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let engine = MemoryEngine::in_memory(EngineConfig::default());
//!     engine.record("jarvis", "user", "My favourite tea is sencha.").await;
//!
//!     // The utterance itself plus the preference mined from it.
//!     let hits = engine.recall("jarvis", &RecallQuery::text("tea")).await;
//!     assert_eq!(hits.len(), 2);
//!     assert!(hits.iter().any(|e| e.text == "User's favorite tea is sencha"));
//! });
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use eidoid_types::tools::{QueryMemoriesArgs, StoreMemoryArgs};
use eidoid_types::{
    Category, EntryId, MemoryEntry, NewEntry, PersonaId, PersonaProfile, PersonaStats,
    ProfileUpdate, Role, TraitDelta,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::MemoryError;
use crate::extract;
use crate::profile::{self, DEFAULT_SUMMARY_TRAITS, truncate_with_ellipsis};
use crate::quota::Quota;
use crate::ranker::{self, RecallQuery};
use crate::session::{DEFAULT_SESSION_TURNS, SessionBuffer};
use crate::store::{AppendOutcome, PersonaStore, StoreLimits};

/// Default character budget of [`MemoryEngine::render_context`].
pub const DEFAULT_CONTEXT_CHARS: usize = 1200;
/// Entries recalled into the prompt context block.
pub const CONTEXT_RECALL_COUNT: usize = 6;
/// Per-entry character cap inside the context block.
pub const CONTEXT_ENTRY_CHARS: usize = 220;
/// Session turns shown in the prompt context block.
pub const CONTEXT_SESSION_TURNS: usize = 6;

const PARTITION_DIR: &str = "personas";
const PARTITION_EXT: &str = "db";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Limits applied to every persona partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_items_per_persona: u64,
    pub max_tokens_per_persona: u64,
    pub max_text_chars: usize,
    pub max_traits: usize,
    /// Turns kept in each persona's short-term session buffer.
    pub session_turns: usize,
    /// Derive fact/preference/emotion entries from user utterances.
    pub extract_user_facts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let quota = Quota::default();
        Self {
            max_items_per_persona: quota.max_items,
            max_tokens_per_persona: quota.max_tokens,
            max_text_chars: StoreLimits::default().max_text_chars,
            max_traits: 32,
            session_turns: DEFAULT_SESSION_TURNS,
            extract_user_facts: true,
        }
    }
}

impl EngineConfig {
    pub fn limits(&self) -> StoreLimits {
        StoreLimits {
            quota: Quota {
                max_items: self.max_items_per_persona,
                max_tokens: self.max_tokens_per_persona,
            },
            max_text_chars: self.max_text_chars,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Admin results
// ─────────────────────────────────────────────────────────────────────────────

/// What [`MemoryEngine::reset_persona`] removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub persona_id: String,
    pub entries_removed: u64,
    pub profile_removed: bool,
}

/// What [`MemoryEngine::render_context_with`] should include.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequest {
    /// Recall query; with none, the newest user turn of the session is used
    /// when short-term context is included.
    pub query: Option<String>,
    /// Append the recent conversation turns after the long-term memories.
    pub include_short_term: bool,
    pub max_chars: usize,
}

impl Default for ContextRequest {
    fn default() -> Self {
        Self {
            query: None,
            include_short_term: false,
            max_chars: DEFAULT_CONTEXT_CHARS,
        }
    }
}

/// Full dump of one persona, as written by the operator's export command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaExport {
    pub persona_id: String,
    pub exported_at: DateTime<Utc>,
    pub profile: Option<PersonaProfile>,
    pub stats: PersonaStats,
    /// Oldest first.
    pub entries: Vec<MemoryEntry>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend / partitions
// ─────────────────────────────────────────────────────────────────────────────

enum Backend {
    /// One database file per persona under `<root>/<persona_id>.db`.
    Directory(PathBuf),
    InMemory,
}

impl Backend {
    fn partition_path(&self, id: &PersonaId) -> Option<PathBuf> {
        match self {
            Backend::Directory(root) => {
                Some(root.join(format!("{}.{PARTITION_EXT}", id.as_str())))
            }
            Backend::InMemory => None,
        }
    }

    fn has_partition(&self, id: &PersonaId) -> bool {
        self.partition_path(id).is_some_and(|p| p.exists())
    }

    fn open_store(&self, id: &PersonaId, limits: StoreLimits) -> Result<PersonaStore, MemoryError> {
        match self.partition_path(id) {
            Some(path) => PersonaStore::open(&path, id.as_str(), limits),
            None => PersonaStore::open_in_memory(id.as_str(), limits),
        }
    }
}

struct Partition {
    id: PersonaId,
    store: Option<PersonaStore>,
    last_stamp: Option<DateTime<Utc>>,
    session: SessionBuffer,
}

impl Partition {
    fn new(id: PersonaId, session_turns: usize) -> Self {
        Self {
            id,
            store: None,
            last_stamp: None,
            session: SessionBuffer::new(session_turns),
        }
    }

    /// The partition's store, opening it on first use. With `create` unset,
    /// a persona without a partition yields `None` and nothing is created.
    fn open(
        &mut self,
        backend: &Backend,
        limits: StoreLimits,
        create: bool,
    ) -> Result<Option<&mut PersonaStore>, MemoryError> {
        if self.store.is_none() {
            if !create && !backend.has_partition(&self.id) {
                return Ok(None);
            }
            let store = backend.open_store(&self.id, limits)?;
            let latest = store.latest_timestamp()?;
            self.last_stamp = self.last_stamp.max(latest);
            debug!(persona = %self.id, "opened persona partition");
            self.store = Some(store);
        }
        Ok(self.store.as_mut())
    }

    /// Like [`open`](Self::open), also issuing the timestamp for a mutating
    /// operation.
    fn begin(
        &mut self,
        backend: &Backend,
        limits: StoreLimits,
        create: bool,
    ) -> Result<Option<(&mut PersonaStore, DateTime<Utc>)>, MemoryError> {
        if self.open(backend, limits, create)?.is_none() {
            return Ok(None);
        }
        let now = self.next_stamp(Utc::now());
        Ok(self.store.as_mut().map(|store| (store, now)))
    }

    /// Strictly increasing per partition, even if the wall clock stalls or
    /// steps back.
    fn next_stamp(&mut self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let stamp = match self.last_stamp {
            Some(last) if wall <= last => last + Duration::microseconds(1),
            _ => wall,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Persona memory engine. Construct once and share behind an [`Arc`].
pub struct MemoryEngine {
    backend: Backend,
    config: EngineConfig,
    partitions: Mutex<HashMap<PersonaId, Arc<AsyncMutex<Partition>>>>,
}

impl MemoryEngine {
    /// Open the engine on `data_dir`; partitions live in
    /// `<data_dir>/personas/`.
    pub fn open(data_dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self, MemoryError> {
        let root = data_dir.as_ref().join(PARTITION_DIR);
        std::fs::create_dir_all(&root)?;
        info!(path = %root.display(), "memory engine opened");
        Ok(Self::with_backend(Backend::Directory(root), config))
    }

    /// Engine whose partitions live only as long as the engine.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::with_backend(Backend::InMemory, config)
    }

    fn with_backend(backend: Backend, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The registry slot of `id`, created on first use.
    fn partition(&self, id: &PersonaId) -> Arc<AsyncMutex<Partition>> {
        let mut map = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
        let session_turns = self.config.session_turns;
        map.entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(Partition::new(id.clone(), session_turns))))
            .clone()
    }

    /// Registry slot for read paths: `None` when the persona has neither a
    /// slot nor an on-disk partition, so probing unknown ids leaves the
    /// registry untouched.
    fn existing_partition(&self, id: &PersonaId) -> Option<Arc<AsyncMutex<Partition>>> {
        {
            let map = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = map.get(id) {
                return Some(Arc::clone(handle));
            }
        }
        if self.backend.has_partition(id) {
            Some(self.partition(id))
        } else {
            None
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────────────

    /// Record one utterance. Returns `None` when nothing was stored.
    pub async fn record(&self, persona: &str, role: impl Into<Role>, text: &str) -> Option<EntryId> {
        self.record_entry(persona, role, NewEntry::new(text)).await
    }

    /// Record `entry`, folding `role` into the category when none is given.
    /// Returns `None` when nothing was stored.
    pub async fn record_entry(
        &self,
        persona: &str,
        role: impl Into<Role>,
        entry: NewEntry,
    ) -> Option<EntryId> {
        match self.try_record(persona, role, entry).await {
            Ok(outcome) if outcome.retained() => Some(outcome.entry.id),
            Ok(_) => {
                warn!(persona, "entry exceeds the token budget and was evicted at once");
                None
            }
            Err(MemoryError::Validation(reason)) => {
                debug!(persona, %reason, "record skipped");
                None
            }
            Err(e) => {
                error!(persona, error = %e, "failed to record memory");
                None
            }
        }
    }

    /// Fallible form of [`record_entry`](Self::record_entry).
    ///
    /// The utterance also joins the persona's session buffer, and a user
    /// utterance is mined for facts, preferences and emotions that are
    /// stored as entries of their own (see [`extract`]).
    pub async fn try_record(
        &self,
        persona: &str,
        role: impl Into<Role>,
        entry: NewEntry,
    ) -> Result<AppendOutcome, MemoryError> {
        let role = role.into();
        let (id, entry) = prepare_entry(persona, &role, entry)?;
        let derived = if role == Role::User && self.config.extract_user_facts {
            extract::derive_entries(&entry.text)
        } else {
            Vec::new()
        };

        let handle = self.partition(&id);
        let mut part = handle.lock().await;
        part.session.push(role, &entry.text, Utc::now());
        let outcome = append_locked(&mut part, &self.backend, self.config.limits(), &entry)?;

        if !outcome.retained() {
            return Ok(outcome);
        }
        for extra in derived {
            let extra = extra.with_tag("role:user");
            match append_locked(&mut part, &self.backend, self.config.limits(), &extra) {
                Ok(o) => debug!(persona = %id, entry = %o.entry.id, category = %o.entry.category, "derived memory stored"),
                Err(e) => warn!(persona = %id, error = %e, "failed to store derived memory"),
            }
        }
        Ok(outcome)
    }

    /// Append `entry` without touching the session buffer or running
    /// extraction.
    async fn append_entry(&self, persona: &str, role: Role, entry: NewEntry) -> Result<AppendOutcome, MemoryError> {
        let (id, entry) = prepare_entry(persona, &role, entry)?;
        let handle = self.partition(&id);
        let mut part = handle.lock().await;
        append_locked(&mut part, &self.backend, self.config.limits(), &entry)
    }

    // ── Retrieval ────────────────────────────────────────────────────────────

    /// Fallible form of [`recall`](Self::recall).
    pub async fn try_recall(&self, persona: &str, query: &RecallQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let id = PersonaId::new(persona)?;
        let Some(handle) = self.existing_partition(&id) else {
            return Ok(Vec::new());
        };
        let mut part = handle.lock().await;
        let Some((store, now)) = part.begin(&self.backend, self.config.limits(), false)? else {
            return Ok(Vec::new());
        };
        let ranked = ranker::rank(store.all_entries()?, query, now);
        let mut entries: Vec<MemoryEntry> = ranked.into_iter().map(|(entry, _)| entry).collect();
        store.touch(&mut entries, now)?;
        Ok(entries)
    }

    /// Top entries for `query`, best first. Every returned entry is touched.
    pub async fn recall(&self, persona: &str, query: &RecallQuery) -> Vec<MemoryEntry> {
        self.try_recall(persona, query).await.unwrap_or_else(|e| {
            warn!(persona, error = %e, "recall failed");
            Vec::new()
        })
    }

    pub async fn try_recent(&self, persona: &str, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        let id = PersonaId::new(persona)?;
        let Some(handle) = self.existing_partition(&id) else {
            return Ok(Vec::new());
        };
        let mut part = handle.lock().await;
        match part.begin(&self.backend, self.config.limits(), false)? {
            Some((store, now)) => store.list_by_recency(limit, now),
            None => Ok(Vec::new()),
        }
    }

    /// Newest entries first. Every returned entry is touched.
    pub async fn recent(&self, persona: &str, limit: usize) -> Vec<MemoryEntry> {
        self.try_recent(persona, limit).await.unwrap_or_else(|e| {
            warn!(persona, error = %e, "listing recent memories failed");
            Vec::new()
        })
    }

    /// Prompt block: profile summary plus the most relevant memories, cut
    /// to `max_chars` characters.
    pub async fn render_context(&self, persona: &str, max_chars: usize) -> String {
        self.render_context_with_query(persona, None, max_chars).await
    }

    pub async fn render_context_with_query(
        &self,
        persona: &str,
        query: Option<&str>,
        max_chars: usize,
    ) -> String {
        let request = ContextRequest {
            query: query.map(str::to_string),
            include_short_term: false,
            max_chars,
        };
        self.render_context_with(persona, &request).await
    }

    /// Prompt block built from `request`: profile summary, the most relevant
    /// long-term memories and, when asked, the recent conversation.
    pub async fn render_context_with(&self, persona: &str, request: &ContextRequest) -> String {
        let mut sections = Vec::new();

        let summary = self.render_profile_summary(persona, DEFAULT_SUMMARY_TRAITS).await;
        if !summary.is_empty() {
            sections.push(summary);
        }

        let (session, last_user) = if request.include_short_term {
            self.session_snapshot(persona).await
        } else {
            (String::new(), None)
        };

        let recall = RecallQuery {
            query: request.query.clone().or(last_user),
            top_k: CONTEXT_RECALL_COUNT,
            categories: Vec::new(),
        };
        let memories = self.recall(persona, &recall).await;
        if !memories.is_empty() {
            let mut lines = vec!["Long-term memories (most relevant):".to_string()];
            for m in &memories {
                let flat = m.text.replace('\n', " ");
                lines.push(format!("- {}", truncate_with_ellipsis(&flat, CONTEXT_ENTRY_CHARS)));
            }
            sections.push(lines.join("\n"));
        }

        if !session.is_empty() {
            sections.push(format!("Recent conversation:\n{session}"));
        }

        truncate_with_ellipsis(&sections.join("\n\n"), request.max_chars)
    }

    /// Rendered session turns plus the newest user utterance.
    async fn session_snapshot(&self, persona: &str) -> (String, Option<String>) {
        let Ok(id) = PersonaId::new(persona) else {
            return (String::new(), None);
        };
        let Some(handle) = self.existing_partition(&id) else {
            return (String::new(), None);
        };
        let part = handle.lock().await;
        (
            part.session.render(CONTEXT_SESSION_TURNS),
            part.session.last_user_text().map(str::to_string),
        )
    }

    // ── Short-term session ───────────────────────────────────────────────────

    /// The last `max_turns` conversation turns as `User: …` lines. Empty for
    /// personas without a live session.
    pub async fn session_context(&self, persona: &str, max_turns: usize) -> String {
        let Ok(id) = PersonaId::new(persona) else {
            return String::new();
        };
        match self.existing_partition(&id) {
            Some(handle) => handle.lock().await.session.render(max_turns),
            None => String::new(),
        }
    }

    /// Drop the short-term session of `persona`; long-term entries stay.
    /// Returns how many turns were discarded.
    pub async fn clear_session(&self, persona: &str) -> Result<usize, MemoryError> {
        let id = PersonaId::new(persona)?;
        let Some(handle) = self.existing_partition(&id) else {
            return Ok(0);
        };
        let mut part = handle.lock().await;
        let dropped = part.session.len();
        part.session.clear();
        debug!(persona = %id, turns = dropped, "session cleared");
        Ok(dropped)
    }

    // ── Profile / personality ────────────────────────────────────────────────

    pub async fn profile(&self, persona: &str) -> Result<Option<PersonaProfile>, MemoryError> {
        let id = PersonaId::new(persona)?;
        let Some(handle) = self.existing_partition(&id) else {
            return Ok(None);
        };
        let mut part = handle.lock().await;
        match part.open(&self.backend, self.config.limits(), false)? {
            Some(store) => store.load_profile(),
            None => Ok(None),
        }
    }

    /// Apply `update` to the persona's profile, creating it if needed.
    pub async fn merge_profile(&self, persona: &str, update: &ProfileUpdate) -> Result<PersonaProfile, MemoryError> {
        let id = PersonaId::new(persona)?;
        let handle = self.partition(&id);
        let mut part = handle.lock().await;
        let Some((store, now)) = part.begin(&self.backend, self.config.limits(), true)? else {
            return Err(MemoryError::NotFound(id.to_string()));
        };
        let merged = profile::merge(store.load_profile()?, id.as_str(), update, self.config.max_traits, now);
        store.save_profile(&merged)?;
        Ok(merged)
    }

    /// Prompt-ready profile summary; empty when there is no profile.
    pub async fn render_profile_summary(&self, persona: &str, max_traits: usize) -> String {
        match self.profile(persona).await {
            Ok(Some(p)) => profile::render_summary(&p, max_traits),
            Ok(None) => String::new(),
            Err(e) => {
                warn!(persona, error = %e, "loading persona profile failed");
                String::new()
            }
        }
    }

    /// Merge `delta` into the profile and record a `reflection` entry
    /// describing it, in one transaction.
    pub async fn update_personality(&self, persona: &str, delta: &TraitDelta) -> Result<PersonaProfile, MemoryError> {
        let id = PersonaId::new(persona)?;
        let handle = self.partition(&id);
        let mut part = handle.lock().await;
        let Some((store, now)) = part.begin(&self.backend, self.config.limits(), true)? else {
            return Err(MemoryError::NotFound(id.to_string()));
        };
        let update = ProfileUpdate {
            traits: delta.traits.clone(),
            style_notes: delta.style_notes.clone(),
            ..ProfileUpdate::default()
        };
        let merged = profile::merge(store.load_profile()?, id.as_str(), &update, self.config.max_traits, now);
        let reflection = profile::reflection_for(delta, self.config.max_text_chars);
        store.save_profile_with_reflection(&merged, reflection.as_ref(), now)?;
        info!(persona = %id, traits = merged.traits.len(), "personality updated");
        Ok(merged)
    }

    /// One evolution step with caller-chosen deltas. Keeps no state of its
    /// own between calls.
    pub async fn evolve(&self, persona: &str, delta: &TraitDelta) -> Result<PersonaProfile, MemoryError> {
        self.update_personality(persona, delta).await
    }

    // ── Administration ───────────────────────────────────────────────────────

    /// Zeroed for personas without data. Does not touch recency.
    pub async fn stats(&self, persona: &str) -> Result<PersonaStats, MemoryError> {
        let id = PersonaId::new(persona)?;
        let empty = || PersonaStats {
            persona_id: id.to_string(),
            ..PersonaStats::default()
        };
        let Some(handle) = self.existing_partition(&id) else {
            return Ok(empty());
        };
        let mut part = handle.lock().await;
        match part.open(&self.backend, self.config.limits(), false)? {
            Some(store) => store.stats(),
            None => Ok(empty()),
        }
    }

    /// Personas that hold data, sorted by id.
    pub async fn list_personas(&self) -> Result<Vec<String>, MemoryError> {
        let mut ids = BTreeSet::new();
        match &self.backend {
            Backend::Directory(root) => {
                for dirent in std::fs::read_dir(root)? {
                    let path = dirent?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(PARTITION_EXT) {
                        continue;
                    }
                    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                    if let Ok(id) = PersonaId::new(stem)
                        && id.as_str() == stem
                    {
                        ids.insert(id.to_string());
                    }
                }
            }
            Backend::InMemory => {
                let handles: Vec<_> = {
                    let map = self.partitions.lock().unwrap_or_else(PoisonError::into_inner);
                    map.values().cloned().collect()
                };
                for handle in handles {
                    let part = handle.lock().await;
                    if let Some(store) = &part.store {
                        if store.stats()?.count > 0 || store.load_profile()?.is_some() {
                            ids.insert(part.id.to_string());
                        }
                    }
                }
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Drop every entry and the profile of `persona` and delete its
    /// partition. Fails with [`MemoryError::NotFound`] for unknown personas.
    pub async fn reset_persona(&self, persona: &str) -> Result<ResetReport, MemoryError> {
        let id = PersonaId::new(persona)?;
        let Some(handle) = self.existing_partition(&id) else {
            return Err(MemoryError::NotFound(id.to_string()));
        };
        let mut part = handle.lock().await;
        let Some(store) = part.open(&self.backend, self.config.limits(), false)? else {
            return Err(MemoryError::NotFound(id.to_string()));
        };
        let report = ResetReport {
            persona_id: id.to_string(),
            entries_removed: store.stats()?.count,
            profile_removed: store.load_profile()?.is_some(),
        };
        // Close the connection before the files go away.
        part.store = None;
        part.session.clear();
        if let Some(path) = self.backend.partition_path(&id) {
            remove_partition_files(&path)?;
        }
        info!(persona = %id, entries = report.entries_removed, "persona reset");
        Ok(report)
    }

    /// Profile and every entry of `persona`. Does not touch recency.
    pub async fn export_persona(&self, persona: &str) -> Result<PersonaExport, MemoryError> {
        let id = PersonaId::new(persona)?;
        let Some(handle) = self.existing_partition(&id) else {
            return Err(MemoryError::NotFound(id.to_string()));
        };
        let mut part = handle.lock().await;
        let Some(store) = part.open(&self.backend, self.config.limits(), false)? else {
            return Err(MemoryError::NotFound(id.to_string()));
        };
        Ok(PersonaExport {
            persona_id: id.to_string(),
            exported_at: Utc::now(),
            profile: store.load_profile()?,
            stats: store.stats()?,
            entries: store.all_entries()?,
        })
    }

    /// Delete a single entry. `false` when it does not exist.
    pub async fn forget(&self, persona: &str, entry: EntryId) -> Result<bool, MemoryError> {
        let id = PersonaId::new(persona)?;
        let Some(handle) = self.existing_partition(&id) else {
            return Ok(false);
        };
        let mut part = handle.lock().await;
        let Some(store) = part.open(&self.backend, self.config.limits(), false)? else {
            return Ok(false);
        };
        let removed = store.forget(entry)?;
        if removed {
            info!(persona = %id, entry = %entry, "memory forgotten");
        }
        Ok(removed)
    }

    // ── Tool handlers ────────────────────────────────────────────────────────

    /// Response payload for a `query_memories` tool call.
    pub async fn query_memories_tool(&self, persona: &str, args: &QueryMemoriesArgs) -> Value {
        let mut query = RecallQuery::text(args.query.clone()).with_top_k(args.effective_max_results());
        if let Some(category) = args.memory_type.category() {
            query = query.with_category(category);
        }
        let memories = match self.try_recall(persona, &query).await {
            Ok(m) => m,
            Err(e) => {
                warn!(persona, error = %e, "query_memories failed");
                return json!({ "status": "ERROR", "message": e.to_string() });
            }
        };
        let total = self.stats(persona).await.map(|s| s.count).unwrap_or(0);
        json!({
            "memories": memories
                .iter()
                .map(|m| json!({
                    "id": m.id,
                    "content": m.text,
                    "type": m.category.as_str(),
                    "importance": m.importance,
                    "timestamp": m.created_at.to_rfc3339(),
                    "tags": m.tags,
                }))
                .collect::<Vec<_>>(),
            "total_memories": total,
        })
    }

    /// Response payload for a `store_important_memory` tool call.
    pub async fn store_memory_tool(&self, persona: &str, args: &StoreMemoryArgs) -> Value {
        let entry = NewEntry::new(args.content.clone())
            .with_category(Category::from(args.memory_type))
            .with_importance(args.importance.value())
            .with_tags(args.tags.iter().cloned());
        match self.append_entry(persona, Role::Assistant, entry).await {
            Ok(outcome) if !outcome.retained() => {
                warn!(persona, "stored memory exceeds the persona token budget and was evicted");
                json!({
                    "status": "ERROR",
                    "message": "memory exceeds the persona token budget",
                })
            }
            Ok(outcome) => json!({
                "status": "OK",
                "id": outcome.entry.id,
                "message": format!("Memory stored successfully for {persona}"),
            }),
            Err(e) => {
                warn!(persona, error = %e, "store_important_memory failed");
                json!({ "status": "ERROR", "message": e.to_string() })
            }
        }
    }
}

/// Validate `persona` and `entry` and fold `role` into the entry.
fn prepare_entry(persona: &str, role: &Role, mut entry: NewEntry) -> Result<(PersonaId, NewEntry), MemoryError> {
    let id = PersonaId::new(persona)?;
    if entry.text.trim().is_empty() {
        return Err(MemoryError::Validation("memory text is empty".to_string()));
    }
    if entry.category.is_none() {
        entry.category = Some(role.default_category());
    }
    entry.tags.push(format!("role:{role}"));
    Ok((id, entry))
}

fn append_locked(
    part: &mut Partition,
    backend: &Backend,
    limits: StoreLimits,
    entry: &NewEntry,
) -> Result<AppendOutcome, MemoryError> {
    let Some((store, now)) = part.begin(backend, limits, true)? else {
        return Err(MemoryError::NotFound(part.id.to_string()));
    };
    let outcome = store.append(entry, now)?;
    if !outcome.evicted.is_empty() {
        debug!(persona = %part.id, evicted = outcome.evicted.len(), "quota enforced");
    }
    Ok(outcome)
}

fn remove_partition_files(db: &Path) -> Result<(), MemoryError> {
    let base = db.as_os_str().to_os_string();
    let mut paths = vec![db.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut p = base.clone();
        p.push(suffix);
        paths.push(PathBuf::from(p));
    }
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
