//! `eidoid-memory` – The persona memory engine.
//!
//! Gives every Eidoid persona a durable, bounded memory that survives
//! restarts, evicts what has gone unread the longest, and answers cheap
//! lexical recall queries. Each persona lives in its own local SQLite
//! partition.
//!
//! # Modules
//!
//! - [`store`] – [`PersonaStore`][store::PersonaStore]: the SQLite-backed
//!   entry store and profile record of one persona.
//! - [`quota`] – the least-recently-accessed eviction pass run inside every
//!   append.
//! - [`ranker`] – recency + importance + category + lexical scoring for
//!   recall.
//! - [`profile`] – profile merging, reflection entries and the prompt
//!   summary.
//! - [`tokens`] – the token estimate used for budgeting.
//! - [`extract`] – facts, preferences and emotions mined from user
//!   utterances.
//! - [`session`] – the bounded short-term buffer of recent turns.
//! - [`engine`] – [`MemoryEngine`][engine::MemoryEngine]: the facade with
//!   per-persona locking, admin operations and tool handlers.

pub mod engine;
pub mod error;
pub mod extract;
pub mod profile;
pub mod quota;
pub mod ranker;
pub mod session;
pub mod store;
pub mod tokens;

pub use engine::{ContextRequest, EngineConfig, MemoryEngine, PersonaExport, ResetReport};
pub use error::MemoryError;
pub use quota::Quota;
pub use ranker::RecallQuery;
pub use session::{SessionBuffer, Turn};
pub use store::{AppendOutcome, PersonaStore, StoreLimits};
pub use tokens::token_estimate;
