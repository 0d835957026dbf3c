//! Argument types for the memory tools the session loop declares to the
//! conversational API.
//!
//! The JSON Schemas generated from these types are sent verbatim as the
//! tools' `parameters`, so the model can only produce arguments the engine
//! knows how to parse.

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::{Deserialize, Serialize};

use crate::{Category, ImportanceLevel};

pub const QUERY_MEMORIES_TOOL: &str = "query_memories";
pub const STORE_MEMORY_TOOL: &str = "store_important_memory";

/// Upper bound on `max_results` accepted from the model.
pub const MAX_TOOL_RESULTS: u8 = 10;

/// Kind of memory the model may store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Fact,
    Preference,
    Experience,
    Emotion,
    Skill,
    Personality,
}

impl From<MemoryKind> for Category {
    fn from(kind: MemoryKind) -> Self {
        match kind {
            MemoryKind::Fact => Category::Fact,
            MemoryKind::Preference => Category::Preference,
            MemoryKind::Experience => Category::Experience,
            MemoryKind::Emotion => Category::Emotion,
            MemoryKind::Skill => Category::Skill,
            MemoryKind::Personality => Category::Personality,
        }
    }
}

/// Category filter for `query_memories`; `all` disables filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTypeFilter {
    Fact,
    Preference,
    Experience,
    Emotion,
    Skill,
    Personality,
    #[default]
    All,
}

impl MemoryTypeFilter {
    pub fn category(self) -> Option<Category> {
        let kind = match self {
            MemoryTypeFilter::Fact => MemoryKind::Fact,
            MemoryTypeFilter::Preference => MemoryKind::Preference,
            MemoryTypeFilter::Experience => MemoryKind::Experience,
            MemoryTypeFilter::Emotion => MemoryKind::Emotion,
            MemoryTypeFilter::Skill => MemoryKind::Skill,
            MemoryTypeFilter::Personality => MemoryKind::Personality,
            MemoryTypeFilter::All => return None,
        };
        Some(kind.into())
    }
}

/// Search through long-term memories for past conversations, user
/// preferences, or shared experiences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryMemoriesArgs {
    /// Search query to find relevant memories.
    pub query: String,
    /// Type of memory to search for (default: all).
    #[serde(default)]
    pub memory_type: MemoryTypeFilter,
    /// Maximum number of memories to return (default: 5, at most 10).
    #[serde(default)]
    pub max_results: Option<u8>,
}

impl QueryMemoriesArgs {
    pub fn effective_max_results(&self) -> usize {
        usize::from(self.max_results.unwrap_or(5).clamp(1, MAX_TOOL_RESULTS))
    }
}

/// Explicitly store an important fact, preference, or experience in
/// long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StoreMemoryArgs {
    /// The memory content to store.
    pub content: String,
    /// Type of memory.
    pub memory_type: MemoryKind,
    /// Importance level of the memory.
    pub importance: ImportanceLevel,
    /// Optional tags for categorizing the memory.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A function declaration as sent to the conversational API.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: RootSchema,
}

/// Declarations for every memory tool, ready to be serialised into the
/// session setup message.
pub fn memory_tool_declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: QUERY_MEMORIES_TOOL,
            description: "Search through long-term memories to find relevant information \
                          about past conversations, user preferences, or shared experiences.",
            parameters: schemars::schema_for!(QueryMemoriesArgs),
        },
        ToolDeclaration {
            name: STORE_MEMORY_TOOL,
            description: "Explicitly store an important fact, preference, or experience \
                          in long-term memory.",
            parameters: schemars::schema_for!(StoreMemoryArgs),
        },
    ]
}
