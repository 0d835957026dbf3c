//! Error type shared by every memory component.

use eidoid_types::InvalidPersonaId;
use thiserror::Error;

/// Errors that can arise from persona memory operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Rejected caller input (empty or oversized text, bad persona id).
    #[error("Validation error: {0}")]
    Validation(String),
    /// An administrative operation addressed a persona without data.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MemoryError {
    /// `true` for failures of the persistence layer rather than of the input.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            MemoryError::Sqlite(_) | MemoryError::Io(_) | MemoryError::Serialization(_)
        )
    }
}

impl From<InvalidPersonaId> for MemoryError {
    fn from(e: InvalidPersonaId) -> Self {
        MemoryError::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_classified() {
        let io = MemoryError::from(std::io::Error::other("disk full"));
        assert!(io.is_storage());
        assert!(!MemoryError::Validation("empty".into()).is_storage());
        assert!(!MemoryError::NotFound("jarvis".into()).is_storage());
    }

    #[test]
    fn invalid_persona_id_becomes_validation_error() {
        let err = MemoryError::from(InvalidPersonaId::Empty);
        assert!(matches!(err, MemoryError::Validation(_)));
        assert!(err.to_string().contains("must not be empty"));
    }
}
