//! Error types for the Notetree core library.

use thiserror::Error;

/// All errors that can occur within the Notetree core library.
///
/// Every variant aborts the transaction it was raised in; no partial ordering
/// change survives an error.
#[derive(Debug, Error)]
pub enum NoteTreeError {
    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A note ID was requested that does not exist (or not in the expected project).
    #[error("Note not found: {0}")]
    NoteNotFound(String),

    /// A project ID was requested that does not exist.
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// A move would make a note its own parent or place it under its own subtree.
    #[error("Invalid move: {0}")]
    InvalidMove(String),

    /// A tree walk reached the configured depth cap before finishing.
    #[error("Subtree rooted at {root} is deeper than the limit of {limit}")]
    DepthLimitExceeded {
        /// Note the walk started from.
        root: String,
        /// Depth cap that was in force.
        limit: usize,
    },

    /// A sibling group was left with duplicate sequences after a move, even
    /// after the repair pass. Indicates corrupted data or a logic bug.
    #[error("Sequence constraint violated in project {project_id}, group {}: {detail}", group_label(.parent_id))]
    ConstraintViolation {
        /// Project owning the broken group.
        project_id: String,
        /// Parent key of the broken group (`None` for the root group).
        parent_id: Option<String>,
        /// What was detected.
        detail: String,
    },

    /// The opened file is not a valid Notetree store.
    #[error("Invalid store: {0}")]
    InvalidStore(String),

    /// The engine configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias that pins the error type to [`NoteTreeError`].
pub type Result<T> = std::result::Result<T, NoteTreeError>;

fn group_label(parent_id: &Option<String>) -> &str {
    parent_id.as_deref().unwrap_or("<root>")
}

impl NoteTreeError {
    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(e) => format!("Failed to save: {e}"),
            Self::NoteNotFound(_) => "Note no longer exists".to_string(),
            Self::ProjectNotFound(_) => "Project no longer exists".to_string(),
            Self::InvalidMove(msg) => msg.clone(),
            Self::DepthLimitExceeded { .. } => {
                "Could not delete: the note tree is too deep".to_string()
            }
            Self::ConstraintViolation { .. } => {
                "Could not reorder notes. Please repair the project and try again".to_string()
            }
            Self::InvalidStore(_) => "Could not open note store".to_string(),
            Self::InvalidConfig(msg) => format!("Bad configuration: {msg}"),
            Self::Io(e) => format!("File error: {e}"),
            Self::Json(e) => format!("Data format error: {e}"),
        }
    }

    /// True for the invariant-failure class that must not be retried blindly.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_violation_names_root_group() {
        let e = NoteTreeError::ConstraintViolation {
            project_id: "p1".to_string(),
            parent_id: None,
            detail: "duplicate sequence 2".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("<root>"), "got: {msg}");
        assert!(msg.contains("duplicate sequence 2"));
        assert!(e.is_fatal());
    }

    #[test]
    fn test_depth_limit_message_mentions_limit() {
        let e = NoteTreeError::DepthLimitExceeded {
            root: "n1".to_string(),
            limit: 50,
        };
        assert!(e.to_string().contains("50"));
        assert!(!e.is_fatal());
        assert!(e.user_message().contains("too deep"));
    }
}
