//! Read models for the three persisted records: projects, notes and their order entries.

use serde::{Deserialize, Serialize};

/// A note inside a project's forest.
///
/// `content` is stored on behalf of the caller and never interpreted.
/// The note's rank among its siblings lives in its [`OrderEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The container that scopes one forest of notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Number of notes currently in the project, refreshed on create and delete.
    pub note_count: i64,
    pub created_at: i64,
    /// Bumped on every structural change (create, move, delete).
    pub modified_at: i64,
}

/// The 1-based rank of one note within its sibling group.
///
/// A sibling group is every entry sharing `(project_id, parent_id)`;
/// `parent_id == None` is the project's root group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub note_id: String,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub sequence: i64,
}
