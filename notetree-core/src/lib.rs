//! Core library for Notetree: dense, collision-free ordering for a forest of
//! notes inside a project.
//!
//! The primary entry point is [`NoteTree`], which represents an open SQLite
//! store. Creating, moving and deleting notes, and renumbering sibling
//! groups, all go through `NoteTree` methods, each in its own transaction.
//!
//! Every sibling group (all notes sharing a project and a parent) keeps its
//! ranks as exactly `1..N`. Moves use a park, shift, place protocol so the
//! store's unique `(project, parent, sequence)` index is never violated, even
//! transiently.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use crate::core::{
    config::{EngineConfig, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_MAX_SUBTREE_DEPTH},
    delete::DeleteResult,
    error::{NoteTreeError, Result},
    integrity::IntegrityIssue,
    normalize::{NormalizeResult, NormalizeScope},
    note::{Note, OrderEntry, Project},
    order::{create_order_entry, group_size, next_sequence},
    storage::Storage,
    tree::NoteTree,
};
