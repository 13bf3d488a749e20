//! Subtree removal.
//!
//! [`DeleteResult`] reports what a [`NoteTree::delete_subtree`] call removed.
//! Collection is breadth-first over parent links with an explicit depth
//! counter. Reaching the configured cap is an error rather than a silent
//! cutoff, since stopping early would leave notes pointing at a deleted
//! ancestor.
//!
//! Deleting does not renumber the surviving siblings of the removed root;
//! the gap is closed by the next [`NoteTree::normalize`] or by the repair
//! pass of a move touching that group.
//!
//! ## Serialization
//!
//! `DeleteResult` fields serialize in camelCase (`deletedCount`,
//! `affectedIds`).
//!
//! ```rust
//! use notetree_core::DeleteResult;
//!
//! let result = DeleteResult {
//!     deleted_count: 3,
//!     affected_ids: vec!["a".to_string(), "b".to_string(), "c".to_string()],
//! };
//! let json = serde_json::to_string(&result).unwrap();
//! assert!(json.contains("deletedCount"));
//! assert!(json.contains("affectedIds"));
//! ```
//!
//! [`NoteTree::delete_subtree`]: super::tree::NoteTree::delete_subtree
//! [`NoteTree::normalize`]: super::tree::NoteTree::normalize

use crate::{NoteTreeError, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The outcome of a subtree deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// The total number of notes that were permanently removed.
    pub deleted_count: usize,

    /// IDs of all removed notes, the subtree root first, then breadth-first.
    pub affected_ids: Vec<String>,
}

/// Returns `root_id` followed by every descendant, breadth-first.
///
/// The root is depth 0. A note at depth `max_depth` that still has children
/// fails the walk with [`NoteTreeError::DepthLimitExceeded`]. Each note is
/// visited once, so a parent cycle reachable from the root terminates.
pub(crate) fn collect_subtree(
    conn: &Connection,
    root_id: &str,
    max_depth: usize,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM notes WHERE parent_id = ?1 ORDER BY id")?;
    let mut visited: HashSet<String> = HashSet::from([root_id.to_string()]);
    let mut collected = vec![root_id.to_string()];
    let mut frontier = vec![root_id.to_string()];
    let mut depth = 0;

    loop {
        let mut next = Vec::new();
        for id in &frontier {
            let child_ids = stmt
                .query_map([id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            next.extend(child_ids.into_iter().filter(|c| visited.insert(c.clone())));
        }
        if next.is_empty() {
            return Ok(collected);
        }
        if depth == max_depth {
            return Err(NoteTreeError::DepthLimitExceeded {
                root: root_id.to_string(),
                limit: max_depth,
            });
        }
        depth += 1;
        collected.extend(next.iter().cloned());
        frontier = next;
    }
}

/// Deletes `root_id` and its descendants within an existing transaction,
/// then recounts the owning project's notes.
///
/// Rows are removed leaves-first so the parent foreign key holds after each
/// statement. The caller commits; any error leaves the store untouched once
/// the transaction is dropped.
///
/// # Errors
///
/// Returns [`NoteTreeError::NoteNotFound`] if `root_id` does not exist,
/// [`NoteTreeError::DepthLimitExceeded`] from [`collect_subtree`], or
/// [`NoteTreeError::Database`] for any SQLite failure.
pub(crate) fn delete_subtree_in_tx(
    conn: &Connection,
    root_id: &str,
    max_depth: usize,
) -> Result<(String, DeleteResult)> {
    let project_id: String = conn
        .query_row(
            "SELECT project_id FROM notes WHERE id = ?1",
            [root_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| NoteTreeError::NoteNotFound(root_id.to_string()))?;

    let affected_ids = collect_subtree(conn, root_id, max_depth)?;

    for id in affected_ids.iter().rev() {
        conn.execute("DELETE FROM note_order WHERE note_id = ?1", [id])?;
        conn.execute("DELETE FROM notes WHERE id = ?1", [id])?;
    }

    conn.execute(
        "UPDATE projects
         SET note_count = (SELECT COUNT(*) FROM notes WHERE project_id = ?1),
             modified_at = ?2
         WHERE id = ?1",
        rusqlite::params![project_id, chrono::Utc::now().timestamp()],
    )?;

    Ok((
        project_id,
        DeleteResult {
            deleted_count: affected_ids.len(),
            affected_ids,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, Storage};

    /// A chain `n0 -> n1 -> ... -> n{len-1}` in project `p`.
    fn chain(len: usize) -> Storage {
        let mut storage = Storage::open_in_memory(&EngineConfig::default()).unwrap();
        let tx = storage.immediate_transaction().unwrap();
        tx.execute(
            "INSERT INTO projects (id, name, created_at, modified_at) VALUES ('p', 'P', 0, 0)",
            [],
        )
        .unwrap();
        for i in 0..len {
            let parent = (i > 0).then(|| format!("n{}", i - 1));
            tx.execute(
                "INSERT INTO notes (id, project_id, parent_id, content, created_at, updated_at)
                 VALUES (?1, 'p', ?2, '', 0, 0)",
                rusqlite::params![format!("n{i}"), parent],
            )
            .unwrap();
            tx.execute(
                "INSERT INTO note_order (note_id, project_id, parent_id, sequence)
                 VALUES (?1, 'p', ?2, 1)",
                rusqlite::params![format!("n{i}"), parent],
            )
            .unwrap();
        }
        tx.commit().unwrap();
        storage
    }

    #[test]
    fn test_collect_subtree_breadth_first() {
        let storage = chain(4);
        let ids = collect_subtree(storage.connection(), "n1", 10).unwrap();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn test_collect_subtree_at_exact_limit_succeeds() {
        let storage = chain(4);
        // n0 has descendants at depths 1, 2 and 3.
        assert_eq!(collect_subtree(storage.connection(), "n0", 3).unwrap().len(), 4);
    }

    #[test]
    fn test_collect_subtree_past_limit_is_reported() {
        let storage = chain(4);
        let err = collect_subtree(storage.connection(), "n0", 2).unwrap_err();
        assert!(matches!(
            err,
            NoteTreeError::DepthLimitExceeded { ref root, limit: 2 } if root == "n0"
        ));
    }

    #[test]
    fn test_collect_subtree_terminates_on_cycle() {
        let storage = chain(3);
        storage
            .connection()
            .execute("UPDATE notes SET parent_id = 'n2' WHERE id = 'n0'", [])
            .unwrap();
        let ids = collect_subtree(storage.connection(), "n0", 10).unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_delete_subtree_in_tx_recounts_project() {
        let storage = chain(3);
        storage
            .connection()
            .execute("UPDATE projects SET note_count = 3 WHERE id = 'p'", [])
            .unwrap();
        let (project, result) = delete_subtree_in_tx(storage.connection(), "n1", 10).unwrap();
        assert_eq!(project, "p");
        assert_eq!(result.deleted_count, 2);
        let count: i64 = storage
            .connection()
            .query_row("SELECT note_count FROM projects WHERE id = 'p'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_delete_subtree_in_tx_not_found() {
        let storage = chain(1);
        let err = delete_subtree_in_tx(storage.connection(), "missing", 10).unwrap_err();
        assert!(matches!(err, NoteTreeError::NoteNotFound(_)));
    }
}
