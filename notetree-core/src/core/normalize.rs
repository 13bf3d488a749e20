//! Dense renumbering of sibling groups.
//!
//! ## Ordering
//!
//! Entries are ranked by their current `sequence`, and entries sharing a
//! sequence are ranked by `note_id`. The result is therefore a pure function
//! of the group's contents, whatever state a corruption left it in.
//!
//! ## Idempotence
//!
//! Only entries whose rank changes are written. Running the normalizer on a
//! group that is already `{1..N}` touches no rows.

use crate::core::order;
use crate::{NoteTreeError, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Which sibling groups of a project to renumber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NormalizeScope {
    /// Every group that currently has entries.
    AllGroups,
    /// One group; `None` is the project's root group.
    Group(Option<String>),
}

/// The outcome of a normalize pass.
///
/// # Examples
///
/// ```rust
/// use notetree_core::NormalizeResult;
///
/// let result = NormalizeResult { groups_scanned: 2, entries_renumbered: 0 };
/// let json = serde_json::to_string(&result).unwrap();
/// assert!(json.contains("entriesRenumbered"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeResult {
    /// Number of groups visited.
    pub groups_scanned: usize,
    /// Number of entries whose sequence was rewritten.
    pub entries_renumbered: usize,
}

/// Normalizes the groups selected by `scope` inside an existing transaction.
///
/// # Errors
///
/// Returns [`NoteTreeError::ProjectNotFound`] if `project_id` does not exist,
/// or [`NoteTreeError::Database`] for any SQLite failure.
pub(crate) fn normalize_in_tx(
    conn: &Connection,
    project_id: &str,
    scope: &NormalizeScope,
) -> Result<NormalizeResult> {
    let exists = conn
        .query_row("SELECT 1 FROM projects WHERE id = ?1", [project_id], |_| Ok(()))
        .optional()?;
    if exists.is_none() {
        return Err(NoteTreeError::ProjectNotFound(project_id.to_string()));
    }

    let parents = match scope {
        NormalizeScope::AllGroups => order::list_group_parents(conn, project_id)?,
        NormalizeScope::Group(parent) => vec![parent.clone()],
    };

    let mut result = NormalizeResult::default();
    for parent in &parents {
        result.entries_renumbered += normalize_group(conn, project_id, parent.as_deref())?;
        result.groups_scanned += 1;
    }
    Ok(result)
}

/// Renumbers one group to `{1..N}` and returns how many entries changed.
///
/// Changed rows are first parked below every existing value
/// (`-(offset + rank)`) and then flipped to `rank`, so neither the staging
/// writes nor the final writes can collide under the unique group index,
/// even when the group already holds zero or negative sequences.
pub(crate) fn normalize_group(
    conn: &Connection,
    project_id: &str,
    parent_id: Option<&str>,
) -> Result<usize> {
    let entries = order::list_group(conn, project_id, parent_id)?;
    let offset = entries
        .iter()
        .map(|e| e.sequence.abs())
        .max()
        .unwrap_or(0);

    let mut renumbered = 0;
    for (index, entry) in entries.iter().enumerate() {
        let rank = index as i64 + 1;
        if entry.sequence == rank {
            continue;
        }
        conn.execute(
            "UPDATE note_order SET sequence = ?2 WHERE note_id = ?1",
            rusqlite::params![entry.note_id, -(offset + rank)],
        )?;
        renumbered += 1;
    }

    if renumbered > 0 {
        conn.execute(
            "UPDATE note_order SET sequence = -sequence - ?3
             WHERE project_id = ?1 AND parent_id IS ?2 AND sequence < -?3",
            rusqlite::params![project_id, parent_id, offset],
        )?;
    }
    Ok(renumbered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, Storage};

    /// Builds project `p` with root notes `a`, `b`, `c` at the given sequences,
    /// with the unique group index dropped so the sequences may collide.
    fn corrupted_root(seqs: [(&str, i64); 3]) -> Storage {
        let mut storage = Storage::open_in_memory(&EngineConfig::default()).unwrap();
        let tx = storage.immediate_transaction().unwrap();
        tx.execute_batch(
            "DROP INDEX note_order_group_seq;
             INSERT INTO projects (id, name, created_at, modified_at) VALUES ('p', 'P', 0, 0);",
        )
        .unwrap();
        for (id, seq) in seqs {
            tx.execute(
                "INSERT INTO notes (id, project_id, parent_id, content, created_at, updated_at)
                 VALUES (?1, 'p', NULL, '', 0, 0)",
                [id],
            )
            .unwrap();
            tx.execute(
                "INSERT INTO note_order (note_id, project_id, parent_id, sequence)
                 VALUES (?1, 'p', NULL, ?2)",
                rusqlite::params![id, seq],
            )
            .unwrap();
        }
        tx.commit().unwrap();
        storage
    }

    fn ranks(conn: &Connection) -> Vec<(String, i64)> {
        order::list_group(conn, "p", None)
            .unwrap()
            .into_iter()
            .map(|e| (e.note_id, e.sequence))
            .collect()
    }

    #[test]
    fn test_ties_break_by_note_id() {
        let storage = corrupted_root([("a", 2), ("b", 2), ("c", 1)]);
        let result =
            normalize_in_tx(storage.connection(), "p", &NormalizeScope::Group(None)).unwrap();
        assert_eq!(result.groups_scanned, 1);
        assert_eq!(result.entries_renumbered, 1);
        assert_eq!(
            ranks(storage.connection()),
            vec![("c".to_string(), 1), ("a".to_string(), 2), ("b".to_string(), 3)]
        );
    }

    #[test]
    fn test_closes_gaps_and_handles_non_positive_values() {
        let storage = corrupted_root([("a", -1), ("b", 0), ("c", 7)]);
        normalize_in_tx(storage.connection(), "p", &NormalizeScope::AllGroups).unwrap();
        assert_eq!(
            ranks(storage.connection()),
            vec![("a".to_string(), 1), ("b".to_string(), 2), ("c".to_string(), 3)]
        );
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let storage = corrupted_root([("a", 5), ("b", 5), ("c", 9)]);
        let conn = storage.connection();
        let first = normalize_in_tx(conn, "p", &NormalizeScope::AllGroups).unwrap();
        let after_first = ranks(conn);
        let second = normalize_in_tx(conn, "p", &NormalizeScope::AllGroups).unwrap();
        assert!(first.entries_renumbered > 0);
        assert_eq!(second.entries_renumbered, 0);
        assert_eq!(ranks(conn), after_first);
    }

    #[test]
    fn test_unknown_project() {
        let storage = Storage::open_in_memory(&EngineConfig::default()).unwrap();
        let err = normalize_in_tx(storage.connection(), "ghost", &NormalizeScope::AllGroups)
            .unwrap_err();
        assert!(matches!(err, NoteTreeError::ProjectNotFound(_)));
    }

    #[test]
    fn test_scope_serializes_as_pascal_case() {
        let json = serde_json::to_string(&NormalizeScope::AllGroups).unwrap();
        assert_eq!(json, r#""AllGroups""#);
    }
}
